use anyhow::{Result, anyhow};
use tokio::time::Instant;
use tracing::{error, trace};

use s3migrate::Config;
use s3migrate::pipeline::Pipeline;
use s3migrate::types::token::create_pipeline_cancellation_token;

mod ctrl_c_handler;
mod indicator;
mod ui_config;

/// Runs one migration. Failed objects and cancellation are reported as errors so that the
/// process exits with a non-zero status.
pub async fn run(config: Config) -> Result<()> {
    let cancellation_token = create_pipeline_cancellation_token();

    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let start_time = Instant::now();
    trace!("migration pipeline start.");

    let mut pipeline = Pipeline::new(config.clone(), cancellation_token).await?;
    let indicator_join_handle = indicator::show_indicator(
        pipeline.get_stats_receiver(),
        ui_config::is_progress_indicator_needed(&config),
        ui_config::is_show_result_needed(&config),
        config.dry_run,
    );

    let result = pipeline.run().await;
    pipeline.close_stats_sender();
    indicator_join_handle.await?;

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());
    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            error!(duration_sec = duration_sec, "s3migrate failed.");
            return Err(e);
        }
    };

    if stats.cancelled {
        error!(
            duration_sec = duration_sec,
            unprocessed = stats.unprocessed(),
            "s3migrate has been cancelled."
        );
        return Err(anyhow!(
            "s3migrate has been cancelled. {} objects were not processed.",
            stats.unprocessed()
        ));
    }

    if stats.has_failures() {
        error!(
            duration_sec = duration_sec,
            failed = stats.failed,
            "s3migrate has been completed with failures."
        );
        return Err(anyhow!("{} objects failed to migrate.", stats.failed));
    }

    trace!(duration_sec = duration_sec, "s3migrate has been completed.");

    Ok(())
}
