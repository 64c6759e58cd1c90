/*!
# Overview
s3migrate migrates objects between two S3-compatible object storage endpoints, for example
from one cloud provider to another.
Key paths are preserved, objects that already exist identically at the target are skipped,
and progress and throughput are reported while the migration runs.

## Features
- Incremental
  Each source object is compared with the target by size and ETag(MD5 or equivalent).
  Identical objects are skipped without any GET or PUT, so a second run only transfers what changed.

- Reliable
  Each object is retried as a whole (GET and PUT) with capped exponential backoff.
  A stream that ends early or runs long is detected and retried.
  Every upload carries Content-MD5 and the ETag returned by the target is verified.
  A failed object never aborts the migration. It is counted and reported.

- Bounded resources
  Objects are streamed from the source into the target. Large objects are uploaded in
  multipart chunks, so memory per worker is bounded by the chunk size.
  Bandwidth can be limited with `--rate-limit-bandwidth`.

- Any S3-compatible endpoint
  Endpoint URL, region, credentials and path style are configured per side.

## As a library
s3migrate CLI is a thin wrapper of the s3migrate library. All CLI options can be passed
to the library as arguments.

Any [`storage::StorageTrait`] implementation can be migrated with
[`pipeline::Pipeline::with_storage`], e.g. [`storage::memory::MemoryStorage`] in tests.

Example usage
=============

```Toml
[dependencies]
s3migrate = "0.3"
tokio = { version = "1", features = ["full"] }

# If you want to implement NotificationSink, you need to add async-trait crate.
async-trait = "0.1"
anyhow = "1"
```

```no_run
use async_trait::async_trait;

use s3migrate::config::Config;
use s3migrate::config::args::parse_from_args;
use s3migrate::pipeline::Pipeline;
use s3migrate::types::MigrationStatistics;
use s3migrate::types::notification::{EventType, Notification, NotificationEvent, NotificationSink};
use s3migrate::types::token::create_pipeline_cancellation_token;

// This struct represents a user-defined notification sink, e.g. a queue or a topic.
pub struct StdoutNotificationSink;

#[async_trait]
impl NotificationSink for StdoutNotificationSink {
    // Notifications are delivered serially. An error is logged and never fails the migration.
    async fn notify(&mut self, notification: Notification) -> anyhow::Result<()> {
        match notification.event {
            NotificationEvent::ObjectMigrationFailed { key, error } => {
                println!("failed: {key} {error}");
            }
            NotificationEvent::BatchSummary { stats } => {
                println!("completed: {} success, {} failed", stats.success, stats.failed);
            }
            _ => {}
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    // You can use all the arguments for s3migrate CLI.
    let args = vec![
        "program_name",
        "--source-endpoint-url",
        "https://storage.example.com",
        "--worker-size",
        "8",
        "s3://source-bucket/dir/",
        "s3://target-bucket",
    ];

    // s3migrate library converts the arguments to Config.
    let mut config = Config::try_from(parse_from_args(args).unwrap()).unwrap();

    // The notification sink is optional.
    config.notification_manager.register_sink(
        EventType::OBJECT_MIGRATION_FAILED | EventType::BATCH_SUMMARY,
        StdoutNotificationSink {},
    );

    // You can use this token to cancel the pipeline.
    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline = Pipeline::new(config, cancellation_token).await.unwrap();
    let stats_receiver = pipeline.get_stats_receiver();

    // Only bucket checks and the source listing are fatal.
    let stats = pipeline.run().await.unwrap();

    // The live statistics are still buffered after the run.
    let mut retry_count = 0;
    while let Ok(live_stats) = stats_receiver.try_recv() {
        if matches!(live_stats, MigrationStatistics::TransferRetry { .. }) {
            retry_count += 1;
        }
    }

    println!(
        "{} transferred, {} skipped, {} failed, {} retries",
        stats.success, stats.skipped, stats.failed, retry_count
    );
}
```

For more information about s3migrate binary, see `s3migrate -h`.
*/

pub use config::Config;
pub use config::args::CLIArgs;
pub use pipeline::Pipeline;

pub mod callback;
pub mod config;
pub mod pipeline;
pub mod storage;
pub mod types;
