use std::io;
use std::io::Write;

use async_channel::Receiver;
use indicatif::{HumanBytes, HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use s3migrate::types::MigrationStatistics;
use simple_moving_average::{SMA, SumTreeSMA};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const MOVING_AVERAGE_PERIOD_SECS: usize = 10;
const REFRESH_INTERVAL: f32 = 1.0;

#[derive(Debug, Default)]
struct IndicatorTotals {
    transferred_bytes: u64,
    transferred_objects: u64,
    skipped: u64,
    failed: u64,
    retried: u64,
}

impl IndicatorTotals {
    fn add(&mut self, stats: MigrationStatistics) -> (u64, u64) {
        match stats {
            MigrationStatistics::TransferBytes(size) => {
                self.transferred_bytes += size;
                (size, 0)
            }
            MigrationStatistics::TransferComplete { .. } => {
                self.transferred_objects += 1;
                (0, 1)
            }
            MigrationStatistics::TransferSkip { .. } => {
                self.skipped += 1;
                (0, 0)
            }
            MigrationStatistics::TransferError { .. } => {
                self.failed += 1;
                (0, 0)
            }
            MigrationStatistics::TransferRetry { .. } => {
                self.retried += 1;
                (0, 0)
            }
        }
    }

    fn counts(&self) -> String {
        format!(
            "skipped {} objects,  failed {} objects,  retried {} times",
            self.skipped, self.failed, self.retried
        )
    }
}

/// Renders a one-line live view from the statistics channel until the channel is closed.
pub fn show_indicator(
    stats_receiver: Receiver<MigrationStatistics>,
    show_progress: bool,
    show_result: bool,
    dry_run: bool,
) -> JoinHandle<()> {
    let progress_text = ProgressBar::new(0);
    if let Ok(progress_style) = ProgressStyle::with_template("{wide_msg}") {
        progress_text.set_style(progress_style);
    }

    tokio::spawn(async move {
        let start_time = Instant::now();

        let mut ma_transferred_bytes = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();
        let mut ma_transferred_count = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();

        let mut totals = IndicatorTotals::default();

        loop {
            let mut period_bytes: u64 = 0;
            let mut period_count: u64 = 0;

            let period = Instant::now();
            loop {
                while let Ok(stats) = stats_receiver.try_recv() {
                    let (bytes, count) = totals.add(stats);
                    period_bytes += bytes;
                    period_count += count;
                }

                if REFRESH_INTERVAL < period.elapsed().as_secs_f32() {
                    break;
                }

                if stats_receiver.is_closed() {
                    if show_result {
                        show_result_line(&progress_text, &totals, start_time, dry_run);
                    }

                    return;
                }

                tokio::time::sleep(std::time::Duration::from_secs_f32(0.05)).await;
            }

            ma_transferred_bytes.add_sample(period_bytes);
            if !dry_run {
                ma_transferred_count.add_sample(period_count);
            }

            if show_progress {
                progress_text.set_message(format!(
                    "{:>3} | {:>3}/sec,  transferred {:>3} objects | {:>3} objects/sec,  {}",
                    HumanBytes(totals.transferred_bytes),
                    HumanBytes(ma_transferred_bytes.get_average()).to_string(),
                    totals.transferred_objects,
                    HumanCount(ma_transferred_count.get_average()).to_string(),
                    totals.counts(),
                ));
            }
        }
    })
}

fn show_result_line(
    progress_text: &ProgressBar,
    totals: &IndicatorTotals,
    start_time: Instant,
    dry_run: bool,
) {
    let elapsed = start_time.elapsed();
    let elapsed_secs_f64 = elapsed.as_secs_f64();

    let (mut bytes_per_sec, mut objects_per_sec) = if elapsed_secs_f64 < REFRESH_INTERVAL as f64 {
        (totals.transferred_bytes, totals.transferred_objects)
    } else {
        (
            (totals.transferred_bytes as f64 / elapsed_secs_f64) as u64,
            (totals.transferred_objects as f64 / elapsed_secs_f64) as u64,
        )
    };
    if dry_run {
        bytes_per_sec = 0;
        objects_per_sec = 0;
    }

    if let Ok(progress_style) = ProgressStyle::with_template("{msg}") {
        progress_text.set_style(progress_style);
    }
    progress_text.finish_with_message(format!(
        "{:>3} | {:>3}/sec,  transferred {:>3} objects | {:>3} objects/sec,  {},  duration {}",
        HumanBytes(totals.transferred_bytes),
        HumanBytes(bytes_per_sec),
        totals.transferred_objects,
        HumanCount(objects_per_sec),
        totals.counts(),
        HumanDuration(elapsed),
    ));

    println!();
    let _ = io::stdout().flush();
}
