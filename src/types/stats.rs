use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::TransferOutcome;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Running totals of a migration.
///
/// `success + skipped + failed == total` holds once a run completes without
/// cancellation. A cancelled run leaves `unprocessed()` objects behind.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStats {
    pub total: u64,
    pub success: u64,
    pub skipped: u64,
    pub failed: u64,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    pub start_time: Instant,
    pub cancelled: bool,
    elapsed: Option<Duration>,
}

impl Default for MigrationStats {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationStats {
    pub fn new() -> Self {
        Self {
            total: 0,
            success: 0,
            skipped: 0,
            failed: 0,
            total_bytes: 0,
            transferred_bytes: 0,
            start_time: Instant::now(),
            cancelled: false,
            elapsed: None,
        }
    }

    /// Sets the totals and restarts the clock, so elapsed time and throughput cover the
    /// migration itself.
    pub fn begin(&mut self, total: u64, total_bytes: u64) {
        self.total = total;
        self.total_bytes = total_bytes;
        self.start_time = Instant::now();
    }

    pub fn fold(&mut self, outcome: &TransferOutcome) {
        if outcome.is_skipped() {
            self.skipped += 1;
        } else if outcome.success {
            self.success += 1;
            self.transferred_bytes += outcome.bytes_transferred;
        } else {
            self.failed += 1;
        }
    }

    pub fn finalize(&mut self) {
        if self.elapsed.is_none() {
            self.elapsed = Some(self.start_time.elapsed());
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.elapsed.is_some()
    }

    pub fn processed(&self) -> u64 {
        self.success + self.skipped + self.failed
    }

    pub fn unprocessed(&self) -> u64 {
        self.total.saturating_sub(self.processed())
    }

    pub fn has_failures(&self) -> bool {
        0 < self.failed
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.start_time.elapsed())
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.processed() as f64 * 100.0 / self.total as f64
    }

    /// Bytes per second over the whole run so far.
    pub fn throughput(&self) -> f64 {
        let elapsed_secs = self.elapsed().as_secs_f64();
        if elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.transferred_bytes as f64 / elapsed_secs
    }

    /// Remaining time estimated from the object completion rate so far.
    pub fn eta(&self) -> Option<Duration> {
        let processed = self.processed();
        if processed == 0 {
            return None;
        }

        let per_object = self.elapsed().as_secs_f64() / processed as f64;
        Some(Duration::from_secs_f64(
            per_object * self.unprocessed() as f64,
        ))
    }
}

/// The single shared-mutable home of `MigrationStats`.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    stats: Mutex<MigrationStats>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            stats: Mutex::new(MigrationStats::new()),
        }
    }

    pub fn begin(&self, total: u64, total_bytes: u64) {
        self.stats.lock().unwrap().begin(total, total_bytes);
    }

    /// Folds one outcome and returns the resulting snapshot, so that a progress
    /// line always reflects the fold it was produced by.
    pub fn fold(&self, outcome: &TransferOutcome) -> MigrationStats {
        let mut stats = self.stats.lock().unwrap();
        stats.fold(outcome);
        stats.clone()
    }

    pub fn snapshot(&self) -> MigrationStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn mark_cancelled(&self) {
        self.stats.lock().unwrap().cancelled = true;
    }

    pub fn finalize(&self) -> MigrationStats {
        let mut stats = self.stats.lock().unwrap();
        stats.finalize();
        stats.clone()
    }
}

pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} {}", SIZE_UNITS[0]);
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;
    while 1024.0 <= size && unit_index < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{size:.2} {}", SIZE_UNITS[unit_index])
}

pub fn format_time(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}

pub fn format_throughput(bytes_per_sec: f64) -> String {
    format!("{}/s", format_size(bytes_per_sec as u64))
}
