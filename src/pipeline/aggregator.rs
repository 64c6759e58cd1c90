use std::sync::Arc;

use async_channel::Receiver;
use tracing::{debug, info, warn};

use crate::callback::notification_manager::NotificationManager;
use crate::types::notification::NotificationEvent;
use crate::types::stats::{
    MigrationStats, StatsAggregator, format_size, format_throughput, format_time,
};
use crate::types::{TransferErrorKind, TransferOutcome};

/// The only task that folds outcomes into the running statistics. Progress lines are
/// therefore produced in fold order and never go backwards.
pub struct OutcomeAggregator {
    stats_aggregator: Arc<StatsAggregator>,
    receiver: Receiver<TransferOutcome>,
    notification_manager: NotificationManager,
}

impl OutcomeAggregator {
    pub fn new(
        stats_aggregator: Arc<StatsAggregator>,
        receiver: Receiver<TransferOutcome>,
        notification_manager: NotificationManager,
    ) -> Self {
        Self {
            stats_aggregator,
            receiver,
            notification_manager,
        }
    }

    /// Runs until every sender of the outcome channel has been dropped.
    pub async fn aggregate(&self) {
        while let Ok(outcome) = self.receiver.recv().await {
            let snapshot = self.stats_aggregator.fold(&outcome);

            if let Some(error) = &outcome.error {
                // A cancelled transfer is reported once by the cancellation summary.
                if error.kind != TransferErrorKind::Cancelled {
                    self.notification_manager
                        .notify(NotificationEvent::ObjectMigrationFailed {
                            key: outcome.key.clone(),
                            error: error.clone(),
                        })
                        .await;
                }
            }

            info!(
                key = outcome.key,
                decision = outcome.decision.to_string(),
                success = outcome.success,
                attempts = outcome.attempts,
                "{}",
                format_progress(&snapshot)
            );
        }

        debug!("outcome aggregator has been completed.");
    }
}

pub fn format_progress(stats: &MigrationStats) -> String {
    let eta = stats
        .eta()
        .map(|eta| format_time(eta.as_secs()))
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{:.2}% ({}/{}) success: {} skipped: {} failed: {} | {} | elapsed: {} | eta: {}",
        stats.percent(),
        stats.processed(),
        stats.total,
        stats.success,
        stats.skipped,
        stats.failed,
        format_throughput(stats.throughput()),
        format_time(stats.elapsed().as_secs()),
        eta,
    )
}

pub fn log_summary(stats: &MigrationStats) {
    let summary = format!(
        "{} objects ({} success, {} skipped, {} failed), {} of {} transferred, average {}, duration {}",
        stats.total,
        stats.success,
        stats.skipped,
        stats.failed,
        format_size(stats.transferred_bytes),
        format_size(stats.total_bytes),
        format_throughput(stats.throughput()),
        format_time(stats.elapsed().as_secs()),
    );

    if stats.cancelled {
        warn!(
            unprocessed = stats.unprocessed(),
            "migration has been cancelled. {summary}"
        );
    } else if stats.has_failures() {
        warn!("migration has been completed with failures. {summary}");
    } else {
        info!("migration has been completed. {summary}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::types::notification::{EventType, Notification, NotificationSink};
    use crate::types::{MigrationDecision, TransferError};

    use super::*;

    #[derive(Clone, Default)]
    struct CollectingSink {
        notifications: Arc<StdMutex<Vec<Notification>>>,
    }

    #[async_trait]
    impl NotificationSink for CollectingSink {
        async fn notify(&mut self, notification: Notification) -> Result<()> {
            self.notifications.lock().unwrap().push(notification);
            Ok(())
        }
    }

    fn failed(key: &str, kind: TransferErrorKind) -> TransferOutcome {
        TransferOutcome::failed(
            key,
            MigrationDecision::Copy,
            3,
            TransferError::new(kind, "error"),
        )
    }

    #[tokio::test]
    async fn aggregate_outcomes() {
        init_dummy_tracing_subscriber();

        let sink = CollectingSink::default();
        let mut notification_manager = NotificationManager::new();
        notification_manager.register_sink(EventType::ALL_EVENTS, sink.clone());

        let stats_aggregator = Arc::new(StatsAggregator::new());
        stats_aggregator.begin(4, 100);

        let (sender, receiver) = async_channel::unbounded();
        sender
            .send(TransferOutcome::succeeded(
                "a",
                MigrationDecision::Copy,
                10,
                1,
            ))
            .await
            .unwrap();
        sender.send(TransferOutcome::skipped("b")).await.unwrap();
        sender
            .send(failed("c", TransferErrorKind::Network))
            .await
            .unwrap();
        sender
            .send(failed("d", TransferErrorKind::Cancelled))
            .await
            .unwrap();
        drop(sender);

        OutcomeAggregator::new(stats_aggregator.clone(), receiver, notification_manager)
            .aggregate()
            .await;

        let stats = stats_aggregator.snapshot();
        assert_eq!(stats.success, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.transferred_bytes, 10);

        let notifications = sink.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 1);
        assert!(matches!(
            &notifications[0].event,
            NotificationEvent::ObjectMigrationFailed { key, .. } if key == "c"
        ));
    }

    #[test]
    fn format_progress_line() {
        init_dummy_tracing_subscriber();

        let mut stats = MigrationStats::new();
        stats.begin(3, 45);
        stats.fold(&TransferOutcome::skipped("b"));

        let line = format_progress(&stats);
        assert!(line.starts_with("33.33% (1/3) success: 0 skipped: 1 failed: 0"));
        assert!(line.contains("elapsed: 0:00:00"));
    }

    #[test]
    fn format_progress_without_outcomes() {
        init_dummy_tracing_subscriber();

        let mut stats = MigrationStats::new();
        stats.begin(2, 10);

        assert!(format_progress(&stats).ends_with("eta: -"));
    }

    #[test]
    fn log_summary_variants() {
        init_dummy_tracing_subscriber();

        let mut stats = MigrationStats::new();
        stats.begin(1, 1);
        stats.finalize();
        log_summary(&stats);

        stats.cancelled = true;
        log_summary(&stats);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
