use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::types::notification::{Notification, NotificationEvent, NotificationSink};
use crate::types::stats::{format_size, format_time};

/// Writes every notification to the log instead of an external queue or topic.
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&mut self, notification: Notification) -> Result<()> {
        let timestamp = notification.timestamp.to_rfc3339();
        let status = notification.event.status();
        let subject = notification.event.subject();

        match &notification.event {
            NotificationEvent::MigrationStart {
                source_bucket,
                target_bucket,
                prefix,
            } => {
                info!(
                    timestamp = timestamp,
                    status = status,
                    source_bucket = source_bucket,
                    target_bucket = target_bucket,
                    prefix = prefix,
                    "{subject}"
                );
            }
            NotificationEvent::ObjectMigrationFailed { key, error } => {
                error!(
                    timestamp = timestamp,
                    status = status,
                    key = key,
                    error_kind = error.kind.to_string(),
                    error = error.message,
                    "{subject}"
                );
            }
            NotificationEvent::BatchSummary { stats } => {
                info!(
                    timestamp = timestamp,
                    status = status,
                    total = stats.total,
                    success = stats.success,
                    skipped = stats.skipped,
                    failed = stats.failed,
                    transferred = format_size(stats.transferred_bytes),
                    duration = format_time(stats.elapsed().as_secs()),
                    "{subject}"
                );
            }
            NotificationEvent::MigrationCancelled { stats } => {
                warn!(
                    timestamp = timestamp,
                    status = status,
                    processed = stats.processed(),
                    unprocessed = stats.unprocessed(),
                    "{subject}"
                );
            }
        }

        Ok(())
    }
}
