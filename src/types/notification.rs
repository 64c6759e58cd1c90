use anyhow::Result;
use async_trait::async_trait;
use bitflags::bitflags;
use chrono::{DateTime, Local};

use crate::types::TransferError;
use crate::types::stats::MigrationStats;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct EventType: u64 {
        const UNDEFINED = 0u64;
        const MIGRATION_START = 1u64 << 1;
        const OBJECT_MIGRATION_FAILED = 1u64 << 2;
        const BATCH_SUMMARY = 1u64 << 3;
        const MIGRATION_CANCELLED = 1u64 << 4;

        const ALL_EVENTS  = !0;
    }
}

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    MigrationStart {
        source_bucket: String,
        target_bucket: String,
        prefix: String,
    },
    ObjectMigrationFailed {
        key: String,
        error: TransferError,
    },
    BatchSummary {
        stats: MigrationStats,
    },
    MigrationCancelled {
        stats: MigrationStats,
    },
}

impl NotificationEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            NotificationEvent::MigrationStart { .. } => EventType::MIGRATION_START,
            NotificationEvent::ObjectMigrationFailed { .. } => EventType::OBJECT_MIGRATION_FAILED,
            NotificationEvent::BatchSummary { .. } => EventType::BATCH_SUMMARY,
            NotificationEvent::MigrationCancelled { .. } => EventType::MIGRATION_CANCELLED,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            NotificationEvent::MigrationStart { .. } => "started",
            NotificationEvent::ObjectMigrationFailed { .. } => "failed",
            NotificationEvent::BatchSummary { stats } => {
                if stats.has_failures() {
                    "completed_with_failures"
                } else {
                    "completed"
                }
            }
            NotificationEvent::MigrationCancelled { .. } => "cancelled",
        }
    }

    /// A short title suitable for a topic subject line.
    pub fn subject(&self) -> String {
        match self {
            NotificationEvent::MigrationStart { source_bucket, .. } => {
                format!("Migration Started: {source_bucket}")
            }
            NotificationEvent::ObjectMigrationFailed { key, .. } => {
                format!("Migration Failed: {key}")
            }
            NotificationEvent::BatchSummary { .. } => "Migration Batch Summary".to_string(),
            NotificationEvent::MigrationCancelled { .. } => "Migration Cancelled".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub timestamp: DateTime<Local>,
    pub event: NotificationEvent,
}

impl Notification {
    pub fn new(event: NotificationEvent) -> Self {
        Self {
            timestamp: Local::now(),
            event,
        }
    }
}

/// Delivery target for terminal-state events (a queue, a topic, a log).
///
/// An error returned here is logged by the caller and never fails the migration.
#[async_trait]
pub trait NotificationSink {
    async fn notify(&mut self, notification: Notification) -> Result<()>;
}
