use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use crate::types::notification::{EventType, Notification, NotificationEvent, NotificationSink};

const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct NotificationManager {
    pub notification_sink: Option<Arc<Mutex<Box<dyn NotificationSink + Send + Sync>>>>,
    pub event_flags: EventType,
    /// Upper bound for one delivery. A sink that does not answer in time is skipped.
    pub delivery_timeout: Duration,
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationManager {
    pub fn new() -> Self {
        Self {
            notification_sink: None,
            event_flags: EventType::ALL_EVENTS,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    pub fn register_sink<T: NotificationSink + Send + Sync + 'static>(
        &mut self,
        events_flag: EventType,
        sink: T,
    ) {
        self.notification_sink = Some(Arc::new(Mutex::new(Box::new(sink))));
        self.event_flags = events_flag;
    }

    pub fn is_sink_registered(&self) -> bool {
        self.notification_sink.is_some()
    }

    /// Delivers `event` when its type is enabled. Delivery failures are logged and dropped.
    pub async fn notify(&self, event: NotificationEvent) {
        let Some(sink) = &self.notification_sink else {
            return;
        };
        if !self.event_flags.contains(event.event_type()) {
            return;
        }

        let notification = Notification::new(event);
        let subject = notification.event.subject();
        let delivery = async { sink.lock().await.notify(notification).await };
        match tokio::time::timeout(self.delivery_timeout, delivery).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    subject = subject,
                    error = e.to_string(),
                    "failed to deliver notification."
                );
            }
            Err(_) => {
                warn!(
                    subject = subject,
                    timeout_milliseconds = self.delivery_timeout.as_millis() as u64,
                    "notification delivery timed out."
                );
            }
        }
    }
}

impl fmt::Debug for NotificationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationManager")
            .field("event_flags", &self.event_flags)
            .field("delivery_timeout", &self.delivery_timeout)
            .finish()
    }
}
