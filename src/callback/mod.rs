pub mod notification_manager;
pub mod tracing_notification_sink;
