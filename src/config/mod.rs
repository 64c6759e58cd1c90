use aws_smithy_types::checksum_config::RequestChecksumCalculation;

use crate::callback::notification_manager::NotificationManager;
use crate::types::{ClientConfigLocation, S3Credentials, StoragePath};

pub mod args;

#[derive(Debug, Clone)]
pub struct Config {
    pub source: StoragePath,
    pub target: StoragePath,
    pub source_client_config: Option<ClientConfig>,
    pub target_client_config: Option<ClientConfig>,
    pub transfer_retry_config: TransferRetryConfig,
    pub tracing_config: Option<TracingConfig>,
    pub transfer_config: TransferConfig,
    pub worker_size: u16,
    pub head_each_target: bool,
    pub dry_run: bool,
    pub rate_limit_bandwidth: Option<u64>,
    pub max_keys: i32,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
    pub report_structure: bool,
    pub structure_max_depth: Option<usize>,
    pub log_notifications: bool,
    pub notification_manager: NotificationManager,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
    pub request_checksum_calculation: RequestChecksumCalculation,
}

/// Retry settings of the AWS SDK itself, applied to every single request.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

#[derive(Debug, Clone)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}

/// Retry settings for a whole object copy (GET and PUT), on top of the SDK retries.
#[derive(Debug, Clone, Copy)]
pub struct TransferRetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
    pub max_backoff_milliseconds: u64,
}

impl TransferRetryConfig {
    /// `min(initial * 2^(attempt - 1), max)`. `attempt` starts at 1.
    pub fn backoff_milliseconds(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1_u64.checked_shl(exponent).unwrap_or(u64::MAX);

        self.initial_backoff_milliseconds
            .saturating_mul(factor)
            .min(self.max_backoff_milliseconds)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub multipart_threshold: u64,
    pub multipart_chunksize: u64,
}

impl TransferConfig {
    pub fn is_multipart_upload_required(&self, content_length: u64) -> bool {
        self.multipart_threshold <= content_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_multipart_upload_necessary() {
        init_dummy_tracing_subscriber();

        let transfer_config = TransferConfig {
            multipart_threshold: 8 * 1024 * 1024,
            multipart_chunksize: 8 * 1024 * 1024,
        };

        assert!(transfer_config.is_multipart_upload_required(8 * 1024 * 1024));
        assert!(transfer_config.is_multipart_upload_required((8 * 1024 * 1024) + 1));
        assert!(!transfer_config.is_multipart_upload_required((8 * 1024 * 1024) - 1));
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        init_dummy_tracing_subscriber();

        let retry_config = TransferRetryConfig {
            max_attempts: 3,
            initial_backoff_milliseconds: 100,
            max_backoff_milliseconds: 1000,
        };

        assert_eq!(retry_config.backoff_milliseconds(1), 100);
        assert_eq!(retry_config.backoff_milliseconds(2), 200);
        assert_eq!(retry_config.backoff_milliseconds(3), 400);
        assert_eq!(retry_config.backoff_milliseconds(4), 800);
        assert_eq!(retry_config.backoff_milliseconds(5), 1000);
        assert_eq!(retry_config.backoff_milliseconds(100), 1000);
    }

    #[test]
    fn backoff_with_zero_initial() {
        init_dummy_tracing_subscriber();

        let retry_config = TransferRetryConfig {
            max_attempts: 3,
            initial_backoff_milliseconds: 0,
            max_backoff_milliseconds: 1000,
        };

        assert_eq!(retry_config.backoff_milliseconds(3), 0);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
