use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;

use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use clap::Parser;
use clap::builder::{ArgPredicate, NonEmptyStringValueParser};
use clap_verbosity_flag::{Verbosity, WarnLevel};
#[cfg(feature = "version")]
use shadow_rs::shadow;

use crate::Config;
use crate::callback::notification_manager::NotificationManager;
use crate::callback::tracing_notification_sink::TracingNotificationSink;
use crate::config::args::value_parser::{human_bytes, storage_path, url};
use crate::config::{
    CLITimeoutConfig, ClientConfig, RetryConfig, TracingConfig, TransferConfig,
    TransferRetryConfig,
};
use crate::types::notification::EventType;
use crate::types::{AccessKeys, ClientConfigLocation, S3Credentials};

mod tests;
mod value_parser;

const DEFAULT_WORKER_SIZE: u16 = 5;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_TRANSFER_INITIAL_BACKOFF_MILLISECONDS: u64 = 1000;
const DEFAULT_TRANSFER_MAX_BACKOFF_MILLISECONDS: u64 = 20000;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_MULTIPART_THRESHOLD: &str = "8MiB";
const DEFAULT_MULTIPART_CHUNKSIZE: &str = "8MiB";
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_HEAD_EACH_TARGET: bool = false;
const DEFAULT_DRY_RUN: bool = false;
const DEFAULT_MAX_KEYS: i32 = 1000;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;
const DEFAULT_REPORT_STRUCTURE: bool = false;
const DEFAULT_LOG_NOTIFICATIONS: bool = false;

const TARGET_PREFIX_SPECIFIED: &str =
    "TARGET must be s3://<BUCKET_NAME> without a prefix. keys are copied as they are\n";
const SAME_SOURCE_AND_TARGET: &str =
    "SOURCE and TARGET must not be the same bucket on the same endpoint\n";
const MAX_BACKOFF_LESS_THAN_INITIAL_BACKOFF: &str =
    "--max-backoff-milliseconds must be greater than or equal to --transfer-initial-backoff-milliseconds\n";
const STRUCTURE_MAX_DEPTH_WITHOUT_REPORT: &str =
    "--structure-max-depth requires --report-structure\n";

#[cfg(feature = "version")]
shadow!(build);

#[derive(Parser, Clone, Debug)]
#[cfg_attr(feature = "version", command(version=format!("{} ({} {}), {}", build::PKG_VERSION, build::SHORT_COMMIT, build::BUILD_TARGET, build::RUST_VERSION)))]
pub struct CLIArgs {
    #[arg(env, help = "s3://<BUCKET_NAME>[/prefix]", value_parser = storage_path::check_storage_path, default_value_if("auto_complete_shell", ArgPredicate::IsPresent, "s3://ignored"), required = false)]
    source: String,

    #[arg(env, help = "s3://<BUCKET_NAME>", value_parser = storage_path::check_storage_path, default_value_if("auto_complete_shell", ArgPredicate::IsPresent, "s3://ignored"), required = false)]
    target: String,

    /// A simulation mode. decisions are logged, no objects are written
    #[arg(long, env, default_value_t = DEFAULT_DRY_RUN, help_heading = "General")]
    dry_run: bool,

    /// location of the file that the AWS CLI uses to store configuration profiles
    #[arg(long, env, value_name = "FILE", help_heading = "AWS Configuration")]
    aws_config_file: Option<PathBuf>,

    /// location of the file that the AWS CLI uses to store access keys
    #[arg(long, env, value_name = "FILE", help_heading = "AWS Configuration")]
    aws_shared_credentials_file: Option<PathBuf>,

    /// source AWS CLI profile
    #[arg(long, env, conflicts_with_all = ["source_access_key", "source_secret_access_key", "source_session_token"], help_heading = "AWS Configuration")]
    source_profile: Option<String>,

    /// source access key
    #[arg(long, env, conflicts_with_all = ["source_profile"], requires = "source_secret_access_key", help_heading = "AWS Configuration")]
    source_access_key: Option<String>,

    /// source secret access key
    #[arg(long, env, conflicts_with_all = ["source_profile"], requires = "source_access_key", help_heading = "AWS Configuration")]
    source_secret_access_key: Option<String>,

    /// source session token
    #[arg(long, env, conflicts_with_all = ["source_profile"], requires = "source_access_key", help_heading = "AWS Configuration")]
    source_session_token: Option<String>,

    /// source region
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Source Options")]
    source_region: Option<String>,

    /// source endpoint url (e.g. https://kr.object.ncloudstorage.com)
    #[arg(long, env, value_parser = url::check_scheme, help_heading = "Source Options")]
    source_endpoint_url: Option<String>,

    /// force path-style addressing for source endpoint
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "Source Options")]
    source_force_path_style: bool,

    /// target AWS CLI profile
    #[arg(long, env, conflicts_with_all = ["target_access_key", "target_secret_access_key", "target_session_token"], help_heading = "AWS Configuration")]
    target_profile: Option<String>,

    /// target access key
    #[arg(long, env, conflicts_with_all = ["target_profile"], requires = "target_secret_access_key", help_heading = "AWS Configuration")]
    target_access_key: Option<String>,

    /// target secret access key
    #[arg(long, env, conflicts_with_all = ["target_profile"], requires = "target_access_key", help_heading = "AWS Configuration")]
    target_secret_access_key: Option<String>,

    /// target session token
    #[arg(long, env, conflicts_with_all = ["target_profile"], requires = "target_access_key", help_heading = "AWS Configuration")]
    target_session_token: Option<String>,

    /// target region
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Target Options")]
    target_region: Option<String>,

    /// target endpoint url
    #[arg(long, env, value_parser = url::check_scheme, help_heading = "Target Options")]
    target_endpoint_url: Option<String>,

    /// force path-style addressing for target endpoint
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "Target Options")]
    target_force_path_style: bool,

    /// number of workers for migration
    #[arg(long, env, default_value_t = DEFAULT_WORKER_SIZE, value_parser = clap::value_parser!(u16).range(1..), help_heading = "Performance")]
    worker_size: u16,

    /// rate limit bandwidth(bytes per sec). Allow suffixes: MB, MiB, GB, GiB
    #[arg(long, env, value_parser = human_bytes::check_human_bandwidth, help_heading = "Performance")]
    rate_limit_bandwidth: Option<String>,

    /// object size threshold that s3migrate uses for multipart upload, Allow suffixes: MB, MiB, GB, GiB.
    /// the larger the size, the larger the memory usage.
    #[arg(long, env, default_value = DEFAULT_MULTIPART_THRESHOLD, value_parser = human_bytes::check_human_bytes, help_heading = "Multipart Settings")]
    multipart_threshold: String,

    /// chunk size that s3migrate uses for multipart upload of individual objects, Allow suffixes: MB, MiB, GB, GiB.
    /// the larger the size, the larger the memory usage.
    #[arg(long, env, default_value = DEFAULT_MULTIPART_CHUNKSIZE, value_parser = human_bytes::check_human_bytes, help_heading = "Multipart Settings")]
    multipart_chunksize: String,

    /// trace verbosity(-v: show info, -vv: show debug, -vvv show trace)
    #[clap(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// show trace as json format
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Tracing/Logging")]
    json_tracing: bool,

    /// enable aws sdk tracing
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Tracing/Logging")]
    aws_sdk_tracing: bool,

    /// show span event tracing
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Tracing/Logging")]
    span_events_tracing: bool,

    /// disable ANSI terminal colors
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Tracing/Logging")]
    disable_color_tracing: bool,

    /// write migration notifications (failures, summary) to the log
    #[arg(long, env, default_value_t = DEFAULT_LOG_NOTIFICATIONS, help_heading = "Tracing/Logging")]
    log_notifications: bool,

    /// maximum attempts to copy one object (GET and PUT) before it is reported as failed
    #[arg(long, env, default_value_t = DEFAULT_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..), help_heading = "Retry Options")]
    max_attempts: u32,

    /// backoff (milliseconds) before the second attempt. doubled for each following attempt
    #[arg(long, env, default_value_t = DEFAULT_TRANSFER_INITIAL_BACKOFF_MILLISECONDS, value_name = "transfer_initial_backoff", help_heading = "Retry Options")]
    transfer_initial_backoff_milliseconds: u64,

    /// upper bound (milliseconds) of the backoff between attempts
    #[arg(long, env, default_value_t = DEFAULT_TRANSFER_MAX_BACKOFF_MILLISECONDS, value_name = "max_backoff", help_heading = "Retry Options")]
    max_backoff_milliseconds: u64,

    /// maximum retry attempts that the AWS SDK retry handler uses for each request
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, value_name = "aws_max_attempts", help_heading = "Retry Options")]
    aws_max_attempts: u32,

    /// a multiplier value used when calculating backoff times as part of an exponential backoff with jitter strategy.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, value_name = "initial_backoff", help_heading = "Retry Options")]
    initial_backoff_milliseconds: u64,

    /// operation timeout (milliseconds). For details, see the AWS SDK for Rust TimeoutConfig documentation.
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "operation_timeout",
        help_heading = "Timeout Options"
    )]
    operation_timeout_milliseconds: Option<u64>,

    /// operation attempt timeout (milliseconds). For details, see the AWS SDK for Rust TimeoutConfig documentation.
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "operation_attempt_timeout",
        help_heading = "Timeout Options"
    )]
    operation_attempt_timeout_milliseconds: Option<u64>,

    /// connect timeout (milliseconds).
    /// The default has AWS SDK default timeout (Currently 3100 milliseconds).
    #[arg(
        long,
        env,
        value_name = "connect_timeout",
        help_heading = "Timeout Options"
    )]
    connect_timeout_milliseconds: Option<u64>,

    /// read timeout (milliseconds).
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "read_timeout",
        help_heading = "Timeout Options"
    )]
    read_timeout_milliseconds: Option<u64>,

    /// log the source folder structure before migrating
    #[arg(long, env, default_value_t = DEFAULT_REPORT_STRUCTURE, help_heading = "Reporting")]
    report_structure: bool,

    /// maximum folder depth shown by --report-structure
    #[arg(long, env, value_parser = clap::value_parser!(u16).range(1..), help_heading = "Reporting")]
    structure_max_depth: Option<u16>,

    /// HeadObject is used to check each target object instead of listing the target bucket.
    /// it reduces the possibility of race condition issue
    #[arg(long, env, default_value_t = DEFAULT_HEAD_EACH_TARGET, help_heading = "Advanced")]
    head_each_target: bool,

    /// maximum number of objects returned in a single list object request
    #[arg(long, env, default_value_t = DEFAULT_MAX_KEYS, value_parser = clap::value_parser!(i32).range(1..=32767), help_heading = "Advanced")]
    max_keys: i32,

    /// generate a auto completions script. Valid values: bash, fish, zsh, powershell, elvish.
    #[arg(long, env, value_name = "SHELL", value_parser = clap_complete::shells::Shell::from_str, help_heading = "Advanced")]
    auto_complete_shell: Option<clap_complete::shells::Shell>,

    /// disable stalled stream protection
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, help_heading = "Advanced")]
    disable_stalled_stream_protection: bool,
}

pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let config_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    crate::Config::try_from(config_args)
}

impl CLIArgs {
    fn validate_storage_config(&self) -> Result<(), String> {
        if self.auto_complete_shell.is_some() {
            return Ok(());
        }

        self.check_target_prefix()?;
        self.check_same_bucket()?;
        self.check_backoff_conflict()?;
        self.check_structure_max_depth_conflict()?;

        Ok(())
    }

    fn check_target_prefix(&self) -> Result<(), String> {
        let target = storage_path::parse_storage_path(&self.target)?;
        if !target.prefix.is_empty() {
            return Err(TARGET_PREFIX_SPECIFIED.to_string());
        }

        Ok(())
    }

    fn check_same_bucket(&self) -> Result<(), String> {
        let source = storage_path::parse_storage_path(&self.source)?;
        let target = storage_path::parse_storage_path(&self.target)?;

        if source.bucket == target.bucket && self.source_endpoint_url == self.target_endpoint_url
        {
            return Err(SAME_SOURCE_AND_TARGET.to_string());
        }

        Ok(())
    }

    fn check_backoff_conflict(&self) -> Result<(), String> {
        if self.max_backoff_milliseconds < self.transfer_initial_backoff_milliseconds {
            return Err(MAX_BACKOFF_LESS_THAN_INITIAL_BACKOFF.to_string());
        }

        Ok(())
    }

    fn check_structure_max_depth_conflict(&self) -> Result<(), String> {
        if self.structure_max_depth.is_some() && !self.report_structure {
            return Err(STRUCTURE_MAX_DEPTH_WITHOUT_REPORT.to_string());
        }

        Ok(())
    }

    fn build_client_configs(
        &self,
        request_checksum_calculation: RequestChecksumCalculation,
    ) -> (ClientConfig, ClientConfig) {
        let source_credential = build_credential(
            self.source_profile.as_ref(),
            self.source_access_key.as_ref(),
            self.source_secret_access_key.as_ref(),
            self.source_session_token.as_ref(),
        );
        let target_credential = build_credential(
            self.target_profile.as_ref(),
            self.target_access_key.as_ref(),
            self.target_secret_access_key.as_ref(),
            self.target_session_token.as_ref(),
        );

        let source_client_config = ClientConfig {
            client_config_location: self.client_config_location(),
            credential: source_credential,
            region: self.source_region.clone(),
            endpoint_url: self.source_endpoint_url.clone(),
            force_path_style: self.source_force_path_style,
            retry_config: self.retry_config(),
            cli_timeout_config: self.cli_timeout_config(),
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
            request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
        };

        let target_client_config = ClientConfig {
            client_config_location: self.client_config_location(),
            credential: target_credential,
            region: self.target_region.clone(),
            endpoint_url: self.target_endpoint_url.clone(),
            force_path_style: self.target_force_path_style,
            retry_config: self.retry_config(),
            cli_timeout_config: self.cli_timeout_config(),
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
            request_checksum_calculation,
        };

        (source_client_config, target_client_config)
    }

    fn client_config_location(&self) -> ClientConfigLocation {
        ClientConfigLocation {
            aws_config_file: self.aws_config_file.clone(),
            aws_shared_credentials_file: self.aws_shared_credentials_file.clone(),
        }
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            aws_max_attempts: self.aws_max_attempts,
            initial_backoff_milliseconds: self.initial_backoff_milliseconds,
        }
    }

    fn cli_timeout_config(&self) -> CLITimeoutConfig {
        CLITimeoutConfig {
            operation_timeout_milliseconds: self.operation_timeout_milliseconds,
            operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
            connect_timeout_milliseconds: self.connect_timeout_milliseconds,
            read_timeout_milliseconds: self.read_timeout_milliseconds,
        }
    }
}

fn build_credential(
    profile: Option<&String>,
    access_key: Option<&String>,
    secret_access_key: Option<&String>,
    session_token: Option<&String>,
) -> S3Credentials {
    if let Some(profile) = profile {
        return S3Credentials::Profile(profile.to_string());
    }

    match (access_key, secret_access_key) {
        (Some(access_key), Some(secret_access_key)) => S3Credentials::Credentials {
            access_keys: AccessKeys {
                access_key: access_key.to_string(),
                secret_access_key: secret_access_key.to_string(),
                session_token: session_token.cloned(),
            },
        },
        _ => S3Credentials::FromEnvironment,
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(value: CLIArgs) -> Result<Self, Self::Error> {
        value.validate_storage_config()?;

        let mut tracing_config = value.verbosity.log_level().map(|log_level| TracingConfig {
            tracing_level: log_level,
            json_tracing: value.json_tracing,
            aws_sdk_tracing: value.aws_sdk_tracing,
            span_events_tracing: value.span_events_tracing,
            disable_color_tracing: value.disable_color_tracing,
        });

        // These options write their results at info level.
        if value.dry_run || value.report_structure || value.log_notifications {
            tracing_config = match tracing_config {
                None => Some(TracingConfig {
                    tracing_level: log::Level::Info,
                    json_tracing: DEFAULT_JSON_TRACING,
                    aws_sdk_tracing: DEFAULT_AWS_SDK_TRACING,
                    span_events_tracing: DEFAULT_SPAN_EVENTS_TRACING,
                    disable_color_tracing: DEFAULT_DISABLE_COLOR_TRACING,
                }),
                Some(config) if config.tracing_level < log::Level::Info => Some(TracingConfig {
                    tracing_level: log::Level::Info,
                    ..config
                }),
                config => config,
            };
        }

        let rate_limit_bandwidth = value
            .rate_limit_bandwidth
            .as_deref()
            .map(human_bytes::parse_human_bandwidth)
            .transpose()?;

        let (source_client_config, target_client_config) =
            value.build_client_configs(RequestChecksumCalculation::WhenRequired);

        let mut notification_manager = NotificationManager::new();
        if value.log_notifications {
            notification_manager.register_sink(EventType::ALL_EVENTS, TracingNotificationSink {});
        }

        Ok(Config {
            source: storage_path::parse_storage_path(&value.source)?,
            target: storage_path::parse_storage_path(&value.target)?,

            source_client_config: Some(source_client_config),
            target_client_config: Some(target_client_config),

            transfer_retry_config: TransferRetryConfig {
                max_attempts: value.max_attempts,
                initial_backoff_milliseconds: value.transfer_initial_backoff_milliseconds,
                max_backoff_milliseconds: value.max_backoff_milliseconds,
            },

            tracing_config,

            transfer_config: TransferConfig {
                multipart_threshold: human_bytes::parse_human_bytes(&value.multipart_threshold)?,
                multipart_chunksize: human_bytes::parse_human_bytes(&value.multipart_chunksize)?,
            },

            worker_size: value.worker_size,
            head_each_target: value.head_each_target,
            dry_run: value.dry_run,
            rate_limit_bandwidth,
            max_keys: value.max_keys,
            auto_complete_shell: value.auto_complete_shell,
            report_structure: value.report_structure,
            structure_max_depth: value.structure_max_depth.map(usize::from),
            log_notifications: value.log_notifications,
            notification_manager,
        })
    }
}
