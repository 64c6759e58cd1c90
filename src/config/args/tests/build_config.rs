#[cfg(test)]
mod tests {
    use crate::config::args::*;

    #[test]
    fn build_from_profile_with_default_value() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3migrate",
            "--source-profile",
            "source_profile",
            "--target-profile",
            "target_profile",
            "s3://source-bucket/source_prefix/",
            "s3://target-bucket",
        ];

        let config = build_config_from_args(args).unwrap();

        assert_eq!(config.source.bucket, "source-bucket");
        assert_eq!(config.source.prefix, "source_prefix/");
        assert_eq!(config.target.bucket, "target-bucket");
        assert_eq!(config.target.prefix, "");

        let source_client_config = config.source_client_config.as_ref().unwrap();
        assert!(
            source_client_config
                .client_config_location
                .aws_config_file
                .is_none()
        );
        assert!(source_client_config.region.is_none());
        assert!(source_client_config.endpoint_url.is_none());
        assert!(!source_client_config.force_path_style);
        assert_eq!(
            source_client_config.retry_config.aws_max_attempts,
            DEFAULT_AWS_MAX_ATTEMPTS
        );

        assert_eq!(config.worker_size, DEFAULT_WORKER_SIZE);
        assert_eq!(
            config.transfer_retry_config.max_attempts,
            DEFAULT_MAX_ATTEMPTS
        );
        assert_eq!(
            config.transfer_retry_config.initial_backoff_milliseconds,
            DEFAULT_TRANSFER_INITIAL_BACKOFF_MILLISECONDS
        );
        assert_eq!(
            config.transfer_retry_config.max_backoff_milliseconds,
            DEFAULT_TRANSFER_MAX_BACKOFF_MILLISECONDS
        );
        assert_eq!(config.transfer_config.multipart_threshold, 8 * 1024 * 1024);
        assert_eq!(config.transfer_config.multipart_chunksize, 8 * 1024 * 1024);
        assert_eq!(config.max_keys, DEFAULT_MAX_KEYS);
        assert!(config.rate_limit_bandwidth.is_none());
        assert!(!config.head_each_target);
        assert!(!config.dry_run);
        assert!(!config.report_structure);
        assert!(config.structure_max_depth.is_none());
        assert!(!config.notification_manager.is_sink_registered());

        assert_eq!(
            config.tracing_config.unwrap().tracing_level,
            log::Level::Warn
        );
    }

    #[test]
    fn build_with_custom_options() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3migrate",
            "--source-endpoint-url",
            "https://kr.object.ncloudstorage.com",
            "--source-region",
            "kr-standard",
            "--source-force-path-style",
            "--target-region",
            "ap-northeast-2",
            "--worker-size",
            "16",
            "--max-attempts",
            "5",
            "--transfer-initial-backoff-milliseconds",
            "10",
            "--max-backoff-milliseconds",
            "100",
            "--multipart-threshold",
            "16MiB",
            "--multipart-chunksize",
            "5MiB",
            "--rate-limit-bandwidth",
            "10MiB",
            "--head-each-target",
            "--report-structure",
            "--structure-max-depth",
            "2",
            "--log-notifications",
            "s3://source-bucket",
            "s3://target-bucket",
        ];

        let config = build_config_from_args(args).unwrap();

        let source_client_config = config.source_client_config.as_ref().unwrap();
        assert_eq!(
            source_client_config.endpoint_url.as_deref(),
            Some("https://kr.object.ncloudstorage.com")
        );
        assert_eq!(source_client_config.region.as_deref(), Some("kr-standard"));
        assert!(source_client_config.force_path_style);

        let target_client_config = config.target_client_config.as_ref().unwrap();
        assert_eq!(
            target_client_config.region.as_deref(),
            Some("ap-northeast-2")
        );
        assert!(target_client_config.endpoint_url.is_none());

        assert_eq!(config.worker_size, 16);
        assert_eq!(config.transfer_retry_config.max_attempts, 5);
        assert_eq!(config.transfer_retry_config.initial_backoff_milliseconds, 10);
        assert_eq!(config.transfer_retry_config.max_backoff_milliseconds, 100);
        assert_eq!(config.transfer_config.multipart_threshold, 16 * 1024 * 1024);
        assert_eq!(config.transfer_config.multipart_chunksize, 5 * 1024 * 1024);
        assert_eq!(config.rate_limit_bandwidth, Some(10 * 1024 * 1024));
        assert!(config.head_each_target);
        assert!(config.report_structure);
        assert_eq!(config.structure_max_depth, Some(2));
        assert!(config.log_notifications);
        assert!(config.notification_manager.is_sink_registered());
    }

    #[test]
    fn dry_run_raises_tracing_level_to_info() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3migrate",
            "--dry-run",
            "s3://source-bucket",
            "s3://target-bucket",
        ];
        let config = build_config_from_args(args).unwrap();
        assert!(config.dry_run);
        assert_eq!(
            config.tracing_config.unwrap().tracing_level,
            log::Level::Info
        );

        let args = vec![
            "s3migrate",
            "--dry-run",
            "-vv",
            "s3://source-bucket",
            "s3://target-bucket",
        ];
        let config = build_config_from_args(args).unwrap();
        assert_eq!(
            config.tracing_config.unwrap().tracing_level,
            log::Level::Debug
        );

        let args = vec![
            "s3migrate",
            "--dry-run",
            "-qq",
            "--json-tracing",
            "s3://source-bucket",
            "s3://target-bucket",
        ];
        let config = build_config_from_args(args).unwrap();
        let tracing_config = config.tracing_config.unwrap();
        assert_eq!(tracing_config.tracing_level, log::Level::Info);
        assert!(!tracing_config.json_tracing);
    }

    #[test]
    fn quiet_disables_tracing() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3migrate",
            "-qqq",
            "s3://source-bucket",
            "s3://target-bucket",
        ];
        let config = build_config_from_args(args).unwrap();
        assert!(config.tracing_config.is_none());
    }

    #[test]
    fn build_error_with_invalid_options() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3migrate",
            "--transfer-initial-backoff-milliseconds",
            "1000",
            "--max-backoff-milliseconds",
            "10",
            "s3://source-bucket",
            "s3://target-bucket",
        ];
        assert_eq!(
            build_config_from_args(args).unwrap_err(),
            MAX_BACKOFF_LESS_THAN_INITIAL_BACKOFF
        );

        let args = vec![
            "s3migrate",
            "--structure-max-depth",
            "2",
            "s3://source-bucket",
            "s3://target-bucket",
        ];
        assert_eq!(
            build_config_from_args(args).unwrap_err(),
            STRUCTURE_MAX_DEPTH_WITHOUT_REPORT
        );

        let args = vec![
            "s3migrate",
            "--max-attempts",
            "0",
            "s3://source-bucket",
            "s3://target-bucket",
        ];
        assert!(build_config_from_args(args).is_err());

        let args = vec![
            "s3migrate",
            "--worker-size",
            "0",
            "s3://source-bucket",
            "s3://target-bucket",
        ];
        assert!(build_config_from_args(args).is_err());
    }

    #[test]
    fn auto_complete_shell_without_storage() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3migrate", "--auto-complete-shell", "bash"];
        let config = build_config_from_args(args).unwrap();
        assert!(config.auto_complete_shell.is_some());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
