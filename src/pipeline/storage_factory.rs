use std::sync::Arc;

use anyhow::{Context, Result};
use leaky_bucket::RateLimiter;

use crate::Config;
use crate::storage::StoragePair;
use crate::storage::s3::S3StorageFactory;
use crate::types::token::PipelineCancellationToken;

// default refill interval 100ms
const REFILL_PER_INTERVAL_DIVIDER: usize = 10;

pub async fn create_storage_pair(
    config: &Config,
    cancellation_token: PipelineCancellationToken,
) -> Result<StoragePair> {
    let source = S3StorageFactory::create(
        config.transfer_config,
        config.source.clone(),
        cancellation_token.clone(),
        config.source_client_config.clone(),
    )
    .await
    .context("failed to create source storage.")?;

    let target = S3StorageFactory::create(
        config.transfer_config,
        config.target.clone(),
        cancellation_token,
        config.target_client_config.clone(),
    )
    .await
    .context("failed to create target storage.")?;

    Ok(StoragePair { source, target })
}

/// Bytes per second shared by every worker. Each read from a source body acquires its
/// length from the bucket.
pub fn create_bandwidth_limiter(rate_limit_bandwidth: Option<u64>) -> Option<Arc<RateLimiter>> {
    let rate_limit_bandwidth = rate_limit_bandwidth? as usize;
    let refill = (rate_limit_bandwidth / REFILL_PER_INTERVAL_DIVIDER).max(1);

    Some(Arc::new(
        RateLimiter::builder()
            .max(rate_limit_bandwidth)
            .initial(rate_limit_bandwidth)
            .refill(refill)
            .fair(true)
            .build(),
    ))
}

#[cfg(test)]
mod tests {
    use crate::config::args::parse_from_args;
    use crate::types::token::create_pipeline_cancellation_token;

    use super::*;

    #[tokio::test]
    async fn create_storage_pair_from_config() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3migrate",
            "--source-access-key",
            "source_access_key",
            "--source-secret-access-key",
            "source_secret_access_key",
            "--target-access-key",
            "target_access_key",
            "--target-secret-access-key",
            "target_secret_access_key",
            "s3://source-bucket/dir/",
            "s3://target-bucket",
        ];
        let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();

        let StoragePair { source, target } =
            create_storage_pair(&config, create_pipeline_cancellation_token())
                .await
                .unwrap();

        assert_eq!(source.bucket(), "source-bucket");
        assert_eq!(target.bucket(), "target-bucket");
    }

    #[tokio::test]
    async fn create_storage_pair_without_client_config() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3migrate", "s3://source-bucket", "s3://target-bucket"];
        let mut config = Config::try_from(parse_from_args(args).unwrap()).unwrap();
        config.target_client_config = None;

        assert!(
            create_storage_pair(&config, create_pipeline_cancellation_token())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn create_bandwidth_limiter_test() {
        init_dummy_tracing_subscriber();

        assert!(create_bandwidth_limiter(None).is_none());

        let limiter = create_bandwidth_limiter(Some(1024 * 1024)).unwrap();
        assert!(limiter.try_acquire(1024 * 1024));
        assert!(!limiter.try_acquire(1024 * 1024));

        let limiter = create_bandwidth_limiter(Some(5)).unwrap();
        assert!(limiter.try_acquire(5));
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
