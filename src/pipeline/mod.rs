use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender};
use leaky_bucket::RateLimiter;
use tokio::task::JoinHandle;
use tracing::{error, info, trace};

use crate::Config;
use crate::pipeline::aggregator::{OutcomeAggregator, log_summary};
use crate::pipeline::key_aggregator::{DestinationIndex, KeyAggregator};
use crate::pipeline::lister::ObjectLister;
use crate::pipeline::migrator::ObjectMigrator;
use crate::pipeline::stage::Stage;
use crate::storage::{Storage, StoragePair};
use crate::types::key_tree::{build_key_tree, render_key_tree};
use crate::types::notification::NotificationEvent;
use crate::types::stats::{MigrationStats, StatsAggregator};
use crate::types::token::PipelineCancellationToken;
use crate::types::{MigrationStatistics, ObjectDescriptor, TransferOutcome};

const CHANNEL_CAPACITY: usize = 20000;

pub mod aggregator;
pub mod comparator;
pub mod key_aggregator;
pub mod lister;
mod migrator;
mod stage;
mod storage_factory;
pub mod transfer;

/// Drives one migration from the source bucket to the target bucket.
///
/// ```no_run
/// use s3migrate::Config;
/// use s3migrate::config::args::parse_from_args;
/// use s3migrate::pipeline::Pipeline;
/// use s3migrate::types::token::create_pipeline_cancellation_token;
///
/// # async fn run() -> anyhow::Result<()> {
/// let args = vec!["s3migrate", "s3://source-bucket/dir/", "s3://target-bucket"];
/// let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();
///
/// let mut pipeline = Pipeline::new(config, create_pipeline_cancellation_token()).await?;
/// let stats = pipeline.run().await?;
/// println!("{} objects transferred", stats.success);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: Config,
    source: Storage,
    target: Storage,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<MigrationStatistics>,
    stats_receiver: Receiver<MigrationStatistics>,
    rate_limit_bandwidth: Option<Arc<RateLimiter>>,
    stats_aggregator: Arc<StatsAggregator>,
    ready: bool,
}

impl Pipeline {
    pub async fn new(
        config: Config,
        cancellation_token: PipelineCancellationToken,
    ) -> Result<Self> {
        let StoragePair { source, target } =
            storage_factory::create_storage_pair(&config, cancellation_token.clone()).await?;

        Ok(Self::with_storage(config, source, target, cancellation_token))
    }

    /// Uses the given stores instead of building S3 clients from `config`.
    pub fn with_storage(
        config: Config,
        source: Storage,
        target: Storage,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        let (stats_sender, stats_receiver) = async_channel::unbounded();
        let rate_limit_bandwidth =
            storage_factory::create_bandwidth_limiter(config.rate_limit_bandwidth);

        Self {
            config,
            source,
            target,
            cancellation_token,
            stats_sender,
            stats_receiver,
            rate_limit_bandwidth,
            stats_aggregator: Arc::new(StatsAggregator::new()),
            ready: true,
        }
    }

    /// Returns the final statistics. Only bucket pre-flight and the source listing are
    /// fatal; failed objects are counted in `MigrationStats::failed`.
    pub async fn run(&mut self) -> Result<MigrationStats> {
        if !self.ready {
            return Err(anyhow!("pipeline can be executed only once."));
        }
        self.ready = false;

        let result = self.migrate().await;
        self.close_stats_sender();

        if let Err(e) = &result {
            error!(error = format!("{e:#}"), "migration has failed.");
        }

        result
    }

    async fn migrate(&self) -> Result<MigrationStats> {
        self.check_buckets().await?;

        let objects = self.list_source().await?;
        let total_bytes = objects.iter().map(|object| object.size).sum();
        self.stats_aggregator.begin(objects.len() as u64, total_bytes);

        info!(
            bucket = self.source.bucket(),
            prefix = self.config.source.prefix,
            total = objects.len(),
            total_bytes = total_bytes,
            "source objects have been listed."
        );

        if self.config.report_structure {
            self.report_structure(&objects);
        }

        self.config
            .notification_manager
            .notify(NotificationEvent::MigrationStart {
                source_bucket: self.source.bucket().to_string(),
                target_bucket: self.target.bucket().to_string(),
                prefix: self.config.source.prefix.clone(),
            })
            .await;

        let destination_index = Arc::new(self.build_destination_index().await);

        let (object_sender, object_receiver) = async_channel::bounded(CHANNEL_CAPACITY);
        let (outcome_sender, outcome_receiver) = async_channel::bounded(CHANNEL_CAPACITY);

        let aggregator_handle = self.spawn_aggregator(outcome_receiver);
        let worker_handles =
            self.spawn_workers(object_receiver, outcome_sender, destination_index);

        self.dispatch(objects, object_sender).await;

        for handle in worker_handles {
            if let Err(e) = handle.await {
                error!(error = e.to_string(), "migration worker has panicked.");
            }
        }
        if let Err(e) = aggregator_handle.await {
            error!(error = e.to_string(), "outcome aggregator has panicked.");
        }

        if self.cancellation_token.is_cancelled() {
            self.stats_aggregator.mark_cancelled();
        }
        let stats = self.stats_aggregator.finalize();

        log_summary(&stats);

        let event = if stats.cancelled {
            NotificationEvent::MigrationCancelled {
                stats: stats.clone(),
            }
        } else {
            NotificationEvent::BatchSummary {
                stats: stats.clone(),
            }
        };
        self.config.notification_manager.notify(event).await;

        Ok(stats)
    }

    async fn check_buckets(&self) -> Result<()> {
        self.source.head_bucket().await?;
        self.target.head_bucket().await?;

        trace!(
            source_bucket = self.source.bucket(),
            target_bucket = self.target.bucket(),
            "both buckets are reachable."
        );

        Ok(())
    }

    async fn list_source(&self) -> Result<Vec<ObjectDescriptor>> {
        ObjectLister::new(
            dyn_clone::clone_box(&*self.source),
            &self.config.source.prefix,
            self.config.max_keys,
            self.cancellation_token.clone(),
        )
        .list_all()
        .await
    }

    async fn build_destination_index(&self) -> DestinationIndex {
        if self.config.head_each_target {
            return DestinationIndex::HeadEachObject;
        }

        KeyAggregator::new(
            dyn_clone::clone_box(&*self.target),
            &self.config.source.prefix,
            self.config.max_keys,
            self.cancellation_token.clone(),
        )
        .aggregate()
        .await
    }

    fn report_structure(&self, objects: &[ObjectDescriptor]) {
        let root = build_key_tree(self.source.bucket(), &self.config.source.prefix, objects);
        for line in render_key_tree(&root, self.config.structure_max_depth) {
            info!("{line}");
        }
    }

    fn spawn_aggregator(&self, outcome_receiver: Receiver<TransferOutcome>) -> JoinHandle<()> {
        let aggregator = OutcomeAggregator::new(
            self.stats_aggregator.clone(),
            outcome_receiver,
            self.config.notification_manager.clone(),
        );

        tokio::spawn(async move { aggregator.aggregate().await })
    }

    fn spawn_workers(
        &self,
        object_receiver: Receiver<ObjectDescriptor>,
        outcome_sender: Sender<TransferOutcome>,
        destination_index: Arc<DestinationIndex>,
    ) -> Vec<JoinHandle<()>> {
        (0..self.config.worker_size)
            .map(|worker_index| {
                let stage = self.create_worker_stage(object_receiver.clone());
                let migrator = ObjectMigrator::new(
                    stage,
                    worker_index,
                    destination_index.clone(),
                    outcome_sender.clone(),
                );

                tokio::spawn(async move {
                    if let Err(e) = migrator.migrate().await {
                        error!(
                            worker_index = worker_index,
                            error = format!("{e:#}"),
                            "migration worker has failed."
                        );
                    }
                })
            })
            .collect()
    }

    /// Feeds listed objects to the workers until every object is queued or the run is
    /// cancelled.
    async fn dispatch(
        &self,
        objects: Vec<ObjectDescriptor>,
        object_sender: Sender<ObjectDescriptor>,
    ) {
        for object in objects {
            if self.cancellation_token.is_cancelled() {
                info!("dispatching has been cancelled.");
                break;
            }

            tokio::select! {
                send_result = object_sender.send(object) => {
                    if send_result.is_err() {
                        trace!("object channel has been closed.");
                        break;
                    }
                },
                _ = self.cancellation_token.cancelled() => {
                    info!("dispatching has been cancelled.");
                    break;
                }
            }
        }

        object_sender.close();
    }

    fn create_worker_stage(&self, receiver: Receiver<ObjectDescriptor>) -> Stage {
        Stage::new(
            self.config.clone(),
            dyn_clone::clone_box(&*self.source),
            dyn_clone::clone_box(&*self.target),
            Some(receiver),
            None,
            self.cancellation_token.clone(),
            self.stats_sender.clone(),
            self.rate_limit_bandwidth.clone(),
        )
    }

    /// Live transfer statistics for a progress indicator. Closed when `run()` returns.
    pub fn get_stats_receiver(&self) -> Receiver<MigrationStatistics> {
        self.stats_receiver.clone()
    }

    /// A read-consistent copy of the running totals.
    pub fn get_stats_snapshot(&self) -> MigrationStats {
        self.stats_aggregator.snapshot()
    }

    pub fn close_stats_sender(&self) {
        self.stats_sender.close();
    }
}

#[cfg(test)]
mod tests {
    use crate::config::args::parse_from_args;
    use crate::storage::memory::{BucketState, MemoryStorage};
    use crate::types::error::MigrationError;
    use crate::types::token::create_pipeline_cancellation_token;

    use super::*;

    fn config(extra_args: &[&str]) -> Config {
        let mut args = vec![
            "s3migrate",
            "--transfer-initial-backoff-milliseconds",
            "1",
            "--max-backoff-milliseconds",
            "2",
        ];
        args.extend_from_slice(extra_args);
        args.extend_from_slice(&["s3://source-bucket", "s3://target-bucket"]);
        Config::try_from(parse_from_args(args).unwrap()).unwrap()
    }

    fn pipeline(
        source: &MemoryStorage,
        target: &MemoryStorage,
        extra_args: &[&str],
    ) -> Pipeline {
        Pipeline::with_storage(
            config(extra_args),
            source.boxed(),
            target.boxed(),
            create_pipeline_cancellation_token(),
        )
    }

    #[tokio::test]
    async fn new_pipeline() {
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
            "s3://source-bucket",
            "s3://target-bucket",
        ];
        let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();

        assert!(
            Pipeline::new(config, create_pipeline_cancellation_token())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn run_pipeline() {
        init_dummy_tracing_subscriber();

        let source = MemoryStorage::new("source-bucket");
        let target = MemoryStorage::new("target-bucket");
        source.insert("dir/data1", b"0123456789");
        source.insert("dir/data2", b"01234");

        let mut pipeline = pipeline(&source, &target, &[]);
        let stats = pipeline.run().await.unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.total_bytes, 15);
        assert_eq!(stats.transferred_bytes, 15);
        assert!(!stats.cancelled);
        assert_eq!(target.keys(), vec!["dir/data1", "dir/data2"]);
        assert_eq!(pipeline.get_stats_snapshot().success, 2);
    }

    #[tokio::test]
    async fn elapsed_time_starts_with_run() {
        init_dummy_tracing_subscriber();

        let source = MemoryStorage::new("source-bucket");
        let target = MemoryStorage::new("target-bucket");
        source.insert("data1", b"0123456789");

        let mut pipeline = pipeline(&source, &target, &[]);
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        let stats = pipeline.run().await.unwrap();

        assert_eq!(stats.success, 1);
        assert!(stats.elapsed() < std::time::Duration::from_millis(500));
    }

    #[tokio::test]
    async fn run_pipeline_twice() {
        init_dummy_tracing_subscriber();

        let source = MemoryStorage::new("source-bucket");
        let target = MemoryStorage::new("target-bucket");

        let mut pipeline = pipeline(&source, &target, &[]);
        pipeline.run().await.unwrap();
        assert!(pipeline.run().await.is_err());
    }

    #[tokio::test]
    async fn run_pipeline_empty_source() {
        init_dummy_tracing_subscriber();

        let source = MemoryStorage::new("source-bucket");
        let target = MemoryStorage::new("target-bucket");

        let stats = pipeline(&source, &target, &[]).run().await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.processed(), 0);
        assert_eq!(stats.percent(), 100.0);
    }

    #[tokio::test]
    async fn run_pipeline_target_bucket_not_found() {
        init_dummy_tracing_subscriber();

        let source = MemoryStorage::new("source-bucket");
        let target = MemoryStorage::new("target-bucket");
        target.set_bucket_state(BucketState::NotFound);

        let e = pipeline(&source, &target, &[]).run().await.unwrap_err();
        assert_eq!(
            e.downcast_ref::<MigrationError>(),
            Some(&MigrationError::BucketNotFound {
                bucket: "target-bucket".to_string()
            })
        );
        assert_eq!(source.calls().list_objects_page, 0);
    }

    #[tokio::test]
    async fn run_pipeline_with_report_structure() {
        init_dummy_tracing_subscriber();

        let source = MemoryStorage::new("source-bucket");
        let target = MemoryStorage::new("target-bucket");
        source.insert("dir/sub/data1", b"1");

        let extra_args = ["--report-structure", "--structure-max-depth", "1"];
        let stats = pipeline(&source, &target, &extra_args)
            .run()
            .await
            .unwrap();
        assert_eq!(stats.success, 1);
    }

    #[tokio::test]
    async fn stats_receiver_is_closed_after_run() {
        init_dummy_tracing_subscriber();

        let source = MemoryStorage::new("source-bucket");
        let target = MemoryStorage::new("target-bucket");
        source.insert("data1", b"abc");

        let mut pipeline = pipeline(&source, &target, &[]);
        let stats_receiver = pipeline.get_stats_receiver();
        pipeline.run().await.unwrap();

        let mut complete = 0;
        let mut bytes = 0;
        while let Ok(stats) = stats_receiver.recv().await {
            match stats {
                MigrationStatistics::TransferComplete { .. } => complete += 1,
                MigrationStatistics::TransferBytes(transferred) => bytes += transferred,
                _ => {}
            }
        }
        assert_eq!(complete, 1);
        assert_eq!(bytes, 3);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
