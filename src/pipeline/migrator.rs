use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use tracing::{debug, info, trace, warn};

use crate::pipeline::comparator::{decide, resolve_destination};
use crate::pipeline::key_aggregator::DestinationIndex;
use crate::pipeline::transfer::ObjectTransfer;
use crate::types::{MigrationStatistics, ObjectDescriptor, TransferOutcome};

use super::stage::Stage;

/// One worker of the pool. Receives listed objects, decides what to do with each and sends
/// exactly one outcome per received object.
pub struct ObjectMigrator {
    worker_index: u16,
    base: Stage,
    transfer: ObjectTransfer,
    destination_index: Arc<DestinationIndex>,
    outcome_sender: Sender<TransferOutcome>,
}

impl ObjectMigrator {
    pub fn new(
        base: Stage,
        worker_index: u16,
        destination_index: Arc<DestinationIndex>,
        outcome_sender: Sender<TransferOutcome>,
    ) -> Self {
        let transfer = ObjectTransfer::new(&base, worker_index);
        Self {
            worker_index,
            base,
            transfer,
            destination_index,
            outcome_sender,
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        trace!(worker_index = self.worker_index, "migration worker has started.");

        let receiver = self
            .base
            .receiver
            .as_ref()
            .ok_or_else(|| anyhow!("migration worker has no receiver."))?;

        loop {
            // A cancelled worker takes no further object even when one is queued.
            tokio::select! {
                biased;

                _ = self.base.cancellation_token.cancelled() => {
                    info!(worker_index = self.worker_index, "migration worker has been cancelled.");
                    break;
                }
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(object) => {
                            let outcome = self.migrate_object(object).await;
                            self.outcome_sender
                                .send(outcome)
                                .await
                                .context("async_channel::Sender::send() failed.")?;
                        },
                        Err(_) => {
                            // normal shutdown
                            trace!(worker_index = self.worker_index, "migration worker has been completed.");
                            break;
                        }
                    }
                },
            }
        }

        Ok(())
    }

    async fn migrate_object(&self, object: ObjectDescriptor) -> TransferOutcome {
        let key = object.key.as_str();

        let destination = resolve_destination(&self.destination_index, &self.base.target, key)
            .await
            .unwrap_or_else(|e| {
                warn!(
                    worker_index = self.worker_index,
                    key = key,
                    bucket = self.base.target.bucket(),
                    error = format!("{e:#}"),
                    "comparison failed. the object is treated as different."
                );
                None
            });

        let decision = decide(&object, destination.as_ref());
        if decision.is_skip() {
            debug!(
                worker_index = self.worker_index,
                key = key,
                size = object.size,
                "object is already identical. skipping."
            );
            self.base
                .send_stats(MigrationStatistics::TransferSkip {
                    key: key.to_string(),
                })
                .await;

            return TransferOutcome::skipped(key);
        }

        debug!(
            worker_index = self.worker_index,
            key = key,
            decision = decision.to_string(),
            "object will be transferred."
        );

        self.transfer.transfer(&object, decision).await
    }
}

#[cfg(test)]
mod tests {
    use crate::Config;
    use crate::config::args::parse_from_args;
    use crate::storage::memory::MemoryStorage;
    use crate::types::token::create_pipeline_cancellation_token;
    use crate::types::{MigrationDecision, UpdateReason};

    use super::*;

    struct Fixture {
        source: MemoryStorage,
        target: MemoryStorage,
        object_sender: Sender<ObjectDescriptor>,
        outcome_receiver: async_channel::Receiver<TransferOutcome>,
        migrator: ObjectMigrator,
    }

    fn fixture(destination_index: DestinationIndex) -> Fixture {
        let args = vec![
            "s3migrate",
            "--transfer-initial-backoff-milliseconds",
            "1",
            "s3://source-bucket",
            "s3://target-bucket",
        ];
        let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();

        let source = MemoryStorage::new("source-bucket");
        let target = MemoryStorage::new("target-bucket");
        let (object_sender, object_receiver) = async_channel::bounded(10);
        let (outcome_sender, outcome_receiver) = async_channel::bounded(10);
        let (stats_sender, _) = async_channel::unbounded();

        let stage = Stage::new(
            config,
            source.boxed(),
            target.boxed(),
            Some(object_receiver),
            None,
            create_pipeline_cancellation_token(),
            stats_sender,
            None,
        );
        let migrator = ObjectMigrator::new(
            stage,
            0,
            Arc::new(destination_index),
            outcome_sender,
        );

        Fixture {
            source,
            target,
            object_sender,
            outcome_receiver,
            migrator,
        }
    }

    fn listed(storage: &MemoryStorage, key: &str) -> ObjectDescriptor {
        let object = storage.object(key).unwrap();
        ObjectDescriptor::new(
            key,
            object.data.len() as u64,
            object.e_tag.as_deref(),
            object.last_modified,
        )
    }

    #[tokio::test]
    async fn migrate_copy_update_and_skip() {
        init_dummy_tracing_subscriber();

        let fixture = fixture(DestinationIndex::HeadEachObject);
        fixture.source.insert("new", b"0123456789");
        fixture.source.insert("same", b"01234567890123456789");
        fixture.target.insert("same", b"01234567890123456789");
        fixture.source.insert("changed", b"abcdefghijklmno");
        fixture.target.insert("changed", b"ABCDEFGHIJKLMNO");

        for key in ["new", "same", "changed"] {
            fixture
                .object_sender
                .send(listed(&fixture.source, key))
                .await
                .unwrap();
        }
        fixture.object_sender.close();

        fixture.migrator.migrate().await.unwrap();

        let mut outcomes = Vec::new();
        while let Ok(outcome) = fixture.outcome_receiver.try_recv() {
            outcomes.push(outcome);
        }
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].decision, MigrationDecision::Copy);
        assert!(outcomes[1].is_skipped());
        assert_eq!(
            outcomes[2].decision,
            MigrationDecision::Update(UpdateReason::ChecksumMismatch)
        );
        assert!(outcomes.iter().all(|outcome| outcome.success));

        assert_eq!(fixture.source.calls().get_object, 2);
        assert_eq!(
            fixture.target.object("changed").unwrap().data,
            b"abcdefghijklmno"
        );
    }

    #[tokio::test]
    async fn migrate_comparison_failure_is_treated_as_copy() {
        init_dummy_tracing_subscriber();

        let fixture = fixture(DestinationIndex::HeadEachObject);
        fixture.source.insert("data", b"abc");
        fixture.target.insert("data", b"abc");
        fixture.target.fail_head_object(true);

        fixture
            .object_sender
            .send(listed(&fixture.source, "data"))
            .await
            .unwrap();
        fixture.object_sender.close();

        fixture.migrator.migrate().await.unwrap();

        let outcome = fixture.outcome_receiver.try_recv().unwrap();
        assert_eq!(outcome.decision, MigrationDecision::Copy);
        assert!(outcome.success);
        assert_eq!(fixture.target.calls().put_object, 1);
    }

    #[tokio::test]
    async fn migrate_cancelled() {
        init_dummy_tracing_subscriber();

        let fixture = fixture(DestinationIndex::from_objects(vec![]));
        fixture.migrator.base.cancellation_token.cancel();

        fixture.migrator.migrate().await.unwrap();

        assert!(fixture.outcome_receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn migrate_cancelled_leaves_queued_objects() {
        init_dummy_tracing_subscriber();

        let fixture = fixture(DestinationIndex::from_objects(vec![]));
        fixture.source.insert("queued1", b"data");
        fixture.source.insert("queued2", b"data");
        for key in ["queued1", "queued2"] {
            fixture
                .object_sender
                .send(listed(&fixture.source, key))
                .await
                .unwrap();
        }
        fixture.migrator.base.cancellation_token.cancel();

        fixture.migrator.migrate().await.unwrap();

        assert!(fixture.outcome_receiver.try_recv().is_err());
        assert_eq!(fixture.object_sender.len(), 2);
        assert_eq!(fixture.source.calls().get_object, 0);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
