use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_channel::{Receiver, Sender};
use leaky_bucket::RateLimiter;

use crate::Config;
use crate::storage::Storage;
use crate::types::token::PipelineCancellationToken;
use crate::types::{MigrationStatistics, ObjectDescriptor};

pub struct Stage {
    pub config: Config,
    pub source: Storage,
    pub target: Storage,
    pub receiver: Option<Receiver<ObjectDescriptor>>,
    pub sender: Option<Sender<ObjectDescriptor>>,
    pub cancellation_token: PipelineCancellationToken,
    pub stats_sender: Sender<MigrationStatistics>,
    pub rate_limit_bandwidth: Option<Arc<RateLimiter>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    Success,
    Closed,
}

impl Stage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        source: Storage,
        target: Storage,
        receiver: Option<Receiver<ObjectDescriptor>>,
        sender: Option<Sender<ObjectDescriptor>>,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<MigrationStatistics>,
        rate_limit_bandwidth: Option<Arc<RateLimiter>>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            receiver,
            sender,
            cancellation_token,
            stats_sender,
            rate_limit_bandwidth,
        }
    }

    pub async fn send(&self, object: ObjectDescriptor) -> Result<SendResult> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("stage has no sender."))?;

        let result = sender
            .send(object)
            .await
            .context("async_channel::Sender::send() failed.");

        if let Err(e) = result {
            return if !sender.is_closed() {
                Err(e)
            } else {
                Ok(SendResult::Closed)
            };
        }

        Ok(SendResult::Success)
    }

    /// Live statistics may be dropped when nobody listens.
    pub async fn send_stats(&self, stats: MigrationStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }
}
