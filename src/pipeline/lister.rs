use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use tracing::{debug, trace};

use crate::storage::Storage;
use crate::types::ObjectDescriptor;
use crate::types::error::MigrationError;
use crate::types::token::PipelineCancellationToken;

/// Enumerates every object under `prefix`, page by page, following continuation tokens.
///
/// Each call starts a fresh listing. A failed page fails the whole listing with
/// `MigrationError::ListFailed`.
pub struct ObjectLister {
    storage: Storage,
    prefix: String,
    max_keys: i32,
    cancellation_token: PipelineCancellationToken,
}

impl ObjectLister {
    pub fn new(
        storage: Storage,
        prefix: &str,
        max_keys: i32,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            storage,
            prefix: prefix.to_string(),
            max_keys,
            cancellation_token,
        }
    }

    pub async fn list(&self, sender: &Sender<ObjectDescriptor>) -> Result<()> {
        trace!(
            bucket = self.storage.bucket(),
            prefix = self.prefix,
            "list objects has started."
        );

        let mut continuation_token = None;
        let mut page_count = 0;
        loop {
            if self.cancellation_token.is_cancelled() {
                return Err(anyhow!(MigrationError::Cancelled));
            }

            let page = self
                .storage
                .list_objects_page(&self.prefix, continuation_token, self.max_keys)
                .await
                .map_err(|e| {
                    anyhow!(MigrationError::ListFailed {
                        bucket: self.storage.bucket().to_string(),
                        message: format!("{e:#}"),
                    })
                })?;
            page_count += 1;

            for object in page.objects {
                if sender.is_closed() {
                    debug!(bucket = self.storage.bucket(), "listing receiver closed.");
                    return Ok(());
                }

                sender
                    .send(object)
                    .await
                    .context("async_channel::Sender::send() failed.")?;
            }

            continuation_token = page.next_continuation_token;
            if continuation_token.is_none() {
                break;
            }
        }

        trace!(
            bucket = self.storage.bucket(),
            prefix = self.prefix,
            page_count = page_count,
            "list objects has been completed."
        );

        Ok(())
    }

    pub async fn list_all(&self) -> Result<Vec<ObjectDescriptor>> {
        let (sender, receiver) = async_channel::unbounded();
        self.list(&sender).await?;
        drop(sender);

        let mut objects = Vec::with_capacity(receiver.len());
        while let Ok(object) = receiver.recv().await {
            objects.push(object);
        }

        Ok(objects)
    }
}
