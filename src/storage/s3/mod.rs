use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::DateTime;
use aws_sdk_s3::types::Object;
use tracing::{debug, trace, warn};

use crate::config::{ClientConfig, TransferConfig};
use crate::storage::s3::upload_manager::UploadManager;
use crate::storage::{ListPage, ObjectBody, Storage, StorageTrait};
use crate::types::error::MigrationError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ObjectDescriptor, StoragePath};

mod client_builder;
mod upload_manager;

pub struct S3StorageFactory {}

impl S3StorageFactory {
    pub async fn create(
        transfer_config: TransferConfig,
        path: StoragePath,
        cancellation_token: PipelineCancellationToken,
        client_config: Option<ClientConfig>,
    ) -> Result<Storage> {
        let client_config = client_config
            .ok_or_else(|| anyhow!("no client config for bucket {}.", path.bucket))?;

        Ok(S3Storage::boxed_new(
            transfer_config,
            path,
            cancellation_token,
            Arc::new(client_config.create_client().await),
        ))
    }
}

/// One bucket at one S3-compatible endpoint. The `Client` is shared between workers.
#[derive(Clone)]
struct S3Storage {
    bucket: String,
    client: Arc<Client>,
    transfer_config: TransferConfig,
    cancellation_token: PipelineCancellationToken,
}

impl S3Storage {
    fn boxed_new(
        transfer_config: TransferConfig,
        path: StoragePath,
        cancellation_token: PipelineCancellationToken,
        client: Arc<Client>,
    ) -> Storage {
        Box::new(S3Storage {
            bucket: path.bucket,
            client,
            transfer_config,
            cancellation_token,
        })
    }
}

#[async_trait]
impl StorageTrait for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_bucket(&self) -> Result<()> {
        let result = self.client.head_bucket().bucket(&self.bucket).send().await;

        match result {
            Ok(head_bucket_output) => {
                trace!(bucket = self.bucket, "{head_bucket_output:?}");
                Ok(())
            }
            Err(e) if is_bucket_not_found(&e) => Err(anyhow!(MigrationError::BucketNotFound {
                bucket: self.bucket.clone(),
            })),
            Err(e) => Err(anyhow!(MigrationError::BucketUnreachable {
                bucket: self.bucket.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })),
        }
    }

    async fn list_objects_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ListPage> {
        let list_objects_output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_continuation_token(continuation_token)
            .max_keys(max_keys)
            .send()
            .await
            .context("aws_sdk_s3::client::list_objects_v2() failed.")?;

        let objects = list_objects_output
            .contents()
            .iter()
            .filter_map(|object| {
                let descriptor = convert_to_descriptor(object);
                if descriptor.is_none() {
                    warn!(bucket = self.bucket, "object without key is ignored.");
                }
                descriptor
            })
            .collect::<Vec<_>>();

        // Some providers omit IsTruncated and only return a continuation token.
        let next_continuation_token = if list_objects_output.is_truncated().unwrap_or(true) {
            list_objects_output
                .next_continuation_token()
                .map(|token| token.to_string())
        } else {
            None
        };

        debug!(
            bucket = self.bucket,
            prefix = prefix,
            count = objects.len(),
            truncated = next_continuation_token.is_some(),
            "list_objects_v2() page received."
        );

        Ok(ListPage {
            objects,
            next_continuation_token,
        })
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectDescriptor>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(head_object_output) => Ok(Some(ObjectDescriptor::new(
                key,
                head_object_output.content_length().unwrap_or_default() as u64,
                head_object_output.e_tag(),
                head_object_output
                    .last_modified()
                    .cloned()
                    .unwrap_or_else(|| DateTime::from_secs(0)),
            ))),
            Err(e) if is_object_not_found(&e) => Ok(None),
            Err(e) => Err(e).context("aws_sdk_s3::client::head_object() failed."),
        }
    }

    async fn get_object(&self, key: &str) -> Result<ObjectBody> {
        let get_object_output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("aws_sdk_s3::client::get_object() failed.")?;

        let content_length = get_object_output.content_length().unwrap_or_default() as u64;
        Ok(ObjectBody::new(get_object_output.body, content_length))
    }

    async fn put_object(&self, key: &str, body: ObjectBody, size: u64) -> Result<()> {
        let mut upload_manager = UploadManager::new(
            self.client.clone(),
            self.transfer_config,
            self.cancellation_token.clone(),
        );

        upload_manager.upload(&self.bucket, key, body, size).await
    }
}

fn convert_to_descriptor(object: &Object) -> Option<ObjectDescriptor> {
    Some(ObjectDescriptor::new(
        object.key()?,
        object.size().unwrap_or_default() as u64,
        object.e_tag(),
        object
            .last_modified()
            .cloned()
            .unwrap_or_else(|| DateTime::from_secs(0)),
    ))
}

fn is_bucket_not_found(e: &SdkError<HeadBucketError>) -> bool {
    if let SdkError::ServiceError(service_error) = e {
        return service_error.err().is_not_found() || service_error.raw().status().as_u16() == 404;
    }

    false
}

fn is_object_not_found(e: &SdkError<HeadObjectError>) -> bool {
    if let SdkError::ServiceError(service_error) = e {
        return service_error.err().is_not_found() || service_error.raw().status().as_u16() == 404;
    }

    false
}
