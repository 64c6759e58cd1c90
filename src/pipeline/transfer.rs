use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Error, Result};
use async_channel::Sender;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::operation::complete_multipart_upload::CompleteMultipartUploadError;
use aws_sdk_s3::operation::create_multipart_upload::CreateMultipartUploadError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::operation::upload_part::UploadPartError;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use aws_smithy_types::body::SdkBody;
use leaky_bucket::RateLimiter;
use tracing::{debug, error, info, warn};

use crate::config::TransferRetryConfig;
use crate::storage::Storage;
use crate::types::error::{StreamError, is_cancelled_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{
    MigrationDecision, MigrationStatistics, ObjectDescriptor, TransferError, TransferErrorKind,
    TransferOutcome,
};

use super::stage::Stage;

/// Copies one object from the source bucket to the target bucket, retrying the whole
/// GET/PUT pair with capped exponential backoff.
pub struct ObjectTransfer {
    worker_index: u16,
    source: Storage,
    target: Storage,
    transfer_retry_config: TransferRetryConfig,
    dry_run: bool,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<MigrationStatistics>,
    rate_limit_bandwidth: Option<Arc<RateLimiter>>,
}

impl ObjectTransfer {
    pub fn new(base: &Stage, worker_index: u16) -> Self {
        Self {
            worker_index,
            source: dyn_clone::clone_box(&*base.source),
            target: dyn_clone::clone_box(&*base.target),
            transfer_retry_config: base.config.transfer_retry_config,
            dry_run: base.config.dry_run,
            cancellation_token: base.cancellation_token.clone(),
            stats_sender: base.stats_sender.clone(),
            rate_limit_bandwidth: base.rate_limit_bandwidth.clone(),
        }
    }

    pub async fn transfer(
        &self,
        object: &ObjectDescriptor,
        decision: MigrationDecision,
    ) -> TransferOutcome {
        let key = object.key.as_str();

        if self.dry_run {
            info!(
                worker_index = self.worker_index,
                key = key,
                size = object.size,
                decision = decision.to_string(),
                "[dry-run] object would be transferred."
            );
            self.send_stats(MigrationStatistics::TransferComplete {
                key: key.to_string(),
            })
            .await;

            return TransferOutcome::succeeded(key, decision, 0, 0);
        }

        let max_attempts = self.transfer_retry_config.max_attempts;
        for attempt in 1..=max_attempts {
            if self.cancellation_token.is_cancelled() {
                return self.cancelled_outcome(key, decision, attempt - 1).await;
            }

            let e = match self.copy_object(object).await {
                Ok(()) => {
                    debug!(
                        worker_index = self.worker_index,
                        key = key,
                        size = object.size,
                        attempt = attempt,
                        decision = decision.to_string(),
                        "object has been transferred."
                    );
                    self.send_stats(MigrationStatistics::TransferComplete {
                        key: key.to_string(),
                    })
                    .await;

                    return TransferOutcome::succeeded(key, decision, object.size, attempt);
                }
                Err(e) => e,
            };

            let kind = classify_error(&e);
            if kind == TransferErrorKind::Cancelled {
                return self.cancelled_outcome(key, decision, attempt).await;
            }

            let transfer_error = TransferError::new(kind, &format!("{e:#}"));
            if attempt == max_attempts {
                error!(
                    worker_index = self.worker_index,
                    key = key,
                    bucket = self.target.bucket(),
                    attempt = attempt,
                    error = transfer_error.to_string(),
                    "transfer failed. no more attempts."
                );
                self.send_stats(MigrationStatistics::TransferError {
                    key: key.to_string(),
                })
                .await;

                return TransferOutcome::failed(key, decision, attempt, transfer_error);
            }

            let backoff_milliseconds = self.transfer_retry_config.backoff_milliseconds(attempt);
            warn!(
                worker_index = self.worker_index,
                key = key,
                bucket = self.target.bucket(),
                attempt = attempt,
                backoff_milliseconds = backoff_milliseconds,
                error = transfer_error.to_string(),
                "transfer attempt failed. retrying."
            );
            self.send_stats(MigrationStatistics::TransferRetry {
                key: key.to_string(),
            })
            .await;

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(backoff_milliseconds)) => {},
                _ = self.cancellation_token.cancelled() => {
                    return self.cancelled_outcome(key, decision, attempt).await;
                }
            }
        }

        // max_attempts is validated to be at least 1.
        TransferOutcome::failed(
            key,
            decision,
            0,
            TransferError::new(TransferErrorKind::Other, "no transfer attempt was made."),
        )
    }

    async fn copy_object(&self, object: &ObjectDescriptor) -> Result<()> {
        let object_body = self
            .source
            .get_object(&object.key)
            .await?
            .with_callback(self.stats_sender.clone(), self.rate_limit_bandwidth.clone());

        // The listed size is authoritative. A body of any other length is a stream error.
        self.target
            .put_object(&object.key, object_body, object.size)
            .await
    }

    async fn cancelled_outcome(
        &self,
        key: &str,
        decision: MigrationDecision,
        attempts: u32,
    ) -> TransferOutcome {
        info!(
            worker_index = self.worker_index,
            key = key,
            attempt = attempts,
            "transfer has been cancelled."
        );
        self.send_stats(MigrationStatistics::TransferError {
            key: key.to_string(),
        })
        .await;

        TransferOutcome::failed(
            key,
            decision,
            attempts,
            TransferError::new(TransferErrorKind::Cancelled, "cancelled"),
        )
    }

    async fn send_stats(&self, stats: MigrationStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }
}

pub fn classify_error(e: &Error) -> TransferErrorKind {
    if is_cancelled_error(e) {
        return TransferErrorKind::Cancelled;
    }

    if e.downcast_ref::<StreamError>().is_some() {
        return TransferErrorKind::Stream;
    }

    if let Some(error) = e.downcast_ref::<SdkError<GetObjectError, Response<SdkBody>>>() {
        return classify_sdk_error(error);
    }

    if let Some(error) = e.downcast_ref::<SdkError<PutObjectError, Response<SdkBody>>>() {
        return classify_sdk_error(error);
    }

    if let Some(error) =
        e.downcast_ref::<SdkError<CreateMultipartUploadError, Response<SdkBody>>>()
    {
        return classify_sdk_error(error);
    }

    if let Some(error) = e.downcast_ref::<SdkError<UploadPartError, Response<SdkBody>>>() {
        return classify_sdk_error(error);
    }

    if let Some(error) =
        e.downcast_ref::<SdkError<CompleteMultipartUploadError, Response<SdkBody>>>()
    {
        return classify_sdk_error(error);
    }

    if let Some(error) = e.chain().find_map(|cause| cause.downcast_ref::<io::Error>()) {
        return classify_io_error(error);
    }

    TransferErrorKind::Other
}

fn classify_sdk_error<E: ProvideErrorMetadata>(
    e: &SdkError<E, Response<SdkBody>>,
) -> TransferErrorKind {
    match e {
        SdkError::TimeoutError(_) => TransferErrorKind::Timeout,
        SdkError::DispatchFailure(failure) => {
            if failure.is_timeout() {
                TransferErrorKind::Timeout
            } else {
                TransferErrorKind::Network
            }
        }
        SdkError::ResponseError(_) => TransferErrorKind::Network,
        SdkError::ServiceError(service_error) => {
            let status = service_error.raw().status().as_u16();
            match (status, service_error.err().code()) {
                (404, _) | (_, Some("NoSuchKey")) => TransferErrorKind::NotFound,
                (403, _) | (_, Some("AccessDenied")) => TransferErrorKind::AccessDenied,
                _ => TransferErrorKind::Service,
            }
        }
        SdkError::ConstructionFailure(_) => TransferErrorKind::Other,
        _ => TransferErrorKind::Other,
    }
}

fn classify_io_error(e: &io::Error) -> TransferErrorKind {
    match e.kind() {
        io::ErrorKind::TimedOut => TransferErrorKind::Timeout,
        io::ErrorKind::NotFound => TransferErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => TransferErrorKind::AccessDenied,
        io::ErrorKind::UnexpectedEof => TransferErrorKind::Stream,
        _ => TransferErrorKind::Network,
    }
}
