use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use base64::{Engine as _, engine::general_purpose};
use tokio::io::AsyncRead;
use tracing::{trace, warn};

use crate::config::TransferConfig;
use crate::storage::e_tag_verify::{ETagHasher, verify_e_tag};
use crate::storage::{ObjectBody, ensure_end_of_stream, read_chunk, read_exact_size};
use crate::types::error::{MigrationError, StreamError};
use crate::types::token::PipelineCancellationToken;

const E_TAG_MISMATCH_WARNING: &str = "e_tag mismatch. the provider may calculate e_tag differently, \
 or the object in the target storage may be corrupted.";

/// Uploads one object body to the target bucket, as a single PUT below the multipart
/// threshold or as a multipart upload of `multipart_chunksize` parts otherwise.
///
/// Each part carries a Content-MD5 header, and the e_tag reported by the target is
/// compared with the locally computed one after the upload.
pub struct UploadManager {
    client: Arc<Client>,
    transfer_config: TransferConfig,
    cancellation_token: PipelineCancellationToken,
    e_tag_hasher: ETagHasher,
}

impl UploadManager {
    pub fn new(
        client: Arc<Client>,
        transfer_config: TransferConfig,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        UploadManager {
            client,
            transfer_config,
            cancellation_token,
            e_tag_hasher: ETagHasher::new(),
        }
    }

    pub async fn upload(
        &mut self,
        bucket: &str,
        key: &str,
        object_body: ObjectBody,
        size: u64,
    ) -> Result<()> {
        if self.transfer_config.is_multipart_upload_required(size) {
            self.multipart_upload(bucket, key, object_body, size).await
        } else {
            self.singlepart_upload(bucket, key, object_body, size).await
        }
    }

    async fn multipart_upload(
        &mut self,
        bucket: &str,
        key: &str,
        object_body: ObjectBody,
        size: u64,
    ) -> Result<()> {
        let create_multipart_upload_output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .context("aws_sdk_s3::client::Client create_multipart_upload() failed.")?;
        let upload_id = create_multipart_upload_output
            .upload_id()
            .ok_or_else(|| anyhow!("create_multipart_upload() returned no upload id."))?
            .to_string();

        let upload_result = self
            .upload_parts_and_complete(bucket, key, &upload_id, object_body, size)
            .await
            .context("upload_parts_and_complete() failed.");
        if let Err(e) = upload_result {
            let abort_result = self
                .client
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await;
            if let Err(abort_error) = abort_result {
                warn!(
                    key = key,
                    upload_id = upload_id,
                    error = aws_sdk_s3::error::DisplayErrorContext(&abort_error).to_string(),
                    "aws_sdk_s3::client::Client abort_multipart_upload() failed."
                );
            }

            return Err(e);
        }

        Ok(())
    }

    async fn upload_parts_and_complete(
        &mut self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        object_body: ObjectBody,
        size: u64,
    ) -> Result<()> {
        let upload_parts = self
            .upload_parts(bucket, key, upload_id, object_body, size)
            .await
            .context("upload_parts() failed.")?;

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(upload_parts))
            .build();

        let complete_multipart_upload_output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .context("aws_sdk_s3::client::Client complete_multipart_upload() failed.")?;

        trace!(
            key = key,
            upload_id = upload_id,
            "{complete_multipart_upload_output:?}"
        );

        self.verify_uploaded_e_tag(key, true, complete_multipart_upload_output.e_tag());

        Ok(())
    }

    async fn upload_parts(
        &mut self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        object_body: ObjectBody,
        size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let mut upload_parts: Vec<CompletedPart> = Vec::new();

        let mut part_number = 1;
        let mut remaining_bytes = size;

        let mut body = object_body.body.into_async_read();
        while 0 < remaining_bytes {
            if self.cancellation_token.is_cancelled() {
                return Err(anyhow!(MigrationError::Cancelled));
            }

            let chunksize = remaining_bytes.min(self.transfer_config.multipart_chunksize);
            let buffer = read_part(&mut body, chunksize, size - remaining_bytes).await?;

            let md5_digest = self.e_tag_hasher.update(&buffer);
            let md5_digest_base64 = general_purpose::STANDARD.encode(md5_digest);

            let upload_part_output = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_md5(md5_digest_base64)
                .content_length(chunksize as i64)
                .body(ByteStream::from(buffer))
                .send()
                .await
                .context("aws_sdk_s3::client::Client upload_part() failed.")?;

            trace!(key = key, part_number = part_number, "{upload_part_output:?}");

            upload_parts.push(
                CompletedPart::builder()
                    .set_e_tag(upload_part_output.e_tag().map(|e_tag| e_tag.to_string()))
                    .part_number(part_number)
                    .build(),
            );

            remaining_bytes -= chunksize;
            part_number += 1;
        }

        ensure_end_of_stream(&mut body, size).await?;

        trace!(key = key, upload_id = upload_id, "{upload_parts:?}");

        Ok(upload_parts)
    }

    async fn singlepart_upload(
        &mut self,
        bucket: &str,
        key: &str,
        object_body: ObjectBody,
        size: u64,
    ) -> Result<()> {
        let mut body = object_body.body.into_async_read();

        // An in-memory body keeps the request retryable by the SDK.
        let buffer = read_exact_size(&mut body, size).await?;

        let md5_digest = self.e_tag_hasher.update(&buffer);
        let md5_digest_base64 = general_purpose::STANDARD.encode(md5_digest);

        let put_object_output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(size as i64)
            .content_md5(md5_digest_base64)
            .body(ByteStream::from(buffer))
            .send()
            .await
            .context("aws_sdk_s3::client::Client put_object() failed.")?;

        trace!(key = key, "{put_object_output:?}");

        self.verify_uploaded_e_tag(key, false, put_object_output.e_tag());

        Ok(())
    }

    fn verify_uploaded_e_tag(&self, key: &str, multipart: bool, target_e_tag: Option<&str>) {
        let source_e_tag = self.e_tag_hasher.finalize(multipart);

        match verify_e_tag(Some(&source_e_tag), target_e_tag) {
            Some(true) => {
                trace!(
                    key = key,
                    source_e_tag = source_e_tag,
                    target_e_tag = target_e_tag,
                    "e_tag verified."
                );
            }
            Some(false) => {
                warn!(
                    key = key,
                    source_e_tag = source_e_tag,
                    target_e_tag = target_e_tag,
                    "{}",
                    E_TAG_MISMATCH_WARNING
                );
            }
            None => {
                trace!(key = key, "target returned no e_tag. skip e_tag verification.");
            }
        }
    }
}

async fn read_part<R: AsyncRead + Unpin>(
    body: &mut R,
    chunksize: u64,
    offset: u64,
) -> Result<Vec<u8>> {
    let mut buffer = vec![0_u8; chunksize as usize];
    let read = read_chunk(body, &mut buffer).await?;
    if (read as u64) < chunksize {
        return Err(anyhow!(StreamError::ShortRead {
            expected: offset + chunksize,
            actual: offset + read as u64,
        }));
    }

    Ok(buffer)
}
