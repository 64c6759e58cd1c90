use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::body::SdkBody;
use dyn_clone::DynClone;
use futures_util::stream::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use leaky_bucket::RateLimiter;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio_util::io::ReaderStream;

use crate::types::async_callback::AsyncReadWithCallback;
use crate::types::error::StreamError;
use crate::types::{MigrationStatistics, ObjectDescriptor};

pub mod e_tag_verify;
pub mod memory;
pub mod s3;

pub type Storage = Box<dyn StorageTrait + Send + Sync>;

pub struct StoragePair {
    pub source: Storage,
    pub target: Storage,
}

/// A body returned by `get_object`, streamed straight into the destination `put_object`.
pub struct ObjectBody {
    pub body: ByteStream,
    pub content_length: u64,
}

impl ObjectBody {
    pub fn new(body: ByteStream, content_length: u64) -> Self {
        Self {
            body,
            content_length,
        }
    }

    pub fn with_callback(
        self,
        stats_sender: Sender<MigrationStatistics>,
        rate_limit_bandwidth: Option<Arc<RateLimiter>>,
    ) -> Self {
        Self {
            body: convert_to_buf_byte_stream_with_callback(
                self.body.into_async_read(),
                stats_sender,
                rate_limit_bandwidth,
            ),
            content_length: self.content_length,
        }
    }
}

#[derive(Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectDescriptor>,
    pub next_continuation_token: Option<String>,
}

#[async_trait]
pub trait StorageTrait: DynClone {
    fn bucket(&self) -> &str;

    /// Fails with `MigrationError::BucketNotFound` or `MigrationError::BucketUnreachable`.
    async fn head_bucket(&self) -> Result<()>;
    async fn list_objects_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ListPage>;

    /// `Ok(None)` when the key does not exist.
    async fn head_object(&self, key: &str) -> Result<Option<ObjectDescriptor>>;
    async fn get_object(&self, key: &str) -> Result<ObjectBody>;

    /// Consumes `body` and stores exactly `size` bytes under `key`. A body of any other
    /// length fails with `StreamError`.
    async fn put_object(&self, key: &str, body: ObjectBody, size: u64) -> Result<()>;
}

#[rustfmt::skip] // For coverage tool incorrectness
pub fn convert_to_buf_byte_stream_with_callback<R>(
    byte_stream: R,
    stats_sender: Sender<MigrationStatistics>,
    rate_limit_bandwidth: Option<Arc<RateLimiter>>,
) -> ByteStream
where
    R: AsyncRead + Send + 'static + Sync,
{
    let async_read = AsyncReadWithCallback::new(byte_stream, stats_sender, rate_limit_bandwidth);

    let buf_reader = BufReader::new(async_read);

    let reader_stream = ReaderStream::new(buf_reader).map_ok(Frame::data);

    let stream_body = StreamBody::new(reader_stream);

    let boxed_body = BodyExt::boxed(stream_body);

    let sdk_body = SdkBody::from_body_1_x(boxed_body);

    ByteStream::new(sdk_body)
}

/// Fills `buffer` completely. Returns the number of bytes read, which is smaller than the
/// buffer only when the stream ended first.
pub async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut R,
    buffer: &mut [u8],
) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader
            .read(&mut buffer[filled..])
            .await
            .context("tokio::io::AsyncReadExt::read() failed.")?;
        if read == 0 {
            break;
        }
        filled += read;
    }

    Ok(filled)
}

/// Reads exactly `size` bytes and verifies that the stream ends there.
pub async fn read_exact_size<R: AsyncRead + Unpin>(
    reader: &mut R,
    size: u64,
) -> Result<Vec<u8>> {
    let mut buffer = vec![0_u8; size as usize];
    let read = read_chunk(reader, &mut buffer).await?;
    if (read as u64) < size {
        return Err(anyhow!(StreamError::ShortRead {
            expected: size,
            actual: read as u64,
        }));
    }

    ensure_end_of_stream(reader, size).await?;

    Ok(buffer)
}

pub async fn ensure_end_of_stream<R: AsyncRead + Unpin>(
    reader: &mut R,
    expected: u64,
) -> Result<()> {
    let mut extra = [0_u8; 1];
    let read = reader
        .read(&mut extra)
        .await
        .context("tokio::io::AsyncReadExt::read() failed.")?;
    if read != 0 {
        return Err(anyhow!(StreamError::LongRead { expected }));
    }

    Ok(())
}
