use std::io::Result;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_channel::Sender;
use leaky_bucket::RateLimiter;
use pin_project::pin_project;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::runtime::Handle;
use tokio::task;

use crate::types::MigrationStatistics;

/// Reports every chunk read from `inner` to the stats channel and throttles
/// reads against the bandwidth limiter.
#[pin_project]
pub struct AsyncReadWithCallback<R: AsyncRead> {
    #[pin]
    inner: R,
    stats_sender: Sender<MigrationStatistics>,
    bandwidth_limiter: Option<Arc<RateLimiter>>,
}

impl<R: AsyncRead> AsyncReadWithCallback<R> {
    pub fn new(
        inner: R,
        stats_sender: Sender<MigrationStatistics>,
        bandwidth_limiter: Option<Arc<RateLimiter>>,
    ) -> Self {
        Self {
            inner,
            stats_sender,
            bandwidth_limiter,
        }
    }
}

impl<R: AsyncRead> AsyncRead for AsyncReadWithCallback<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<()>> {
        let this = self.project();

        let before = buf.filled().len();

        let result = this.inner.poll_read(cx, buf);
        if !result.is_ready() {
            return result;
        }

        let after = buf.filled().len();

        let transfer_bytes = after - before;

        if let Some(bandwidth_limiter) = this.bandwidth_limiter.clone() {
            if 0 < transfer_bytes {
                task::block_in_place(move || {
                    Handle::current().block_on(async move {
                        bandwidth_limiter.acquire(transfer_bytes).await;
                    });
                });
            }
        }

        if 0 < transfer_bytes {
            let _ = this
                .stats_sender
                .send_blocking(MigrationStatistics::TransferBytes(transfer_bytes as u64));
        }

        result
    }
}
