//! Throttled tokio streams.
//!
//! These adapters never block a runtime worker: they ask the limiter for
//! budget through [`BandwidthLimiter::charge_non_blocking`], transfer what
//! was granted, and when nothing was granted park on a timer until the
//! token's wait hint.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bwlimit_limiter::{BandwidthLimiter, BandwidthToken, MAX_TOTAL_WAIT_MILLIS, TICK_MILLIS};
use bwlimit_types::{Clock, Timestamp};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

use crate::throttle::{chunk_limit, to_bytes, to_len, Throttle};

/// Shortest timer armed while waiting, so a hint that is already due does
/// not spin.
const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Budget acquisition shared by the async reader and writer.
#[derive(Debug, Default)]
struct Backoff {
    sleep: Option<Pin<Box<Sleep>>>,
    waiting_since: Option<Timestamp>,
}

impl Backoff {
    /// Request up to `wanted` bytes. Resolves to the number granted, which is
    /// always at least one: after [`MAX_TOTAL_WAIT_MILLIS`] without a grant a
    /// single byte is forced through.
    fn poll_acquire(
        &mut self,
        cx: &mut Context<'_>,
        limiter: &BandwidthLimiter,
        wanted: usize,
    ) -> Poll<usize> {
        loop {
            if let Some(sleep) = self.sleep.as_mut() {
                ready!(sleep.as_mut().poll(cx));
                self.sleep = None;
            }

            let token = limiter.charge_non_blocking(to_bytes(wanted));
            let granted = to_len(token.granted_now());
            if granted > 0 {
                self.waiting_since = None;
                return Poll::Ready(granted);
            }

            let now = limiter.clock().now();
            let since = *self.waiting_since.get_or_insert(now);
            if now.millis_since(since) >= MAX_TOTAL_WAIT_MILLIS {
                self.waiting_since = None;
                limiter.force_charge(1);
                return Poll::Ready(1);
            }
            self.sleep = Some(Box::pin(tokio::time::sleep(Self::delay(limiter, &token))));
        }
    }

    fn delay(limiter: &BandwidthLimiter, token: &BandwidthToken) -> Duration {
        let now = limiter.clock().now();
        token
            .sleep_until()
            .map(|until| until.duration_from(now))
            .unwrap_or(Duration::from_millis(TICK_MILLIS))
            .max(MIN_BACKOFF)
    }
}

/// Async reader that acquires budget before each read and returns whatever
/// the wrapped reader did not use.
#[derive(Debug)]
pub struct AsyncThrottledReader<R> {
    inner: R,
    throttle: Throttle,
    backoff: Backoff,
}

impl<R> AsyncThrottledReader<R> {
    pub fn new(inner: R, disabled: bool) -> Self {
        Self {
            inner,
            throttle: Throttle::new(disabled),
            backoff: Backoff::default(),
        }
    }

    /// Wrap `inner` and bind it to `limiter`. The startup reservation takes
    /// only what the limiter can grant immediately.
    pub fn with_limiter(inner: R, disabled: bool, limiter: Arc<BandwidthLimiter>) -> Self {
        Self {
            inner,
            throttle: Throttle::with_limiter_non_blocking(disabled, limiter),
            backoff: Backoff::default(),
        }
    }

    pub fn set_limiter(&mut self, limiter: Arc<BandwidthLimiter>) {
        self.throttle.set_limiter(limiter);
    }

    pub fn reserved(&self) -> i64 {
        self.throttle.reserved()
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for AsyncThrottledReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some(limiter) = this.throttle.active().cloned() else {
            return Pin::new(&mut this.inner).poll_read(cx, buf);
        };
        if buf.remaining() == 0 {
            return Pin::new(&mut this.inner).poll_read(cx, buf);
        }

        let wanted = buf.remaining().min(chunk_limit(&limiter));
        let granted = ready!(this.backoff.poll_acquire(cx, &limiter, wanted));

        let (result, n) = {
            let mut limited = ReadBuf::new(buf.initialize_unfilled_to(granted));
            let result = Pin::new(&mut this.inner).poll_read(cx, &mut limited);
            (result, limited.filled().len())
        };
        match result {
            Poll::Ready(Ok(())) => {
                buf.advance(n);
                limiter.release(to_bytes(granted - n));
                if n > 0 {
                    this.throttle.settle();
                }
                Poll::Ready(Ok(()))
            }
            other => {
                limiter.release(to_bytes(granted));
                other
            }
        }
    }
}

/// Async writer that acquires budget before each write and returns whatever
/// the wrapped writer did not accept.
#[derive(Debug)]
pub struct AsyncThrottledWriter<W> {
    inner: W,
    throttle: Throttle,
    backoff: Backoff,
}

impl<W> AsyncThrottledWriter<W> {
    pub fn new(inner: W, disabled: bool) -> Self {
        Self {
            inner,
            throttle: Throttle::new(disabled),
            backoff: Backoff::default(),
        }
    }

    /// Wrap `inner` and bind it to `limiter`. The startup reservation takes
    /// only what the limiter can grant immediately.
    pub fn with_limiter(inner: W, disabled: bool, limiter: Arc<BandwidthLimiter>) -> Self {
        Self {
            inner,
            throttle: Throttle::with_limiter_non_blocking(disabled, limiter),
            backoff: Backoff::default(),
        }
    }

    pub fn set_limiter(&mut self, limiter: Arc<BandwidthLimiter>) {
        self.throttle.set_limiter(limiter);
    }

    pub fn reserved(&self) -> i64 {
        self.throttle.reserved()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for AsyncThrottledWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let Some(limiter) = this.throttle.active().cloned() else {
            return Pin::new(&mut this.inner).poll_write(cx, buf);
        };
        if buf.is_empty() {
            return Pin::new(&mut this.inner).poll_write(cx, buf);
        }

        let wanted = buf.len().min(chunk_limit(&limiter));
        let granted = ready!(this.backoff.poll_acquire(cx, &limiter, wanted));

        match Pin::new(&mut this.inner).poll_write(cx, &buf[..granted]) {
            Poll::Ready(Ok(n)) => {
                limiter.release(to_bytes(granted - n));
                if n > 0 {
                    this.throttle.settle();
                }
                Poll::Ready(Ok(n))
            }
            other => {
                limiter.release(to_bytes(granted));
                other
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
