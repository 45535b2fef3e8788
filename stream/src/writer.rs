//! Blocking throttled writer.

use std::io::{self, Write};
use std::sync::Arc;

use bwlimit_limiter::BandwidthLimiter;

use crate::throttle::{chunk_limit, to_bytes, to_len, Throttle};

/// Writer that reserves budget before forwarding bytes to the wrapped writer.
///
/// A large buffer is cut into chunks no bigger than one second of the
/// limiter's short-term rate; each chunk is sized by what the limiter
/// actually grants. Budget the wrapped writer did not consume is released.
#[derive(Debug)]
pub struct ThrottledWriter<W> {
    inner: W,
    throttle: Throttle,
}

impl<W> ThrottledWriter<W> {
    /// Wrap `inner` without a limiter. Until [`set_limiter`](Self::set_limiter)
    /// is called writes pass straight through. With `disabled` set they
    /// always do.
    pub fn new(inner: W, disabled: bool) -> Self {
        Self {
            inner,
            throttle: Throttle::new(disabled),
        }
    }

    /// Wrap `inner` and bind it to `limiter`, reserving the startup burst.
    /// May block while the limiter is short of budget.
    pub fn with_limiter(inner: W, disabled: bool, limiter: Arc<BandwidthLimiter>) -> Self {
        Self {
            inner,
            throttle: Throttle::with_limiter(disabled, limiter),
        }
    }

    pub fn set_limiter(&mut self, limiter: Arc<BandwidthLimiter>) {
        self.throttle.set_limiter(limiter);
    }

    pub fn limiter(&self) -> Option<&Arc<BandwidthLimiter>> {
        self.throttle.limiter()
    }

    pub fn is_disabled(&self) -> bool {
        self.throttle.is_disabled()
    }

    /// Bytes still held from the startup reservation.
    pub fn reserved(&self) -> i64 {
        self.throttle.reserved()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwrap the writer, returning any held reservation to the limiter.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ThrottledWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(limiter) = self.throttle.active().cloned() else {
            return self.inner.write(buf);
        };
        if buf.is_empty() {
            return self.inner.write(buf);
        }

        let limit = chunk_limit(&limiter);
        let mut written = 0;
        while written < buf.len() {
            let wanted = (buf.len() - written).min(limit);
            let mut granted = to_len(limiter.reserve(to_bytes(wanted)));
            if granted == 0 {
                // The wait was abandoned with nothing to show for it.
                if written > 0 {
                    break;
                }
                limiter.force_charge(1);
                granted = 1;
            }

            match self.inner.write(&buf[written..written + granted]) {
                Ok(n) => {
                    limiter.release(to_bytes(granted - n));
                    if n == 0 {
                        break;
                    }
                    written += n;
                    self.throttle.settle();
                }
                Err(e) => {
                    limiter.release(to_bytes(granted));
                    if written > 0 {
                        tracing::debug!(written, error = %e, "write failed after partial progress");
                        break;
                    }
                    return Err(e);
                }
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
