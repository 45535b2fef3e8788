//! Blocking throttled reader.

use std::io::{self, Read};
use std::sync::Arc;

use bwlimit_limiter::BandwidthLimiter;

use crate::throttle::{to_bytes, Throttle};

/// Reader that charges every byte it returns against a shared limiter.
///
/// Bytes are charged after the wrapped reader produced them, through the
/// limiter's blocking path, so a read returns only once the budget covers
/// it. End of stream is never charged.
#[derive(Debug)]
pub struct ThrottledReader<R> {
    inner: R,
    throttle: Throttle,
}

impl<R> ThrottledReader<R> {
    /// Wrap `inner` without a limiter. Until [`set_limiter`](Self::set_limiter)
    /// is called reads pass straight through. With `disabled` set they
    /// always do.
    pub fn new(inner: R, disabled: bool) -> Self {
        Self {
            inner,
            throttle: Throttle::new(disabled),
        }
    }

    /// Wrap `inner` and bind it to `limiter`, reserving the startup burst.
    /// May block while the limiter is short of budget.
    pub fn with_limiter(inner: R, disabled: bool, limiter: Arc<BandwidthLimiter>) -> Self {
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

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwrap the reader, returning any held reservation to the limiter.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ThrottledReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 && self.throttle.active().is_some() {
            self.throttle.settle();
            if let Some(limiter) = self.throttle.active() {
                limiter.charge(to_bytes(n));
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::STARTUP_RESERVATION;
    use bwlimit_nullables::{NullClock, NullStream};
    use bwlimit_types::{Clock, LimiterKind};

    fn limiter(rate: i64) -> (Arc<BandwidthLimiter>, Arc<NullClock>) {
        let clock = Arc::new(NullClock::new(0));
        let limiter = Arc::new(BandwidthLimiter::with_clock(
            rate,
            0,
            LimiterKind::Received,
            clock.clone(),
        ));
        (limiter, clock)
    }

    #[test]
    fn charges_bytes_read() {
        let (limiter, clock) = limiter(1_000);
        let mut reader = ThrottledReader::new(NullStream::with_chunks(vec![vec![7; 250]]), false);
        reader.set_limiter(limiter.clone());

        let mut buf = [0u8; 512];
        assert_eq!(reader.read(&mut buf).unwrap(), 250);
        assert_eq!(limiter.stats().total_used, 250);
        // 100 bytes per tick: the third tick lands at 200ms.
        assert_eq!(clock.now().as_millis(), 200);
    }

    #[test]
    fn end_of_stream_is_free() {
        let (limiter, clock) = limiter(1_000);
        let mut reader = ThrottledReader::new(NullStream::new(), false);
        reader.set_limiter(limiter.clone());

        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(limiter.stats().total_used, 0);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn disabled_reader_passes_through() {
        let (limiter, clock) = limiter(10);
        let data = vec![1u8; 4_000];
        let mut reader = ThrottledReader::with_limiter(
            NullStream::with_chunks(vec![data.clone()]),
            true,
            limiter.clone(),
        );
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(limiter.stats().total_used, 0);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn startup_reservation_returned_after_first_read() {
        let (limiter, _clock) = limiter(100_000);
        let mut reader = ThrottledReader::with_limiter(
            NullStream::with_chunks(vec![vec![0; 100]]),
            false,
            limiter.clone(),
        );
        assert_eq!(reader.reserved(), STARTUP_RESERVATION);
        assert_eq!(limiter.stats().total_used, STARTUP_RESERVATION);

        let mut buf = [0u8; 100];
        reader.read(&mut buf).unwrap();
        assert_eq!(reader.reserved(), 0);
        let stats = limiter.stats();
        assert_eq!(stats.total_used, 100);
        assert_eq!(stats.available, 9_900);
    }

    #[test]
    fn reservation_survives_eof() {
        let (limiter, _clock) = limiter(100_000);
        let mut reader = ThrottledReader::with_limiter(NullStream::new(), false, limiter.clone());
        let mut buf = [0u8; 8];
        reader.read(&mut buf).unwrap();
        assert_eq!(reader.reserved(), STARTUP_RESERVATION);

        let _inner = reader.into_inner();
        assert_eq!(limiter.stats().total_used, 0);
    }

    #[test]
    fn many_readers_share_one_budget() {
        let (limiter, clock) = limiter(1_000);
        let mut readers: Vec<_> = (0..3)
            .map(|_| {
                let mut reader =
                    ThrottledReader::new(NullStream::with_chunks(vec![vec![0; 100]]), false);
                reader.set_limiter(limiter.clone());
                reader
            })
            .collect();

        let mut buf = [0u8; 100];
        for reader in &mut readers {
            reader.read(&mut buf).unwrap();
        }
        assert_eq!(limiter.stats().total_used, 300);
        assert_eq!(clock.now().as_millis(), 200);
    }

    #[test]
    fn underlying_errors_propagate() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }

        let (limiter, _clock) = limiter(1_000);
        let mut reader = ThrottledReader::new(Broken, false);
        reader.set_limiter(limiter.clone());
        let err = reader.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(limiter.stats().total_used, 0);
    }
}
