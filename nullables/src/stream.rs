//! Nullable byte stream: scripted reads, recorded writes.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// An in-memory stream for exercising stream decorators.
///
/// Reads hand out the queued chunks one at a time (a read never spans two
/// chunks), then report end of stream. Writes are recorded per call so
/// tests can see how a decorator fragmented its output.
#[derive(Debug, Default)]
pub struct NullStream {
    inbox: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    max_write: Option<usize>,
    fail_writes_after: Option<usize>,
}

impl NullStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stream whose reads yield `chunks` in order.
    pub fn with_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            inbox: chunks.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Enqueue a chunk for a later read.
    pub fn enqueue(&mut self, chunk: Vec<u8>) {
        self.inbox.push_back(chunk);
    }

    /// Accept at most `max` bytes per write call.
    pub fn limit_writes_to(mut self, max: usize) -> Self {
        self.max_write = Some(max);
        self
    }

    /// Fail every write once `bytes` have been accepted.
    pub fn fail_writes_after(mut self, bytes: usize) -> Self {
        self.fail_writes_after = Some(bytes);
        self
    }

    /// Every accepted write, one entry per call.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// All accepted bytes concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.writes.concat()
    }

    fn accepted(&self) -> usize {
        self.writes.iter().map(Vec::len).sum()
    }
}

impl Read for NullStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.inbox.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            chunk.drain(..n);
            self.inbox.push_front(chunk);
        }
        Ok(n)
    }
}

impl Write for NullStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut n = buf.len();
        if let Some(limit) = self.fail_writes_after {
            let room = limit.saturating_sub(self.accepted());
            if room == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "null stream closed"));
            }
            n = n.min(room);
        }
        if let Some(max) = self.max_write {
            n = n.min(max);
        }
        self.writes.push(buf[..n].to_vec());
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_follow_chunk_boundaries() {
        let mut stream = NullStream::with_chunks(vec![vec![1, 2, 3], vec![4]]);
        let mut buf = [0u8; 2];
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(stream.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
        assert_eq!(stream.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 4);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn writes_are_recorded_per_call() {
        let mut stream = NullStream::new().limit_writes_to(3);
        assert_eq!(stream.write(b"hello").unwrap(), 3);
        assert_eq!(stream.write(b"lo").unwrap(), 2);
        assert_eq!(stream.writes(), &[b"hel".to_vec(), b"lo".to_vec()]);
        assert_eq!(stream.written(), b"hello".to_vec());
    }

    #[test]
    fn failing_writes() {
        let mut stream = NullStream::new().fail_writes_after(4);
        assert_eq!(stream.write(b"abcdef").unwrap(), 4);
        let err = stream.write(b"g").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
