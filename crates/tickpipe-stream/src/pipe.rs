//! Blocking byte pipe with adaptive backpressure.
//!
//! One thread writes byte chunks (usually straight off the network), another
//! reads them back in order. The pipe bounds how many unread bytes it holds;
//! the bound follows the largest chunk written so far, so a producer using
//! large chunks is never permanently rejected.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tickpipe_types::{Result, TickpipeError, WaitOutcome, wait_while};
use tracing::{debug, trace};

/// Configuration for a [`BoundedBytePipe`].
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Unread bytes allowed before any write has been seen.
    pub initial_max_bytes: usize,
    /// The cap is raised to `multiplier` times the largest write seen.
    pub multiplier: usize,
    /// Timeout used by [`BoundedBytePipe::write`].
    pub write_timeout: Duration,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            initial_max_bytes: 64 * 1024,
            multiplier: 4,
            write_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct PipeState {
    chunks: VecDeque<Bytes>,
    /// Bytes already consumed from the head chunk.
    head_offset: usize,
    /// Unread bytes across all chunks.
    available: usize,
    max_allowed: usize,
    largest_write: usize,
    /// Bytes a blocked `read` is waiting for; writers may exceed the cap up to this.
    read_demand: usize,
    write_closed: bool,
}

impl PipeState {
    /// A starving reader admits any write, whatever the cap.
    const fn has_room(&self, len: usize) -> bool {
        self.available + len <= self.max_allowed || self.available < self.read_demand
    }

    fn copy_out(&mut self, buf: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < buf.len() {
            let Some(head) = self.chunks.front() else {
                break;
            };
            let remaining = &head[self.head_offset..];
            let n = remaining.len().min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&remaining[..n]);
            copied += n;
            self.head_offset += n;

            let exhausted = self.head_offset == head.len();
            if exhausted {
                self.chunks.pop_front();
                self.head_offset = 0;
            }
        }
        self.available -= copied;
        copied
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<PipeState>,
    readable: Condvar,
    writable: Condvar,
    multiplier: usize,
    write_timeout: Duration,
}

/// Single-writer, single-reader blocking byte pipe.
///
/// Cloning yields another handle to the same pipe, so the writer, the reader
/// and whoever needs to cancel can each hold one.
#[derive(Debug, Clone)]
pub struct BoundedBytePipe {
    shared: Arc<Shared>,
}

impl BoundedBytePipe {
    /// Creates a pipe with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(&PipeConfig::default())
    }

    /// Creates a pipe with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TickpipeError::Config`] if `multiplier` or
    /// `initial_max_bytes` is zero.
    pub fn with_config(config: &PipeConfig) -> Result<Self> {
        if config.multiplier == 0 {
            return Err(TickpipeError::Config(
                "pipe multiplier must be at least 1".to_string(),
            ));
        }
        if config.initial_max_bytes == 0 {
            return Err(TickpipeError::Config(
                "pipe initial_max_bytes must be at least 1".to_string(),
            ));
        }
        Ok(Self::build(config))
    }

    fn build(config: &PipeConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PipeState {
                    chunks: VecDeque::new(),
                    head_offset: 0,
                    available: 0,
                    max_allowed: config.initial_max_bytes,
                    largest_write: 0,
                    read_demand: 0,
                    write_closed: false,
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
                multiplier: config.multiplier,
                write_timeout: config.write_timeout,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes a copy of `bytes`, waiting at most the configured write timeout
    /// for the reader to make room.
    ///
    /// # Errors
    ///
    /// See [`write_timeout`](Self::write_timeout).
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        self.write_chunk(
            Bytes::copy_from_slice(bytes),
            Some(self.shared.write_timeout),
        )
    }

    /// Writes a copy of `bytes`, waiting at most `timeout` for room
    /// (`None` waits until the reader drains or the pipe closes).
    ///
    /// # Errors
    ///
    /// Returns [`TickpipeError::Closed`] if the write side is closed, before
    /// or during the wait, and [`TickpipeError::Timeout`] if the reader did
    /// not drain enough in time. A timed-out write leaves the pipe unchanged.
    pub fn write_timeout(&self, bytes: &[u8], timeout: Option<Duration>) -> Result<()> {
        self.write_chunk(Bytes::copy_from_slice(bytes), timeout)
    }

    /// Appends an already-owned chunk; see [`write_timeout`](Self::write_timeout).
    ///
    /// # Errors
    ///
    /// Same as [`write_timeout`](Self::write_timeout).
    pub fn write_chunk(&self, chunk: Bytes, timeout: Option<Duration>) -> Result<()> {
        let len = chunk.len();
        let mut state = self.lock();
        if state.write_closed {
            return Err(TickpipeError::Closed("pipe"));
        }
        if len == 0 {
            return Ok(());
        }

        state.largest_write = state.largest_write.max(len);
        if state.available + len > state.max_allowed {
            let recalculated = self.shared.multiplier.saturating_mul(state.largest_write);
            if recalculated > state.max_allowed {
                trace!(
                    from = state.max_allowed,
                    to = recalculated,
                    "pipe cap raised"
                );
                state.max_allowed = recalculated;
            }
        }

        let (mut state, outcome) = wait_while(&self.shared.writable, state, timeout, |s| {
            !s.write_closed && !s.has_room(len)
        });
        if state.write_closed {
            return Err(TickpipeError::Closed("pipe"));
        }
        if outcome == WaitOutcome::TimedOut {
            return Err(TickpipeError::Timeout(timeout.unwrap_or_default()));
        }

        state.chunks.push_back(chunk);
        state.available += len;
        drop(state);
        self.shared.readable.notify_all();
        Ok(())
    }

    /// Fills `buf` completely, or with whatever is left once the write side
    /// has closed.
    ///
    /// Nothing is consumed until the whole request can be served, so a
    /// timed-out read never drops bytes. Returns the number of bytes copied;
    /// a short count (possibly zero) means end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`TickpipeError::Timeout`] if `buf.len()` bytes did not
    /// become available in time and the pipe is still open.
    pub fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        let want = buf.len();
        if want == 0 {
            return Ok(0);
        }

        let mut state = self.lock();
        if state.available < want && !state.write_closed {
            state.read_demand = want;
            self.shared.writable.notify_all();
        }
        let (mut state, outcome) = wait_while(&self.shared.readable, state, timeout, |s| {
            s.available < want && !s.write_closed
        });
        state.read_demand = 0;

        if outcome == WaitOutcome::TimedOut {
            return Err(TickpipeError::Timeout(timeout.unwrap_or_default()));
        }
        Ok(self.take(state, buf))
    }

    /// Copies whatever is available into `buf`, waiting only until at least
    /// one byte is buffered. Returns zero at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`TickpipeError::Timeout`] if the pipe stayed empty and open.
    pub fn read_some(&self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let (state, outcome) = wait_while(&self.shared.readable, self.lock(), timeout, |s| {
            s.available == 0 && !s.write_closed
        });
        if outcome == WaitOutcome::TimedOut {
            return Err(TickpipeError::Timeout(timeout.unwrap_or_default()));
        }
        Ok(self.take(state, buf))
    }

    /// Removes the next chunk as it was written (minus any bytes already
    /// read from it). Returns `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`TickpipeError::Timeout`] if no chunk arrived in time.
    pub fn read_chunk(&self, timeout: Option<Duration>) -> Result<Option<Bytes>> {
        let (mut state, outcome) = wait_while(&self.shared.readable, self.lock(), timeout, |s| {
            s.chunks.is_empty() && !s.write_closed
        });
        if outcome == WaitOutcome::TimedOut {
            return Err(TickpipeError::Timeout(timeout.unwrap_or_default()));
        }

        let Some(chunk) = state.chunks.pop_front() else {
            return Ok(None);
        };
        let chunk = chunk.slice(state.head_offset..);
        state.head_offset = 0;
        state.available -= chunk.len();
        drop(state);
        self.shared.writable.notify_all();
        Ok(Some(chunk))
    }

    fn take(&self, mut state: MutexGuard<'_, PipeState>, buf: &mut [u8]) -> usize {
        let copied = state.copy_out(buf);
        let below_cap = state.available < state.max_allowed;
        drop(state);
        if copied > 0 && below_cap {
            self.shared.writable.notify_all();
        }
        copied
    }

    /// Closes the write side and wakes every waiter. Idempotent.
    ///
    /// Pending and later reads drain what is buffered and then report end
    /// of stream; pending and later writes fail with
    /// [`TickpipeError::Closed`].
    pub fn close_write(&self) {
        {
            let mut state = self.lock();
            if state.write_closed {
                return;
            }
            state.write_closed = true;
            debug!(unread = state.available, "pipe write side closed");
        }
        self.shared.readable.notify_all();
        self.shared.writable.notify_all();
    }

    /// Returns true once [`close_write`](Self::close_write) has been called.
    #[must_use]
    pub fn is_write_closed(&self) -> bool {
        self.lock().write_closed
    }

    /// Unread bytes currently buffered.
    #[must_use]
    pub fn available(&self) -> usize {
        self.lock().available
    }

    /// Current backpressure cap in bytes.
    #[must_use]
    pub fn max_allowed(&self) -> usize {
        self.lock().max_allowed
    }

    /// Byte count a blocked [`read`](Self::read) is waiting for, or zero.
    #[must_use]
    pub fn pending_demand(&self) -> usize {
        self.lock().read_demand
    }

    /// Returns an [`io::Read`] view that waits up to `timeout` per call.
    #[must_use]
    pub fn reader(&self, timeout: Option<Duration>) -> PipeReader {
        PipeReader {
            pipe: self.clone(),
            timeout,
        }
    }

    /// Returns an [`io::Write`] view using the configured write timeout.
    #[must_use]
    pub fn writer(&self) -> PipeWriter {
        PipeWriter { pipe: self.clone() }
    }
}

impl Default for BoundedBytePipe {
    fn default() -> Self {
        Self::new()
    }
}

/// [`io::Read`] adapter over a [`BoundedBytePipe`].
///
/// Each `read` returns as soon as any bytes are buffered, which is what
/// streaming decoders expect.
#[derive(Debug, Clone)]
pub struct PipeReader {
    pipe: BoundedBytePipe,
    timeout: Option<Duration>,
}

impl io::Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.pipe
            .read_some(buf, self.timeout)
            .map_err(into_io_error)
    }
}

/// [`io::Write`] adapter over a [`BoundedBytePipe`].
#[derive(Debug, Clone)]
pub struct PipeWriter {
    pipe: BoundedBytePipe,
}

impl io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pipe.write(buf).map_err(into_io_error)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn into_io_error(error: TickpipeError) -> io::Error {
    match error {
        TickpipeError::Io(e) => e,
        TickpipeError::Timeout(_) => io::Error::new(io::ErrorKind::TimedOut, error),
        TickpipeError::Closed(_) => io::Error::new(io::ErrorKind::BrokenPipe, error),
        other => io::Error::other(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::thread;
    use std::time::Instant;

    const SHORT: Option<Duration> = Some(Duration::from_millis(30));
    const LONG: Option<Duration> = Some(Duration::from_secs(5));

    fn small_pipe(initial_max_bytes: usize, multiplier: usize) -> BoundedBytePipe {
        BoundedBytePipe::with_config(&PipeConfig {
            initial_max_bytes,
            multiplier,
            write_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_round_trip_with_mismatched_chunking() {
        let pipe = BoundedBytePipe::new();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        for chunk in data.chunks(7) {
            pipe.write(chunk).unwrap();
        }
        pipe.close_write();

        let mut out = Vec::new();
        let mut buf = [0u8; 13];
        loop {
            let n = pipe.read(&mut buf, SHORT).unwrap();
            out.extend_from_slice(&buf[..n]);
            if n < buf.len() {
                break;
            }
        }
        assert_eq!(out, data);
        assert_eq!(pipe.available(), 0);
    }

    #[test]
    fn test_read_waits_for_full_count() {
        let pipe = BoundedBytePipe::new();
        let writer = pipe.clone();
        let handle = thread::spawn(move || {
            for b in [1u8, 2, 3, 4] {
                thread::sleep(Duration::from_millis(5));
                writer.write(&[b]).unwrap();
            }
        });

        let mut buf = [0u8; 4];
        assert_eq!(pipe.read(&mut buf, LONG).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        handle.join().unwrap();
    }

    #[test]
    fn test_read_timeout_keeps_bytes() {
        let pipe = BoundedBytePipe::new();
        pipe.write(&[9, 8]).unwrap();

        let mut buf = [0u8; 4];
        assert!(pipe.read(&mut buf, SHORT).unwrap_err().is_timeout());
        assert_eq!(pipe.available(), 2);

        pipe.write(&[7, 6]).unwrap();
        assert_eq!(pipe.read(&mut buf, SHORT).unwrap(), 4);
        assert_eq!(buf, [9, 8, 7, 6]);
    }

    #[test]
    fn test_short_read_after_close() {
        let pipe = BoundedBytePipe::new();
        pipe.write(&[1, 2, 3]).unwrap();
        pipe.close_write();

        let mut buf = [0u8; 8];
        assert_eq!(pipe.read(&mut buf, SHORT).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(pipe.read(&mut buf, SHORT).unwrap(), 0);
        assert_eq!(pipe.read_some(&mut buf, SHORT).unwrap(), 0);
        assert_eq!(pipe.read_chunk(SHORT).unwrap(), None);
    }

    #[test]
    fn test_close_unblocks_reader() {
        let pipe = BoundedBytePipe::new();
        let reader = pipe.clone();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 16];
            reader.read(&mut buf, None)
        });

        thread::sleep(Duration::from_millis(20));
        pipe.close_write();
        pipe.close_write();
        assert_eq!(handle.join().unwrap().unwrap(), 0);
    }

    #[test]
    fn test_write_after_close_fails() {
        let pipe = BoundedBytePipe::new();
        pipe.close_write();
        assert!(matches!(
            pipe.write(&[1]),
            Err(TickpipeError::Closed("pipe"))
        ));
        assert!(pipe.is_write_closed());
    }

    #[test]
    fn test_write_blocks_until_reader_drains() {
        let pipe = small_pipe(8, 1);
        pipe.write(&[0; 8]).unwrap();
        assert_eq!(pipe.max_allowed(), 8);

        let start = Instant::now();
        let reader = pipe.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            let mut buf = [0u8; 8];
            reader.read(&mut buf, LONG).unwrap()
        });

        pipe.write_timeout(&[1; 8], LONG).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(handle.join().unwrap(), 8);
        assert_eq!(pipe.available(), 8);
    }

    #[test]
    fn test_write_times_out_without_drain() {
        let pipe = small_pipe(4, 1);
        pipe.write(&[0; 4]).unwrap();
        let err = pipe.write_timeout(&[1; 4], SHORT).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(pipe.available(), 4);
    }

    #[test]
    fn test_close_unblocks_writer() {
        let pipe = small_pipe(4, 1);
        pipe.write(&[0; 4]).unwrap();
        let writer = pipe.clone();
        let handle = thread::spawn(move || writer.write_timeout(&[1; 4], None));

        thread::sleep(Duration::from_millis(20));
        pipe.close_write();
        assert!(matches!(
            handle.join().unwrap(),
            Err(TickpipeError::Closed(_))
        ));
    }

    #[test]
    fn test_large_write_raises_cap() {
        let pipe = small_pipe(16, 4);
        pipe.write_timeout(&[7; 100], SHORT).unwrap();
        assert_eq!(pipe.max_allowed(), 400);
        assert_eq!(pipe.available(), 100);
    }

    #[test]
    fn test_reader_demand_lifts_cap() {
        let pipe = small_pipe(4, 1);
        let writer = pipe.clone();
        let handle = thread::spawn(move || {
            for _ in 0..10 {
                writer.write_timeout(&[5; 4], LONG).unwrap();
            }
        });

        let mut buf = [0u8; 40];
        assert_eq!(pipe.read(&mut buf, LONG).unwrap(), 40);
        assert!(buf.iter().all(|&b| b == 5));
        handle.join().unwrap();
    }

    #[test]
    fn test_starving_reader_admits_write_past_cap() {
        let pipe = small_pipe(4, 1);
        pipe.write_timeout(&[1, 2, 3], SHORT).unwrap();

        let reader = pipe.clone();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 6];
            let n = reader.read(&mut buf, LONG).unwrap();
            (n, buf)
        });

        while pipe.pending_demand() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        pipe.write_timeout(&[4, 5, 6, 7], LONG).unwrap();

        let (n, buf) = handle.join().unwrap();
        assert_eq!(n, 6);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);
        assert_eq!(pipe.available(), 1);
    }

    #[test]
    fn test_read_chunk_preserves_boundaries() {
        let pipe = BoundedBytePipe::new();
        pipe.write(b"abc").unwrap();
        pipe.write(b"defg").unwrap();

        let mut one = [0u8; 1];
        assert_eq!(pipe.read(&mut one, SHORT).unwrap(), 1);
        assert_eq!(pipe.read_chunk(SHORT).unwrap().unwrap().as_ref(), b"bc");
        assert_eq!(pipe.read_chunk(SHORT).unwrap().unwrap().as_ref(), b"defg");
        assert!(pipe.read_chunk(SHORT).unwrap_err().is_timeout());
    }

    #[test]
    fn test_io_adapters() {
        let pipe = BoundedBytePipe::new();
        let mut writer = pipe.writer();
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        pipe.close_write();

        let mut text = String::new();
        pipe.reader(SHORT).read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello world");

        let err = writer.write(b"!").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_concurrent_round_trip() {
        let pipe = small_pipe(64, 2);
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let expected = data.clone();

        let writer = pipe.clone();
        let handle = thread::spawn(move || {
            for chunk in data.chunks(97) {
                writer.write_timeout(chunk, LONG).unwrap();
            }
            writer.close_write();
        });

        let mut out = Vec::with_capacity(expected.len());
        let mut buf = [0u8; 61];
        loop {
            let n = pipe.read(&mut buf, LONG).unwrap();
            out.extend_from_slice(&buf[..n]);
            if n < buf.len() {
                break;
            }
        }
        handle.join().unwrap();
        assert_eq!(out, expected);
    }
}
