//! Dedicated framing loop feeding decoded records to a listener.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tickpipe_types::{FramingError, Result, TickpipeError};
use tracing::{debug, error, info, warn};

use crate::assembler::FrameAssembler;
use crate::codec::{FrameDecoder, LENGTH_PREFIX};
use crate::decompress::{Compression, decompress_block, decompressing_reader};
use crate::pipe::BoundedBytePipe;

/// Receives every decoded record the decoder did not filter out.
///
/// Runs on the framing thread. A panic inside `on_record` is caught and
/// logged; the record is dropped and the loop carries on.
pub trait RecordListener<R>: Send {
    /// Handles one record.
    fn on_record(&mut self, record: R);
}

impl<R, F> RecordListener<R> for F
where
    F: FnMut(R) + Send,
{
    fn on_record(&mut self, record: R) {
        self(record);
    }
}

/// How the byte source delivers records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramingMode {
    /// A continuous (optionally compressed) stream of back-to-back records.
    #[default]
    Stream,
    /// One compressed block per written chunk, each holding exactly one record.
    Block,
}

impl FramingMode {
    /// Returns the mode as a string identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for FramingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a [`FramingReader`].
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Source layout.
    pub mode: FramingMode,
    /// Compression applied by the writer.
    pub compression: Compression,
    /// Largest record accepted, prefix included.
    pub max_record_len: usize,
    /// Name given to the framing thread.
    pub thread_name: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            mode: FramingMode::Stream,
            compression: Compression::None,
            max_record_len: 16 * 1024 * 1024,
            thread_name: "tickpipe-framing".to_string(),
        }
    }
}

impl ReaderConfig {
    /// Stream-mode configuration for `compression`.
    #[must_use]
    pub fn stream(compression: Compression) -> Self {
        Self {
            mode: FramingMode::Stream,
            compression,
            ..Self::default()
        }
    }

    /// Block-mode configuration for `compression`.
    #[must_use]
    pub fn block(compression: Compression) -> Self {
        Self {
            mode: FramingMode::Block,
            compression,
            ..Self::default()
        }
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TickpipeError::Config`] if `max_record_len` cannot hold a
    /// length prefix or the codec cannot run in the selected mode.
    pub fn validate(&self) -> Result<()> {
        if self.max_record_len < LENGTH_PREFIX {
            return Err(TickpipeError::Config(format!(
                "max_record_len must be at least {LENGTH_PREFIX}, got {}",
                self.max_record_len
            )));
        }
        if self.mode == FramingMode::Stream && !self.compression.supports_streaming() {
            return Err(TickpipeError::Config(format!(
                "{} compression requires block mode",
                self.compression
            )));
        }
        Ok(())
    }
}

/// Counters returned when the framing loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Records assembled.
    pub frames: u64,
    /// Records handed to the listener.
    pub dispatched: u64,
    /// Record bytes consumed, prefixes included.
    pub bytes: u64,
    /// Listener calls that panicked.
    pub listener_panics: u64,
}

/// Framing loop running on its own thread.
///
/// The loop reads records from a [`BoundedBytePipe`] until the write side
/// is closed, the loop is stopped, or a record cannot be framed or decoded.
/// Errors raised after [`stop`](Self::stop) was requested are discarded.
#[derive(Debug)]
pub struct FramingReader {
    pipe: BoundedBytePipe,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<ReaderStats>>>,
}

impl FramingReader {
    /// Starts the framing thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the thread
    /// cannot be spawned.
    pub fn spawn<D, L>(
        pipe: BoundedBytePipe,
        config: ReaderConfig,
        decoder: D,
        listener: L,
    ) -> Result<Self>
    where
        D: FrameDecoder + 'static,
        L: RecordListener<D::Record> + 'static,
    {
        config.validate()?;

        let stop = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            pipe: pipe.clone(),
            stop: Arc::clone(&stop),
            config: config.clone(),
            dispatcher: Dispatcher {
                decoder,
                listener,
                stats: ReaderStats::default(),
            },
        };
        let handle = thread::Builder::new()
            .name(config.thread_name)
            .spawn(move || worker.run())?;

        Ok(Self {
            pipe,
            stop,
            handle: Some(handle),
        })
    }

    /// Returns true while the loop thread has not exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Pipe the loop reads from.
    #[must_use]
    pub const fn pipe(&self) -> &BoundedBytePipe {
        &self.pipe
    }

    /// Requests a stop, closes the pipe's write side and waits for the loop.
    ///
    /// # Errors
    ///
    /// Returns the loop's error if it failed before the stop was requested.
    pub fn stop(mut self) -> Result<ReaderStats> {
        self.request_stop();
        self.wait()
    }

    /// Waits for the loop to end on its own, normally after the writer
    /// closed the pipe.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the loop.
    pub fn join(mut self) -> Result<ReaderStats> {
        self.wait()
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.pipe.close_write();
    }

    fn wait(&mut self) -> Result<ReaderStats> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(outcome) => outcome,
                Err(payload) => panic::resume_unwind(payload),
            },
            None => Ok(ReaderStats::default()),
        }
    }
}

impl Drop for FramingReader {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.request_stop();
            let _ = handle.join();
        }
    }
}

struct Dispatcher<D, L> {
    decoder: D,
    listener: L,
    stats: ReaderStats,
}

impl<D, L> Dispatcher<D, L>
where
    D: FrameDecoder,
    L: RecordListener<D::Record>,
{
    fn dispatch(&mut self, frame: &[u8]) -> Result<()> {
        self.stats.frames += 1;
        self.stats.bytes += frame.len() as u64;

        let Some(record) = self.decoder.decode(frame)? else {
            return Ok(());
        };
        let listener = &mut self.listener;
        match panic::catch_unwind(AssertUnwindSafe(|| listener.on_record(record))) {
            Ok(()) => self.stats.dispatched += 1,
            Err(_) => {
                self.stats.listener_panics += 1;
                warn!(frame = self.stats.frames, "record listener panicked, record dropped");
            }
        }
        Ok(())
    }
}

struct Worker<D, L> {
    pipe: BoundedBytePipe,
    stop: Arc<AtomicBool>,
    config: ReaderConfig,
    dispatcher: Dispatcher<D, L>,
}

impl<D, L> Worker<D, L>
where
    D: FrameDecoder,
    L: RecordListener<D::Record>,
{
    fn run(mut self) -> Result<ReaderStats> {
        info!(
            mode = %self.config.mode,
            compression = %self.config.compression,
            "framing loop started"
        );
        let outcome = match self.config.mode {
            FramingMode::Stream => self.run_stream(),
            FramingMode::Block => self.run_block(),
        };
        let stats = self.dispatcher.stats;

        match outcome {
            Ok(()) => {}
            Err(e) if self.stopping() => {
                debug!(error = %e, "discarding error raised during stop");
            }
            Err(e) => {
                error!(error = %e, frames = stats.frames, "framing loop failed");
                return Err(e);
            }
        }
        info!(
            frames = stats.frames,
            dispatched = stats.dispatched,
            bytes = stats.bytes,
            "framing loop ended"
        );
        Ok(stats)
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn run_stream(&mut self) -> Result<()> {
        let mut source = decompressing_reader(self.config.compression, self.pipe.reader(None))?;
        let mut assembler = FrameAssembler::new(self.config.max_record_len);
        while !self.stopping() {
            let Some(frame) = assembler.read_frame(&mut *source)? else {
                break;
            };
            self.dispatcher.dispatch(frame)?;
        }
        Ok(())
    }

    fn run_block(&mut self) -> Result<()> {
        while !self.stopping() {
            let Some(block) = self.pipe.read_chunk(None)? else {
                break;
            };
            if block.is_empty() {
                return Err(FramingError::Truncated {
                    expected: LENGTH_PREFIX,
                    actual: 0,
                }
                .into());
            }
            let data = decompress_block(self.config.compression, &block)?;
            let frame = single_record(&data, self.config.max_record_len)?;
            self.dispatcher.dispatch(frame)?;
        }
        Ok(())
    }
}

/// Validates that `data` holds exactly one record and returns it.
fn single_record(data: &[u8], max_record_len: usize) -> Result<&[u8]> {
    if data.len() < LENGTH_PREFIX {
        return Err(FramingError::Truncated {
            expected: LENGTH_PREFIX,
            actual: data.len(),
        }
        .into());
    }
    let declared = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let len = FrameAssembler::check_length(declared, max_record_len)?;
    if data.len() < len {
        return Err(FramingError::Truncated {
            expected: len,
            actual: data.len(),
        }
        .into());
    }
    if data.len() > len {
        return Err(FramingError::TrailingBytes(data.len() - len).into());
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Frame, RawFrames, encode_frame};
    use crate::decompress::compress_block;
    use std::sync::mpsc;
    use std::time::Duration;

    fn collect_raw(config: ReaderConfig) -> (FramingReader, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel();
        let reader = FramingReader::spawn(BoundedBytePipe::new(), config, RawFrames, move |f: Frame| {
            let _ = tx.send(f);
        })
        .unwrap();
        (reader, rx)
    }

    #[test]
    fn test_config_validation() {
        assert!(ReaderConfig::default().validate().is_ok());
        assert!(ReaderConfig::block(Compression::Lzma).validate().is_ok());
        assert!(matches!(
            ReaderConfig::stream(Compression::Lzma).validate(),
            Err(TickpipeError::Config(_))
        ));
        let tiny = ReaderConfig {
            max_record_len: 3,
            ..ReaderConfig::default()
        };
        assert!(tiny.validate().is_err());
    }

    #[test]
    fn test_stream_mode_dispatches_in_order() {
        let (reader, rx) = collect_raw(ReaderConfig::default());
        let pipe = reader.pipe().clone();
        for payload in [&b"one"[..], b"", b"three"] {
            pipe.write(&encode_frame(payload).unwrap()).unwrap();
        }
        pipe.close_write();

        let stats = reader.join().unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.bytes, 7 + 4 + 9);
        let payloads: Vec<Vec<u8>> = rx.iter().map(|f| f.payload().to_vec()).collect();
        assert_eq!(payloads, vec![b"one".to_vec(), Vec::new(), b"three".to_vec()]);
    }

    #[test]
    fn test_record_split_across_writes() {
        let (reader, rx) = collect_raw(ReaderConfig::default());
        let pipe = reader.pipe().clone();
        let record = encode_frame(&[5u8; 40]).unwrap();
        for piece in record.chunks(3) {
            pipe.write(piece).unwrap();
        }
        pipe.close_write();
        reader.join().unwrap();
        assert_eq!(rx.recv().unwrap().len(), 44);
    }

    #[test]
    fn test_bad_length_stops_loop() {
        let (reader, _rx) = collect_raw(ReaderConfig::default());
        reader.pipe().write(&[2, 0, 0, 0]).unwrap();
        let err = reader.join().unwrap_err();
        assert!(matches!(
            err,
            TickpipeError::Framing(FramingError::LengthTooSmall(2))
        ));
    }

    #[test]
    fn test_truncation_at_close_is_error() {
        let (reader, _rx) = collect_raw(ReaderConfig::default());
        let pipe = reader.pipe().clone();
        pipe.write(&[20, 0, 0, 0, 1, 2]).unwrap();
        pipe.close_write();
        assert!(matches!(
            reader.join(),
            Err(TickpipeError::Framing(FramingError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_stop_discards_partial_record() {
        let (reader, rx) = collect_raw(ReaderConfig::default());
        let pipe = reader.pipe().clone();
        pipe.write(&encode_frame(b"whole").unwrap()).unwrap();
        pipe.write(&[50, 0, 0, 0, 1]).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().payload(), b"whole");

        let stats = reader.stop().unwrap();
        assert_eq!(stats.dispatched, 1);
    }

    #[test]
    fn test_listener_panic_is_isolated() {
        let (tx, rx) = mpsc::channel();
        let reader = FramingReader::spawn(
            BoundedBytePipe::new(),
            ReaderConfig::default(),
            RawFrames,
            move |f: Frame| {
                assert!(!f.is_empty(), "empty record");
                let _ = tx.send(f.len());
            },
        )
        .unwrap();
        let pipe = reader.pipe().clone();
        pipe.write(&encode_frame(b"").unwrap()).unwrap();
        pipe.write(&encode_frame(b"ok").unwrap()).unwrap();
        pipe.close_write();

        let stats = reader.join().unwrap();
        assert_eq!(stats.listener_panics, 1);
        assert_eq!(stats.dispatched, 1);
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![6]);
    }

    #[test]
    fn test_block_mode_one_record_per_chunk() {
        let (reader, rx) = collect_raw(ReaderConfig::block(Compression::Lzma));
        let pipe = reader.pipe().clone();
        for payload in [&b"alpha"[..], b"beta"] {
            let block = compress_block(Compression::Lzma, &encode_frame(payload).unwrap()).unwrap();
            pipe.write(&block).unwrap();
        }
        pipe.close_write();

        assert_eq!(reader.join().unwrap().frames, 2);
        let payloads: Vec<Vec<u8>> = rx.iter().map(|f| f.payload().to_vec()).collect();
        assert_eq!(payloads, vec![b"alpha".to_vec(), b"beta".to_vec()]);
    }

    #[test]
    fn test_block_with_trailing_bytes() {
        let (reader, _rx) = collect_raw(ReaderConfig::block(Compression::None));
        let mut block = encode_frame(b"xy").unwrap();
        block.push(0);
        reader.pipe().write(&block).unwrap();
        assert!(matches!(
            reader.join(),
            Err(TickpipeError::Framing(FramingError::TrailingBytes(1)))
        ));
    }

    #[test]
    fn test_drop_stops_blocked_loop() {
        let (reader, _rx) = collect_raw(ReaderConfig::default());
        let pipe = reader.pipe().clone();
        assert!(reader.is_running());
        drop(reader);
        assert!(pipe.is_write_closed());
    }
}
