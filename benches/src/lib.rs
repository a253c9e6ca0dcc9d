//! Benchmark fixtures for tickpipe.

use chrono::{TimeDelta, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tickpipe_lib::{
    BoundedBytePipe, Compression, FramingReader, Message, MessageRegistry, PipeConfig,
    ReaderConfig, ReaderStats, Result, Tick, compress_block, encode_message,
};

/// Deterministic tick number `i` of a fixture session.
pub fn fixture_tick(i: usize) -> Tick {
    let start = Utc
        .with_ymd_and_hms(2024, 1, 2, 0, 0, 0)
        .single()
        .unwrap_or_default();
    let bid = 1.1 + (i % 100) as f64 * 1e-5;
    Tick::new(
        start + TimeDelta::milliseconds(i as i64),
        bid + 2e-5,
        bid,
        1.0,
        1.0,
    )
}

/// Messages of a session carrying `ticks` ticks.
pub fn session(ticks: usize) -> Vec<Message> {
    let mut messages = Vec::with_capacity(ticks + 2);
    messages.push(Message::SubscribeAck {
        total_count: Some(ticks as u64),
    });
    messages.extend((0..ticks).map(|i| Message::Tick(fixture_tick(i))));
    messages.push(Message::EndOfData);
    messages
}

/// Encoded record stream of a session, optionally compressed as one stream.
///
/// # Errors
///
/// Returns an error if compression fails.
pub fn stream_bytes(ticks: usize, compression: Compression) -> Result<Vec<u8>> {
    let records: Vec<u8> = session(ticks).iter().flat_map(encode_message).collect();
    Ok(compress_block(compression, &records)?)
}

/// One compressed block per message of a session.
///
/// # Errors
///
/// Returns an error if compression fails.
pub fn blocks(ticks: usize, compression: Compression) -> Result<Vec<Vec<u8>>> {
    session(ticks)
        .iter()
        .map(|m| -> Result<Vec<u8>> { Ok(compress_block(compression, &encode_message(m))?) })
        .collect()
}

/// Pushes `chunks` through a pipe and framing reader, counting dispatched
/// records.
///
/// # Errors
///
/// Returns an error if the pipeline cannot be started or the loop fails.
pub fn run_pipeline(
    chunks: Vec<Vec<u8>>,
    config: ReaderConfig,
    pipe_config: &PipeConfig,
) -> Result<ReaderStats> {
    let pipe = BoundedBytePipe::with_config(pipe_config)?;
    let seen = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&seen);
    let reader = FramingReader::spawn(
        pipe.clone(),
        config,
        MessageRegistry::default(),
        move |_: Message| {
            counter.fetch_add(1, Ordering::Relaxed);
        },
    )?;

    let feeder = thread::spawn(move || -> Result<()> {
        for chunk in &chunks {
            pipe.write(chunk)?;
        }
        pipe.close_write();
        Ok(())
    });
    let stats = reader.join()?;
    if let Ok(outcome) = feeder.join() {
        outcome?;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_pipeline_counts_every_record() {
        let bytes = stream_bytes(1_000, Compression::None).unwrap();
        let chunks: Vec<Vec<u8>> = bytes.chunks(512).map(<[u8]>::to_vec).collect();
        let stats =
            run_pipeline(chunks, ReaderConfig::default(), &PipeConfig::default()).unwrap();
        assert_eq!(stats.frames, 1_002);
        assert_eq!(stats.dispatched, 1_002);
    }

    #[test]
    fn test_block_fixture() {
        let blocks = blocks(10, Compression::Deflate).unwrap();
        assert_eq!(blocks.len(), 12);
        let stats = run_pipeline(
            blocks,
            ReaderConfig::block(Compression::Deflate),
            &PipeConfig::default(),
        )
        .unwrap();
        assert_eq!(stats.frames, 12);
    }
}
