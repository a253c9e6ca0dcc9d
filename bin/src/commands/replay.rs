//! Replay command implementation.
//!
//! Pushes a capture through the same path a live session uses: a feeder
//! thread writes raw chunks into a bounded pipe, the framing reader decodes
//! them and drives an operation, and this thread pulls ticks off the
//! operation's queue.

use crate::capture::{CaptureHeader, feed_pipe};
use crate::display::{Format, TickPrinter, print_stats};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tickpipe_lib::prelude::*;
use tracing::{debug, info, warn};

/// Replay options.
#[derive(Debug, Clone)]
pub(crate) struct ReplayOptions {
    pub(crate) chunk_size: usize,
    pub(crate) pipe_bytes: usize,
    pub(crate) timeout: Option<Duration>,
    pub(crate) limit: Option<usize>,
    pub(crate) format: Format,
    pub(crate) stats: bool,
}

/// What a replay pulled off the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReplaySummary {
    pub(crate) announced: Option<u64>,
    pub(crate) pulled: usize,
    pub(crate) cancelled: bool,
}

/// Replay `input` and print every tick to `out`.
pub(crate) fn replay<W: Write>(
    input: &Path,
    options: &ReplayOptions,
    out: W,
) -> Result<ReplaySummary> {
    let file =
        File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let mut reader = BufReader::new(file);
    let header = CaptureHeader::read_from(&mut reader)?;
    debug!(mode = %header.mode, compression = %header.compression, "capture header");

    let pipe = BoundedBytePipe::with_config(&PipeConfig {
        initial_max_bytes: options.pipe_bytes,
        ..PipeConfig::default()
    })?;
    let operation = AsyncOperation::with_unsubscribe(
        &QueueConfig::default(),
        Box::new(|| {
            info!("replay cancelled, unsubscribing");
            Ok(())
        }),
    )?;
    let queue = operation.queue();

    let framing = FramingReader::spawn(
        pipe.clone(),
        ReaderConfig {
            mode: header.mode,
            compression: header.compression,
            ..ReaderConfig::default()
        },
        MessageRegistry::default(),
        tick_bridge(operation),
    )?;

    let feeder_pipe = pipe.clone();
    let chunk_size = options.chunk_size;
    let feeder = thread::Builder::new()
        .name("tickpipe-feed".to_string())
        .spawn(move || feed_pipe(&mut reader, header.mode, &feeder_pipe, chunk_size))?;

    let announced = queue.begin(options.timeout)?;
    let mut printer = TickPrinter::new(out, options.format);
    let mut pulled = 0;
    let mut cancelled = false;
    while let Some(tick) = queue.next(options.timeout)? {
        printer.print(&tick)?;
        pulled += 1;
        if options.limit.is_some_and(|limit| pulled >= limit) {
            queue.close();
            cancelled = true;
            break;
        }
    }
    printer.finish()?;

    let max_allowed = pipe.max_allowed();
    let stats = if cancelled {
        framing.stop()?
    } else {
        framing.join()?
    };
    match feeder.join() {
        Ok(Ok(fed)) => debug!(fed, "feeder finished"),
        Ok(Err(e)) if cancelled => debug!(error = %e, "feeder stopped by cancellation"),
        Ok(Err(e)) => return Err(e),
        Err(_) => warn!("feeder thread panicked"),
    }

    if options.stats {
        eprintln!();
        print_stats(&stats, max_allowed);
    }
    Ok(ReplaySummary {
        announced,
        pulled,
        cancelled,
    })
}
