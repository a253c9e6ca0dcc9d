//! Inspect command implementation.
//!
//! Decodes every record of a capture without a result queue and prints a
//! per-type breakdown.

use crate::capture::{CaptureHeader, feed_pipe};
use crate::display::{format_bytes, print_stats};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use tickpipe_lib::prelude::*;

/// Record counts by message type.
pub(crate) type Breakdown = BTreeMap<MessageType, u64>;

/// Count the records in `input`, optionally keeping only `only`.
pub(crate) fn inspect(input: &Path, only: &[MessageType], chunk_size: usize) -> Result<Breakdown> {
    let file =
        File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let mut reader = BufReader::new(file);
    let header = CaptureHeader::read_from(&mut reader)?;

    let mut registry = MessageRegistry::default();
    if !only.is_empty() {
        registry = registry.interested_in(only.iter().copied());
    }

    let pipe = BoundedBytePipe::new();
    let (tx, rx) = mpsc::channel();
    let framing = FramingReader::spawn(
        pipe.clone(),
        ReaderConfig {
            mode: header.mode,
            compression: header.compression,
            thread_name: "tickpipe-inspect".to_string(),
            ..ReaderConfig::default()
        },
        registry,
        move |message: Message| {
            let _ = tx.send(message.message_type());
        },
    )?;

    let feeder_pipe = pipe.clone();
    let feeder =
        thread::spawn(move || feed_pipe(&mut reader, header.mode, &feeder_pipe, chunk_size));
    let stats = framing
        .join()
        .with_context(|| format!("Failed to decode {}", input.display()))?;
    let fed = feeder
        .join()
        .map_err(|_| anyhow::anyhow!("feeder thread panicked"))??;

    let mut breakdown = Breakdown::new();
    for ty in rx.try_iter() {
        *breakdown.entry(ty).or_default() += 1;
    }

    println!("{:<14} {:>10}", "TYPE", "RECORDS");
    println!("{}", "-".repeat(25));
    for (ty, count) in &breakdown {
        println!("{:<14} {count:>10}", ty.as_str());
    }
    println!(
        "\n{} mode, {} compression, {} fed",
        header.mode,
        header.compression,
        format_bytes(fed)
    );
    print_stats(&stats, pipe.max_allowed());
    Ok(breakdown)
}
