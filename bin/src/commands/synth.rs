//! Synth command implementation.
//!
//! Writes a deterministic sample session (acknowledgement, ticks with the
//! occasional heartbeat, then end-of-data or a reject) as a capture file.

use crate::capture::{CaptureHeader, write_capture};
use crate::display::format_bytes;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tickpipe_lib::prelude::*;
use tracing::info;

/// Options for a synthetic session.
#[derive(Debug, Clone)]
pub(crate) struct SynthOptions {
    pub(crate) ticks: usize,
    pub(crate) start: DateTime<Utc>,
    pub(crate) interval_ms: i64,
    pub(crate) heartbeat_every: usize,
    pub(crate) reject: Option<i32>,
}

/// Builds the message sequence of a synthetic session.
pub(crate) fn session(options: &SynthOptions) -> Vec<Message> {
    let mut messages = Vec::with_capacity(options.ticks + options.ticks / 16 + 2);
    messages.push(Message::SubscribeAck {
        total_count: Some(options.ticks as u64),
    });

    let mut bid = 1.08500;
    for i in 0..options.ticks {
        // Small deterministic walk so consecutive ticks differ.
        let step = ((i * 7_919) % 11) as f64 - 5.0;
        bid += step * 1e-5;
        let spread = 2e-5 + ((i % 3) as f64) * 1e-5;
        let ts = options.start + TimeDelta::milliseconds(options.interval_ms * i as i64);
        let volume = 0.5 + (i % 5) as f32 * 0.25;
        messages.push(Message::Tick(Tick::new(ts, bid + spread, bid, volume, volume * 1.5)));

        if options.heartbeat_every > 0 && (i + 1) % options.heartbeat_every == 0 {
            messages.push(Message::Heartbeat);
        }
    }

    messages.push(match options.reject {
        Some(code) => Message::Reject {
            code,
            text: format!("session rejected after {} ticks", options.ticks),
        },
        None => Message::EndOfData,
    });
    messages
}

/// Write a synthetic capture to `output`.
pub(crate) fn synth(output: &Path, header: CaptureHeader, options: &SynthOptions) -> Result<()> {
    let messages = session(options);
    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let written = write_capture(&mut writer, header, &messages)?;

    info!(
        messages = messages.len(),
        mode = %header.mode,
        compression = %header.compression,
        "capture written"
    );
    println!(
        "Wrote {} messages ({}) to {}",
        messages.len(),
        format_bytes(written),
        output.display()
    );
    Ok(())
}
