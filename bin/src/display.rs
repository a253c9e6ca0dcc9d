//! Display utilities and argument types for the tickpipe CLI.

use anyhow::Result;
use clap::ValueEnum;
use std::io::Write;
use tickpipe_lib::prelude::*;
use tickpipe_lib::ReaderStats;

/// Output format for replayed ticks.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum Format {
    Table,
    Ndjson,
}

/// Framing mode argument.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum ModeArg {
    Stream,
    Block,
}

impl From<ModeArg> for FramingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Stream => Self::Stream,
            ModeArg::Block => Self::Block,
        }
    }
}

/// Compression argument.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum CompressionArg {
    None,
    Deflate,
    Lzma,
}

impl From<CompressionArg> for Compression {
    fn from(compression: CompressionArg) -> Self {
        match compression {
            CompressionArg::None => Self::None,
            CompressionArg::Deflate => Self::Deflate,
            CompressionArg::Lzma => Self::Lzma,
        }
    }
}

/// Writes ticks as they are pulled off the queue.
pub(crate) struct TickPrinter<W: Write> {
    out: W,
    format: Format,
    header_done: bool,
}

impl<W: Write> TickPrinter<W> {
    pub(crate) const fn new(out: W, format: Format) -> Self {
        Self {
            out,
            format,
            header_done: false,
        }
    }

    pub(crate) fn print(&mut self, tick: &Tick) -> Result<()> {
        match self.format {
            Format::Table => {
                if !self.header_done {
                    writeln!(
                        self.out,
                        "{:<26} {:>12} {:>12} {:>10} {:>10} {:>10}",
                        "TIMESTAMP", "ASK", "BID", "SPREAD", "ASK VOL", "BID VOL"
                    )?;
                    writeln!(self.out, "{}", "-".repeat(85))?;
                    self.header_done = true;
                }
                writeln!(
                    self.out,
                    "{:<26} {:>12.5} {:>12.5} {:>10.5} {:>10.2} {:>10.2}",
                    tick.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                    tick.ask,
                    tick.bid,
                    tick.spread(),
                    tick.ask_volume,
                    tick.bid_volume,
                )?;
            }
            Format::Ndjson => {
                serde_json::to_writer(&mut self.out, tick)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Prints a framing loop summary to stderr.
pub(crate) fn print_stats(stats: &ReaderStats, max_allowed: usize) {
    eprintln!("{:<18} {:>12}", "Records", stats.frames);
    eprintln!("{:<18} {:>12}", "Dispatched", stats.dispatched);
    eprintln!("{:<18} {:>12}", "Record bytes", format_bytes(stats.bytes));
    eprintln!("{:<18} {:>12}", "Pipe cap", format_bytes(max_allowed as u64));
    if stats.listener_panics > 0 {
        eprintln!("{:<18} {:>12}", "Listener panics", stats.listener_panics);
    }
}

/// Human readable byte count.
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let value = bytes as f64;
    if value >= KIB * KIB {
        format!("{:.1} MiB", value / (KIB * KIB))
    } else if value >= KIB {
        format!("{:.1} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn test_ndjson_line() {
        let tick = Tick::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            1.5,
            1.25,
            1.0,
            2.0,
        );
        let mut printer = TickPrinter::new(Vec::new(), Format::Ndjson);
        printer.print(&tick).unwrap();
        let out = String::from_utf8(printer.finish().unwrap()).unwrap();
        assert!(out.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["ask"], 1.5);
    }

    #[test]
    fn test_argument_enums_debug() {
        assert_eq!(format!("{:?}", Format::Ndjson), "Ndjson");
        assert_eq!(format!("{:?}", ModeArg::Block), "Block");
        assert_eq!(format!("{:?}", CompressionArg::Lzma), "Lzma");
    }

    #[test]
    fn test_table_header_once() {
        let tick = Tick::new(Utc.timestamp_millis_opt(0).unwrap(), 2.0, 1.0, 0.0, 0.0);
        let mut printer = TickPrinter::new(Vec::new(), Format::Table);
        printer.print(&tick).unwrap();
        printer.print(&tick).unwrap();
        let out = String::from_utf8(printer.finish().unwrap()).unwrap();
        assert_eq!(out.matches("TIMESTAMP").count(), 1);
        assert_eq!(out.lines().count(), 4);
    }
}
