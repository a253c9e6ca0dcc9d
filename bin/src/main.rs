//! tickpipe CLI - write and replay framed tick captures.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tickpipe_lib::MessageType;
use tracing_subscriber::EnvFilter;

mod capture;
mod commands;
mod display;

use capture::CaptureHeader;
use commands::replay::ReplayOptions;
use commands::synth::SynthOptions;
use display::{CompressionArg, Format, ModeArg};

#[derive(Parser)]
#[command(name = "tickpipe")]
#[command(about = "Write and replay framed tick captures", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic session capture
    Synth {
        /// Output file path
        output: PathBuf,

        /// Number of ticks
        #[arg(short, long, default_value = "1000")]
        ticks: usize,

        /// Framing mode
        #[arg(short, long, value_enum, default_value = "stream")]
        mode: ModeArg,

        /// Compression (lzma requires block mode)
        #[arg(short, long, value_enum, default_value = "deflate")]
        compression: CompressionArg,

        /// Timestamp of the first tick (RFC 3339)
        #[arg(long, default_value = "2024-01-02T00:00:00Z")]
        start: String,

        /// Milliseconds between ticks
        #[arg(long, default_value = "250")]
        interval_ms: i64,

        /// Emit a heartbeat after every N ticks (0 disables)
        #[arg(long, default_value = "100")]
        heartbeat_every: usize,

        /// End the session with a reject carrying this code
        #[arg(long)]
        reject: Option<i32>,
    },

    /// Replay a capture through the pipe, framing reader and result queue
    Replay {
        /// Capture file
        input: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: Format,

        /// Stop (and unsubscribe) after this many ticks
        #[arg(short, long)]
        limit: Option<usize>,

        /// Bytes per simulated network read
        #[arg(long, default_value = "4096")]
        chunk_size: usize,

        /// Initial pipe capacity in bytes
        #[arg(long, default_value = "65536")]
        pipe_bytes: usize,

        /// Seconds to wait for each result (0 waits forever)
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Print framing statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Count the records of a capture by message type
    Inspect {
        /// Capture file
        input: PathBuf,

        /// Only count these message types (heartbeat, subscribe_ack, tick,
        /// end_of_data, reject, or their codes 0-4)
        #[arg(short, long, value_delimiter = ',')]
        only: Vec<String>,

        /// Bytes per simulated network read
        #[arg(long, default_value = "4096")]
        chunk_size: usize,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Accepts a type name or its numeric wire code.
fn parse_message_type(s: &str) -> Result<MessageType> {
    let by_code = s.parse::<u16>().ok().and_then(MessageType::from_code);
    by_code
        .or_else(|| {
            MessageType::ALL
                .iter()
                .copied()
                .find(|ty| ty.as_str() == s.to_lowercase())
        })
        .with_context(|| {
            format!(
                "Unknown message type: {s}. Valid options: heartbeat, subscribe_ack, tick, end_of_data, reject (or codes 0-4)"
            )
        })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    // Show help if no command provided
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Synth {
            output,
            ticks,
            mode,
            compression,
            start,
            interval_ms,
            heartbeat_every,
            reject,
        } => {
            let start = DateTime::parse_from_rfc3339(&start)
                .with_context(|| format!("Invalid start timestamp: {start}"))?
                .with_timezone(&Utc);
            if interval_ms < 0 {
                bail!("--interval-ms must not be negative");
            }
            let header = CaptureHeader {
                mode: mode.into(),
                compression: compression.into(),
            };
            let options = SynthOptions {
                ticks,
                start,
                interval_ms,
                heartbeat_every,
                reject,
            };
            commands::synth::synth(&output, header, &options)
        }
        Commands::Replay {
            input,
            format,
            limit,
            chunk_size,
            pipe_bytes,
            timeout,
            stats,
        } => {
            let options = ReplayOptions {
                chunk_size,
                pipe_bytes,
                timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
                limit,
                format,
                stats,
            };
            let summary = commands::replay::replay(&input, &options, io::stdout().lock())?;
            if !cli.quiet {
                let announced = summary
                    .announced
                    .map_or_else(|| "unknown".to_string(), |n| n.to_string());
                eprintln!(
                    "\nPulled {} ticks (announced: {announced}){}",
                    summary.pulled,
                    if summary.cancelled { ", cancelled" } else { "" }
                );
            }
            Ok(())
        }
        Commands::Inspect {
            input,
            only,
            chunk_size,
        } => {
            let only = only
                .iter()
                .map(|s| parse_message_type(s))
                .collect::<Result<Vec<_>>>()?;
            commands::inspect::inspect(&input, &only, chunk_size)?;
            Ok(())
        }
    }
}
