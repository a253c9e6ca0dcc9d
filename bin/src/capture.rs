//! Capture file layout.
//!
//! A capture starts with an 8-byte header: the magic `TPK1`, one byte for
//! the framing mode, one byte for the compression and two reserved bytes.
//! In stream mode the rest of the file is the (possibly compressed) record
//! stream exactly as it would arrive off the wire. In block mode it is a
//! sequence of compressed blocks, each preceded by its little-endian `u32`
//! length.

use anyhow::{Context, Result, bail};
use std::io::{ErrorKind, Read, Write};
use tickpipe_lib::{BoundedBytePipe, Compression, FramingMode, Message, compress_block, encode_message};

const MAGIC: &[u8; 4] = b"TPK1";

/// Framing parameters recorded at the start of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CaptureHeader {
    pub(crate) mode: FramingMode,
    pub(crate) compression: Compression,
}

impl CaptureHeader {
    pub(crate) const LEN: usize = 8;

    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mode = match self.mode {
            FramingMode::Stream => 0,
            FramingMode::Block => 1,
        };
        let compression = match self.compression {
            Compression::None => 0,
            Compression::Deflate => 1,
            Compression::Lzma => 2,
        };
        writer.write_all(MAGIC)?;
        writer.write_all(&[mode, compression, 0, 0])?;
        Ok(())
    }

    pub(crate) fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; Self::LEN];
        reader
            .read_exact(&mut bytes)
            .context("Capture is shorter than its header")?;
        if &bytes[..4] != MAGIC {
            bail!("Not a tickpipe capture (bad magic)");
        }
        let mode = match bytes[4] {
            0 => FramingMode::Stream,
            1 => FramingMode::Block,
            other => bail!("Unknown framing mode {other} in capture header"),
        };
        let compression = match bytes[5] {
            0 => Compression::None,
            1 => Compression::Deflate,
            2 => Compression::Lzma,
            other => bail!("Unknown compression {other} in capture header"),
        };
        Ok(Self { mode, compression })
    }
}

/// Writes `messages` as a complete capture. Returns the bytes written after
/// the header.
pub(crate) fn write_capture<W: Write>(
    writer: &mut W,
    header: CaptureHeader,
    messages: &[Message],
) -> Result<u64> {
    header.write_to(writer)?;

    let mut written = 0u64;
    match header.mode {
        FramingMode::Stream => {
            if !header.compression.supports_streaming() {
                bail!("{} compression needs block mode", header.compression);
            }
            let records: Vec<u8> = messages.iter().flat_map(encode_message).collect();
            let body = compress_block(header.compression, &records)?;
            writer.write_all(&body)?;
            written += body.len() as u64;
        }
        FramingMode::Block => {
            for message in messages {
                let block = compress_block(header.compression, &encode_message(message))?;
                let len = u32::try_from(block.len()).context("Block exceeds 4 GiB")?;
                writer.write_all(&len.to_le_bytes())?;
                writer.write_all(&block)?;
                written += 4 + block.len() as u64;
            }
        }
    }
    writer.flush()?;
    Ok(written)
}

/// Copies a capture body into `pipe` the way a network session would: raw
/// chunks of `chunk_size` in stream mode, one write per block in block mode.
///
/// The pipe's write side is closed when this returns, whatever the outcome.
pub(crate) fn feed_pipe<R: Read>(
    reader: &mut R,
    mode: FramingMode,
    pipe: &BoundedBytePipe,
    chunk_size: usize,
) -> Result<u64> {
    let outcome = match mode {
        FramingMode::Stream => feed_stream(reader, pipe, chunk_size.max(1)),
        FramingMode::Block => feed_blocks(reader, pipe),
    };
    pipe.close_write();
    outcome
}

fn feed_stream<R: Read>(reader: &mut R, pipe: &BoundedBytePipe, chunk_size: usize) -> Result<u64> {
    let mut buf = vec![0u8; chunk_size];
    let mut fed = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(fed),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        pipe.write(&buf[..n])?;
        fed += n as u64;
    }
}

fn feed_blocks<R: Read>(reader: &mut R, pipe: &BoundedBytePipe) -> Result<u64> {
    let mut fed = 0u64;
    loop {
        let mut len = [0u8; 4];
        match reader.read_exact(&mut len) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(fed),
            Err(e) => return Err(e.into()),
        }
        let mut block = vec![0u8; u32::from_le_bytes(len) as usize];
        reader
            .read_exact(&mut block)
            .context("Capture ends inside a block")?;
        pipe.write(&block)?;
        fed += block.len() as u64;
    }
}
