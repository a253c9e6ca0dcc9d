//! Block and streaming decompression of the record source.

use flate2::read::{DeflateDecoder, DeflateEncoder};
use lzma_rs::{lzma_compress, lzma_decompress};
use std::fmt;
use std::io::{BufReader, Cursor, Read};
use thiserror::Error;
use tickpipe_types::{Result, TickpipeError};

/// Compression applied to the bytes written into the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Records travel uncompressed.
    #[default]
    None,
    /// Raw deflate; usable as a continuous stream or per block.
    Deflate,
    /// LZMA-alone; only usable per block.
    Lzma,
}

impl Compression {
    /// Returns true if the codec can decompress a continuous stream.
    #[must_use]
    pub const fn supports_streaming(self) -> bool {
        !matches!(self, Self::Lzma)
    }

    /// Returns the codec as a string identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Deflate => "deflate",
            Self::Lzma => "lzma",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during block (de)compression.
#[derive(Error, Debug)]
pub enum DecompressError {
    /// LZMA decompression failed.
    #[error("LZMA decompression failed: {0}")]
    LzmaError(String),

    /// The deflate codec, or the LZMA encoder, failed.
    #[error("Codec error: {0}")]
    Codec(#[from] std::io::Error),

    /// Empty input data.
    #[error("Empty input data")]
    EmptyInput,
}

impl From<DecompressError> for TickpipeError {
    fn from(err: DecompressError) -> Self {
        Self::Decompress(err.to_string())
    }
}

/// Decompresses one whole block.
///
/// # Errors
///
/// Returns an error if the block is empty or corrupt.
pub fn decompress_block(
    compression: Compression,
    compressed: &[u8],
) -> std::result::Result<Vec<u8>, DecompressError> {
    if compressed.is_empty() {
        return Err(DecompressError::EmptyInput);
    }

    let mut decompressed = Vec::new();
    match compression {
        Compression::None => decompressed.extend_from_slice(compressed),
        Compression::Deflate => {
            DeflateDecoder::new(compressed).read_to_end(&mut decompressed)?;
        }
        Compression::Lzma => {
            let mut reader = BufReader::new(Cursor::new(compressed));
            lzma_decompress(&mut reader, &mut decompressed)
                .map_err(|e| DecompressError::LzmaError(e.to_string()))?;
        }
    }
    Ok(decompressed)
}

/// Compresses one whole block, the inverse of [`decompress_block`].
///
/// # Errors
///
/// Returns an error if the encoder fails.
pub fn compress_block(
    compression: Compression,
    data: &[u8],
) -> std::result::Result<Vec<u8>, DecompressError> {
    let mut compressed = Vec::new();
    match compression {
        Compression::None => compressed.extend_from_slice(data),
        Compression::Deflate => {
            DeflateEncoder::new(data, flate2::Compression::default())
                .read_to_end(&mut compressed)?;
        }
        Compression::Lzma => {
            let mut reader = BufReader::new(Cursor::new(data));
            lzma_compress(&mut reader, &mut compressed)?;
        }
    }
    Ok(compressed)
}

/// Wraps `source` in a continuously decompressing reader.
///
/// # Errors
///
/// Returns [`TickpipeError::Config`] for codecs without streaming support.
pub fn decompressing_reader<R>(
    compression: Compression,
    source: R,
) -> Result<Box<dyn Read + Send>>
where
    R: Read + Send + 'static,
{
    match compression {
        Compression::None => Ok(Box::new(source)),
        Compression::Deflate => Ok(Box::new(DeflateDecoder::new(source))),
        Compression::Lzma => Err(TickpipeError::Config(format!(
            "{compression} cannot be decompressed as a stream; use block mode"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let result = decompress_block(Compression::Lzma, &[]);
        assert!(matches!(result, Err(DecompressError::EmptyInput)));
    }

    #[test]
    fn test_invalid_lzma() {
        let result = decompress_block(Compression::Lzma, &[0x00, 0x01, 0x02, 0x03]);
        assert!(matches!(result, Err(DecompressError::LzmaError(_))));
    }

    #[test]
    fn test_block_codecs_restore_input() {
        let data: Vec<u8> = b"bid ask bid ask ".repeat(64);
        for compression in [Compression::None, Compression::Deflate, Compression::Lzma] {
            let compressed = compress_block(compression, &data).unwrap();
            assert_eq!(decompress_block(compression, &compressed).unwrap(), data);
        }
    }

    #[test]
    fn test_streaming_deflate_reader() {
        let data = b"streamed records".repeat(100);
        let compressed = compress_block(Compression::Deflate, &data).unwrap();
        let mut reader = decompressing_reader(Compression::Deflate, Cursor::new(compressed)).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_lzma_rejected_for_streaming() {
        assert!(!Compression::Lzma.supports_streaming());
        assert!(matches!(
            decompressing_reader(Compression::Lzma, Cursor::new(Vec::new())),
            Err(TickpipeError::Config(_))
        ));
    }
}
