//! Reassembles length-prefixed records from a byte stream.

use byteorder::{ByteOrder, LittleEndian};
use std::io::{self, Read};
use tickpipe_types::{FramingError, Result};

use crate::codec::LENGTH_PREFIX;

/// Pulls whole records off a reader, reusing one scratch buffer.
///
/// The buffer only ever grows, to the size of the largest record seen.
#[derive(Debug)]
pub struct FrameAssembler {
    scratch: Vec<u8>,
    max_record_len: usize,
}

impl FrameAssembler {
    /// Creates an assembler rejecting records longer than `max_record_len`.
    #[must_use]
    pub const fn new(max_record_len: usize) -> Self {
        Self {
            scratch: Vec::new(),
            max_record_len,
        }
    }

    /// Checks a declared record length.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] if the length cannot hold its own prefix
    /// or exceeds `max_record_len`.
    pub const fn check_length(
        declared: u32,
        max_record_len: usize,
    ) -> std::result::Result<usize, FramingError> {
        let len = declared as usize;
        if len < LENGTH_PREFIX {
            return Err(FramingError::LengthTooSmall(declared));
        }
        if len > max_record_len {
            return Err(FramingError::LengthTooLarge {
                declared,
                max: max_record_len,
            });
        }
        Ok(len)
    }

    /// Reads the next record, length prefix included.
    ///
    /// Returns `Ok(None)` if the source ends cleanly on a record boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if the source ends mid-record, the declared length
    /// is invalid, or the source itself fails.
    pub fn read_frame<R: Read + ?Sized>(&mut self, source: &mut R) -> Result<Option<&[u8]>> {
        let mut prefix = [0u8; LENGTH_PREFIX];
        let got = read_full(source, &mut prefix)?;
        if got == 0 {
            return Ok(None);
        }
        if got < LENGTH_PREFIX {
            return Err(FramingError::Truncated {
                expected: LENGTH_PREFIX,
                actual: got,
            }
            .into());
        }

        let len = Self::check_length(LittleEndian::read_u32(&prefix), self.max_record_len)?;
        if self.scratch.len() < len {
            self.scratch.resize(len, 0);
        }
        let record = &mut self.scratch[..len];
        record[..LENGTH_PREFIX].copy_from_slice(&prefix);

        let body = read_full(source, &mut record[LENGTH_PREFIX..])?;
        if body < len - LENGTH_PREFIX {
            return Err(FramingError::Truncated {
                expected: len,
                actual: LENGTH_PREFIX + body,
            }
            .into());
        }
        Ok(Some(&self.scratch[..len]))
    }
}

/// Fills `buf` unless the source ends first; returns the bytes read.
fn read_full<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
