//! Error types for tickpipe.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for tickpipe operations.
pub type Result<T> = std::result::Result<T, TickpipeError>;

/// Errors surfaced to callers of the queue, pipe and framing reader.
#[derive(Error, Debug)]
pub enum TickpipeError {
    /// A blocking call gave up before its condition became true.
    ///
    /// The object that timed out is left untouched and can be used again.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The producer reported a terminal failure.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The named object no longer accepts this operation.
    #[error("{0} is closed")]
    Closed(&'static str),

    /// A record could not be framed or decoded.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// Decompression of the byte source failed.
    #[error("Decompression error: {0}")]
    Decompress(String),

    /// I/O error from an underlying reader or writer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration value was rejected.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TickpipeError {
    /// Returns true if this is a timeout, which never alters the state of
    /// the object that reported it.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Terminal failure reported by the producer side of an operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Upstream failure{}: {message}", code_suffix(.code))]
pub struct UpstreamError {
    /// Server-side reject code, when one was supplied.
    pub code: Option<i32>,
    /// Human readable reason.
    pub message: String,
}

impl UpstreamError {
    /// Creates an upstream error without a reject code.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates an upstream error carrying a reject code.
    #[must_use]
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

fn code_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Errors raised while extracting or decoding a length-prefixed record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// The declared length cannot even hold the 4-byte prefix.
    #[error("Declared record length {0} is smaller than the length prefix")]
    LengthTooSmall(u32),

    /// The declared length exceeds the configured maximum.
    #[error("Declared record length {declared} exceeds maximum {max}")]
    LengthTooLarge {
        /// Length read from the prefix.
        declared: u32,
        /// Configured upper bound.
        max: usize,
    },

    /// The byte source ended in the middle of a record.
    #[error("Record truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the record should have had.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// The record is too short to carry a message-type discriminator.
    #[error("Record of {0} bytes has no message type")]
    MissingDiscriminator(usize),

    /// No decoder is registered for this discriminator.
    #[error("Unknown message type {0}")]
    UnknownMessageType(u16),

    /// The body is shorter than the message layout requires.
    #[error("Message type {message_type} needs {expected} body bytes, got {actual}")]
    BodyTooShort {
        /// Discriminator of the message.
        message_type: u16,
        /// Bytes required by the layout.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },

    /// A field holds a value its type cannot represent.
    #[error("Message type {message_type} has an invalid {field}")]
    InvalidField {
        /// Discriminator of the message.
        message_type: u16,
        /// Name of the offending field.
        field: &'static str,
    },

    /// A whole block decompressed to more than the one record it declares.
    #[error("Block carries {0} bytes after its record")]
    TrailingBytes(usize),
}
