//! Record layout and decoders.
//!
//! Every record starts with a little-endian `u32` holding the total record
//! length, prefix included. Typed records follow it with a little-endian
//! `u16` message type and a type-specific body:
//!
//! | Type | Body |
//! |------|------|
//! | `Heartbeat` | empty |
//! | `SubscribeAck` | `i64` total count, negative when unknown |
//! | `Tick` | `i64` epoch millis, `f64` ask, `f64` bid, `f32` ask volume, `f32` bid volume |
//! | `EndOfData` | empty |
//! | `Reject` | `i32` code, `u16` text length, UTF-8 text |

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tickpipe_types::{FramingError, Message, MessageType, Tick};

/// Size of the length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Offset of the message-type discriminator inside a typed record.
pub const DISCRIMINATOR_OFFSET: usize = LENGTH_PREFIX;

/// Size of the typed record header (length prefix plus discriminator).
pub const TYPED_HEADER: usize = DISCRIMINATOR_OFFSET + 2;

/// Turns one complete record into the value handed to a listener.
pub trait FrameDecoder: Send {
    /// Decoded record type.
    type Record: Send;

    /// Decodes `frame`, the whole record including its length prefix.
    ///
    /// Returns `Ok(None)` for records the listener is not interested in.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] if the record cannot be resolved.
    fn decode(&self, frame: &[u8]) -> Result<Option<Self::Record>, FramingError>;
}

/// An undecoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Whole record, length prefix included.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Record bytes after the length prefix.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.bytes[LENGTH_PREFIX..]
    }

    /// Total record length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the record has no payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.len() == LENGTH_PREFIX
    }
}

/// Decoder dispatching every record as an opaque [`Frame`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFrames;

impl FrameDecoder for RawFrames {
    type Record = Frame;

    fn decode(&self, frame: &[u8]) -> Result<Option<Frame>, FramingError> {
        Ok(Some(Frame {
            bytes: Bytes::copy_from_slice(frame),
        }))
    }
}

/// Decodes a message body (the bytes after the typed header).
pub type DecodeFn = fn(&[u8]) -> Result<Message, FramingError>;

/// Lookup table from message-type discriminator to body decoder.
#[derive(Debug, Clone)]
pub struct MessageRegistry {
    decoders: HashMap<u16, DecodeFn>,
    interest: Option<HashSet<u16>>,
}

impl MessageRegistry {
    /// Creates a registry with no decoders.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
            interest: None,
        }
    }

    /// Registers (or replaces) the decoder for `code`.
    pub fn register(&mut self, code: u16, decoder: DecodeFn) -> &mut Self {
        self.decoders.insert(code, decoder);
        self
    }

    /// Restricts dispatch to the given message types; other known types are
    /// decoded as "not interesting" and skipped.
    #[must_use]
    pub fn interested_in(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.interest = Some(types.into_iter().map(MessageType::code).collect());
        self
    }

    /// Looks up the decoder for `code`.
    #[must_use]
    pub fn resolve(&self, code: u16) -> Option<DecodeFn> {
        self.decoders.get(&code).copied()
    }
}

impl Default for MessageRegistry {
    /// Registry decoding every [`MessageType`].
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(MessageType::Heartbeat.code(), |_| Ok(Message::Heartbeat))
            .register(MessageType::SubscribeAck.code(), decode_subscribe_ack)
            .register(MessageType::Tick.code(), decode_tick)
            .register(MessageType::EndOfData.code(), |_| Ok(Message::EndOfData))
            .register(MessageType::Reject.code(), decode_reject);
        registry
    }
}

impl FrameDecoder for MessageRegistry {
    type Record = Message;

    fn decode(&self, frame: &[u8]) -> Result<Option<Message>, FramingError> {
        if frame.len() < TYPED_HEADER {
            return Err(FramingError::MissingDiscriminator(frame.len()));
        }
        let code = LittleEndian::read_u16(&frame[DISCRIMINATOR_OFFSET..TYPED_HEADER]);
        let decoder = self
            .resolve(code)
            .ok_or(FramingError::UnknownMessageType(code))?;

        if self
            .interest
            .as_ref()
            .is_some_and(|interest| !interest.contains(&code))
        {
            return Ok(None);
        }
        decoder(&frame[TYPED_HEADER..]).map(Some)
    }
}

fn require(body: &[u8], ty: MessageType, expected: usize) -> Result<(), FramingError> {
    if body.len() < expected {
        return Err(FramingError::BodyTooShort {
            message_type: ty.code(),
            expected,
            actual: body.len(),
        });
    }
    Ok(())
}

fn decode_subscribe_ack(body: &[u8]) -> Result<Message, FramingError> {
    require(body, MessageType::SubscribeAck, 8)?;
    let total = LittleEndian::read_i64(&body[0..8]);
    Ok(Message::SubscribeAck {
        total_count: u64::try_from(total).ok(),
    })
}

fn decode_tick(body: &[u8]) -> Result<Message, FramingError> {
    require(body, MessageType::Tick, Tick::WIRE_SIZE)?;
    let millis = LittleEndian::read_i64(&body[0..8]);
    let timestamp =
        DateTime::<Utc>::from_timestamp_millis(millis).ok_or(FramingError::InvalidField {
            message_type: MessageType::Tick.code(),
            field: "timestamp",
        })?;
    Ok(Message::Tick(Tick::new(
        timestamp,
        LittleEndian::read_f64(&body[8..16]),
        LittleEndian::read_f64(&body[16..24]),
        LittleEndian::read_f32(&body[24..28]),
        LittleEndian::read_f32(&body[28..32]),
    )))
}

fn decode_reject(body: &[u8]) -> Result<Message, FramingError> {
    require(body, MessageType::Reject, 6)?;
    let code = LittleEndian::read_i32(&body[0..4]);
    let text_len = usize::from(LittleEndian::read_u16(&body[4..6]));
    require(body, MessageType::Reject, 6 + text_len)?;
    let text = std::str::from_utf8(&body[6..6 + text_len]).map_err(|_| {
        FramingError::InvalidField {
            message_type: MessageType::Reject.code(),
            field: "text",
        }
    })?;
    Ok(Message::Reject {
        code,
        text: text.to_string(),
    })
}

/// Builds an untyped record around `payload`.
///
/// # Errors
///
/// Returns [`FramingError::LengthTooLarge`] if the record would not fit a
/// `u32` length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    let total = LENGTH_PREFIX + payload.len();
    let len = u32::try_from(total).map_err(|_| FramingError::LengthTooLarge {
        declared: u32::MAX,
        max: total,
    })?;
    let mut frame = vec![0u8; LENGTH_PREFIX];
    LittleEndian::write_u32(&mut frame, len);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Encodes a typed record.
///
/// Reject texts longer than `u16::MAX` bytes are cut at the last character
/// boundary that fits.
#[must_use]
pub fn encode_message(message: &Message) -> Vec<u8> {
    let body_len = match message {
        Message::Heartbeat | Message::EndOfData => 0,
        Message::SubscribeAck { .. } => 8,
        Message::Tick(_) => Tick::WIRE_SIZE,
        Message::Reject { text, .. } => 6 + clamp_text(text).len(),
    };
    let total = TYPED_HEADER + body_len;

    let mut frame = vec![0u8; total];
    // Bounded by u16::MAX text plus a fixed header, so this always fits.
    LittleEndian::write_u32(&mut frame[0..LENGTH_PREFIX], total as u32);
    LittleEndian::write_u16(
        &mut frame[DISCRIMINATOR_OFFSET..TYPED_HEADER],
        message.message_type().code(),
    );

    let body = &mut frame[TYPED_HEADER..];
    match message {
        Message::Heartbeat | Message::EndOfData => {}
        Message::SubscribeAck { total_count } => {
            let total = total_count.and_then(|n| i64::try_from(n).ok()).unwrap_or(-1);
            LittleEndian::write_i64(&mut body[0..8], total);
        }
        Message::Tick(tick) => {
            LittleEndian::write_i64(&mut body[0..8], tick.timestamp.timestamp_millis());
            LittleEndian::write_f64(&mut body[8..16], tick.ask);
            LittleEndian::write_f64(&mut body[16..24], tick.bid);
            LittleEndian::write_f32(&mut body[24..28], tick.ask_volume);
            LittleEndian::write_f32(&mut body[28..32], tick.bid_volume);
        }
        Message::Reject { code, text } => {
            let text = clamp_text(text);
            LittleEndian::write_i32(&mut body[0..4], *code);
            LittleEndian::write_u16(&mut body[4..6], text.len() as u16);
            body[6..].copy_from_slice(text.as_bytes());
        }
    }
    frame
}

fn clamp_text(text: &str) -> &str {
    let mut end = text.len().min(usize::from(u16::MAX));
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
