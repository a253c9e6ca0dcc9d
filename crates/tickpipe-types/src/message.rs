//! Typed wire messages and their discriminators.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Tick;

/// Discriminator stored as a little-endian `u16` right after the length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Keep-alive with no body.
    Heartbeat,
    /// Subscription accepted; carries the server-reported total.
    SubscribeAck,
    /// Market data tick.
    Tick,
    /// No more records for this operation.
    EndOfData,
    /// Operation rejected by the server.
    Reject,
}

impl MessageType {
    /// All known message types, in discriminator order.
    pub const ALL: [Self; 5] = [
        Self::Heartbeat,
        Self::SubscribeAck,
        Self::Tick,
        Self::EndOfData,
        Self::Reject,
    ];

    /// Returns the wire discriminator.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Heartbeat => 0,
            Self::SubscribeAck => 1,
            Self::Tick => 2,
            Self::EndOfData => 3,
            Self::Reject => 4,
        }
    }

    /// Resolves a wire discriminator.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Heartbeat),
            1 => Some(Self::SubscribeAck),
            2 => Some(Self::Tick),
            3 => Some(Self::EndOfData),
            4 => Some(Self::Reject),
            _ => None,
        }
    }

    /// Returns the type as a string identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::SubscribeAck => "subscribe_ack",
            Self::Tick => "tick",
            Self::EndOfData => "end_of_data",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Keep-alive.
    Heartbeat,
    /// Subscription accepted.
    SubscribeAck {
        /// Total number of records the server intends to send, if known.
        total_count: Option<u64>,
    },
    /// Market data tick.
    Tick(Tick),
    /// No more records for this operation.
    EndOfData,
    /// Operation rejected.
    Reject {
        /// Server reject code.
        code: i32,
        /// Reject reason.
        text: String,
    },
}

impl Message {
    /// Returns the discriminator of this message.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Heartbeat => MessageType::Heartbeat,
            Self::SubscribeAck { .. } => MessageType::SubscribeAck,
            Self::Tick(_) => MessageType::Tick,
            Self::EndOfData => MessageType::EndOfData,
            Self::Reject { .. } => MessageType::Reject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_resolve_back() {
        for ty in MessageType::ALL {
            assert_eq!(MessageType::from_code(ty.code()), Some(ty));
        }
        assert_eq!(MessageType::from_code(99), None);
    }

    #[test]
    fn test_message_type_of_message() {
        let reject = Message::Reject {
            code: 7,
            text: "no entitlement".to_string(),
        };
        assert_eq!(reject.message_type(), MessageType::Reject);
        assert_eq!(Message::EndOfData.message_type().to_string(), "end_of_data");
    }

    #[test]
    fn test_message_json_is_tagged() {
        let ack = Message::SubscribeAck {
            total_count: Some(3),
        };
        let json = serde_json::to_string(&ack).unwrap();
        assert_eq!(json, r#"{"type":"subscribe_ack","total_count":3}"#);
    }
}
