//! Market data tick carried by the `Tick` wire message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single tick representing a price update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Timestamp of the tick (UTC, millisecond precision on the wire).
    pub timestamp: DateTime<Utc>,
    /// Ask (offer) price.
    pub ask: f64,
    /// Bid price.
    pub bid: f64,
    /// Volume available at the ask price.
    pub ask_volume: f32,
    /// Volume available at the bid price.
    pub bid_volume: f32,
}

impl Tick {
    /// Size in bytes of a tick body on the wire:
    /// - `i64`: milliseconds since the Unix epoch
    /// - `f64`: ask price
    /// - `f64`: bid price
    /// - `f32`: ask volume
    /// - `f32`: bid volume
    pub const WIRE_SIZE: usize = 32;

    /// Creates a new tick.
    #[must_use]
    pub const fn new(
        timestamp: DateTime<Utc>,
        ask: f64,
        bid: f64,
        ask_volume: f32,
        bid_volume: f32,
    ) -> Self {
        Self {
            timestamp,
            ask,
            bid,
            ask_volume,
            bid_volume,
        }
    }

    /// Returns the spread (ask - bid).
    #[must_use]
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}
