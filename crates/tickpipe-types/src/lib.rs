//! Core types for the tickpipe async-to-sync bridge.
//!
//! This crate provides the data structures shared by every tickpipe crate:
//!
//! - [`TickpipeError`] - Error taxonomy for queues, pipes and framing
//! - [`UpstreamError`] - Terminal failure reported by a producer
//! - [`FramingError`] - Record framing and decoding failures
//! - [`Message`] / [`MessageType`] - Typed wire messages and discriminators
//! - [`Tick`] - Market data tick
//! - [`wait_while`] - Bounded condition-variable wait

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tickpipe/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod deadline;
mod error;
mod message;
mod tick;

pub use deadline::{WaitOutcome, wait_while};
pub use error::{FramingError, Result, TickpipeError, UpstreamError};
pub use message::{Message, MessageType};
pub use tick::Tick;
