//! Blocking growable result queue for the tickpipe async-to-sync bridge.
//!
//! - [`ResultQueue`] - Pull-style `begin` / `next` / `end` consumer protocol
//! - [`AsyncOperation`] - Producer handle fed by the session layer
//! - [`RingBuffer`] - Growable circular buffer backing the queue

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tickpipe/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod operation;
mod queue;
mod ring;

pub use operation::AsyncOperation;
pub use queue::{QueueConfig, QueueState, ResultIter, ResultQueue, UnsubscribeHook};
pub use ring::RingBuffer;
