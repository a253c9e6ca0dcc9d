//! Blocking result queues and backpressured record framing.
//!
//! This is a facade crate that re-exports functionality from the tickpipe
//! workspace crates for convenient access.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use tickpipe_lib::prelude::*;
//!
//! # fn main() -> tickpipe_lib::Result<()> {
//! let operation = AsyncOperation::new();
//! let queue = operation.queue();
//! let pipe = BoundedBytePipe::new();
//! let reader = FramingReader::spawn(
//!     pipe.clone(),
//!     ReaderConfig::default(),
//!     MessageRegistry::default(),
//!     tick_bridge(operation),
//! )?;
//!
//! pipe.write(&encode_message(&Message::SubscribeAck { total_count: Some(0) }))?;
//! pipe.write(&encode_message(&Message::EndOfData))?;
//! pipe.close_write();
//!
//! let wait = Some(Duration::from_secs(5));
//! assert_eq!(queue.begin(wait)?, Some(0));
//! assert!(queue.next(wait)?.is_none());
//! reader.join()?;
//! # Ok(())
//! # }
//! ```

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tickpipe/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use tickpipe_types::*;

// Re-export the result queue
pub use tickpipe_queue::{
    AsyncOperation, QueueConfig, QueueState, ResultIter, ResultQueue, RingBuffer, UnsubscribeHook,
};

// Re-export the byte pipe and framing
#[cfg(feature = "stream")]
pub use tickpipe_stream::{
    BoundedBytePipe, Compression, DecompressError, Frame, FrameAssembler, FrameDecoder,
    FramingMode, FramingReader, MessageRegistry, OperationBridge, PipeConfig, PipeReader,
    PipeWriter, RawFrames, ReaderConfig, ReaderStats, RecordListener, codec, compress_block,
    decompress_block, encode_frame, encode_message, tick_bridge,
};

/// Prelude module for convenient imports.
///
/// ```
/// use tickpipe_lib::prelude::*;
/// ```
pub mod prelude {
    pub use tickpipe_types::{Message, MessageType, Result, Tick, TickpipeError, UpstreamError};

    pub use tickpipe_queue::{AsyncOperation, QueueConfig, ResultQueue};

    #[cfg(feature = "stream")]
    pub use tickpipe_stream::{
        BoundedBytePipe, Compression, FramingMode, FramingReader, MessageRegistry,
        OperationBridge, PipeConfig, RawFrames, ReaderConfig, RecordListener, encode_message,
        tick_bridge,
    };
}
