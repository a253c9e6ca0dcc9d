//! Byte transport and record framing for tickpipe.
//!
//! - [`BoundedBytePipe`] - Blocking byte pipe with adaptive backpressure
//! - [`Compression`] / [`decompress_block`] - Deflate and LZMA codecs
//! - [`FrameDecoder`] - Record decoders ([`RawFrames`], [`MessageRegistry`])
//! - [`FramingReader`] - Dedicated loop dispatching records to a listener
//! - [`OperationBridge`] - Listener feeding an `AsyncOperation`

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tickpipe/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod assembler;
mod bridge;
pub mod codec;
mod decompress;
mod pipe;
mod reader;

pub use assembler::FrameAssembler;
pub use bridge::{OperationBridge, tick_bridge};
pub use codec::{
    DecodeFn, Frame, FrameDecoder, MessageRegistry, RawFrames, encode_frame, encode_message,
};
pub use decompress::{
    Compression, DecompressError, compress_block, decompress_block, decompressing_reader,
};
pub use pipe::{BoundedBytePipe, PipeConfig, PipeReader, PipeWriter};
pub use reader::{FramingMode, FramingReader, ReaderConfig, ReaderStats, RecordListener};
