//! Routes decoded session messages into an [`AsyncOperation`].

use std::fmt;

use tickpipe_queue::AsyncOperation;
use tickpipe_types::{Message, Tick, UpstreamError};
use tracing::{debug, trace};

use crate::reader::RecordListener;

/// Listener that turns a message stream into the producer calls of one
/// operation.
///
/// | Message | Effect |
/// |---------|--------|
/// | `SubscribeAck` | [`AsyncOperation::begin`] |
/// | `EndOfData` | [`AsyncOperation::finish`] |
/// | `Reject` | [`AsyncOperation::fail`] |
/// | `Heartbeat` | ignored |
/// | anything else | `translate`, then [`AsyncOperation::push`] |
pub struct OperationBridge<T, F> {
    operation: AsyncOperation<T>,
    translate: F,
}

impl<T, F> OperationBridge<T, F>
where
    F: FnMut(Message) -> Option<T>,
{
    /// Creates a bridge feeding `operation`.
    ///
    /// `translate` maps a data message to a result; returning `None` drops it.
    pub const fn new(operation: AsyncOperation<T>, translate: F) -> Self {
        Self {
            operation,
            translate,
        }
    }

    /// The operation this bridge feeds.
    #[must_use]
    pub const fn operation(&self) -> &AsyncOperation<T> {
        &self.operation
    }
}

impl<T, F> RecordListener<Message> for OperationBridge<T, F>
where
    T: Send,
    F: FnMut(Message) -> Option<T> + Send,
{
    fn on_record(&mut self, record: Message) {
        match record {
            Message::SubscribeAck { total_count } => {
                debug!(?total_count, "subscription acknowledged");
                self.operation.begin(total_count);
            }
            Message::EndOfData => self.operation.finish(),
            Message::Reject { code, text } => {
                debug!(code, %text, "request rejected");
                self.operation.fail(UpstreamError::with_code(code, text));
            }
            Message::Heartbeat => trace!("heartbeat"),
            other => {
                if let Some(item) = (self.translate)(other) {
                    self.operation.push(item);
                }
            }
        }
    }
}

impl<T, F> fmt::Debug for OperationBridge<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationBridge")
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

fn tick_of(message: Message) -> Option<Tick> {
    match message {
        Message::Tick(tick) => Some(tick),
        _ => None,
    }
}

/// Bridge collecting [`Message::Tick`] records.
#[must_use]
pub fn tick_bridge(
    operation: AsyncOperation<Tick>,
) -> OperationBridge<Tick, fn(Message) -> Option<Tick>> {
    OperationBridge::new(operation, tick_of as fn(Message) -> Option<Tick>)
}
