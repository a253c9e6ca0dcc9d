//! Producer handle for one asynchronous operation.

use std::fmt;
use std::sync::Arc;

use tickpipe_types::{Result, UpstreamError};

use crate::{QueueConfig, ResultQueue, UnsubscribeHook};

/// Cloneable producer side of a [`ResultQueue`].
///
/// The session layer keeps one of these per issued request and forwards its
/// callbacks to it; the application keeps the queue returned by
/// [`queue`](Self::queue) and pulls from it. Every method is no-throw and
/// becomes a no-op once the operation has finished.
pub struct AsyncOperation<T> {
    queue: Arc<ResultQueue<T>>,
}

impl<T> AsyncOperation<T> {
    /// Issues an operation backed by a queue with default sizing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Arc::new(ResultQueue::new()),
        }
    }

    /// Issues an operation whose queue runs `unsubscribe` when the consumer
    /// closes it early.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue configuration is invalid.
    pub fn with_unsubscribe(config: &QueueConfig, unsubscribe: UnsubscribeHook) -> Result<Self> {
        Ok(Self {
            queue: Arc::new(ResultQueue::with_unsubscribe(config, unsubscribe)?),
        })
    }

    /// Wraps an existing queue.
    #[must_use]
    pub const fn from_queue(queue: Arc<ResultQueue<T>>) -> Self {
        Self { queue }
    }

    /// Consumer handle for this operation.
    #[must_use]
    pub fn queue(&self) -> Arc<ResultQueue<T>> {
        Arc::clone(&self.queue)
    }

    /// The server accepted the request.
    pub fn begin(&self, total_count: Option<u64>) {
        self.queue.set_begin(total_count);
    }

    /// A result arrived.
    pub fn push(&self, item: T) {
        self.queue.set_result(item);
    }

    /// No more results will arrive.
    pub fn finish(&self) {
        self.queue.set_end();
    }

    /// The operation failed.
    pub fn fail(&self, error: UpstreamError) {
        self.queue.set_error(error);
    }

    /// Returns true once the queue reached a terminal state, including a
    /// consumer-side close.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.queue.is_finished()
    }
}

impl<T> Clone for AsyncOperation<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T> Default for AsyncOperation<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AsyncOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncOperation")
            .field("queue", &self.queue)
            .finish()
    }
}
