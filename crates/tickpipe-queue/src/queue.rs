//! Blocking result queue with a `begin` / `next` / `end` pull protocol.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tickpipe_types::{Result, TickpipeError, UpstreamError, WaitOutcome, wait_while};
use tracing::{debug, trace, warn};

use crate::RingBuffer;

/// Hook asking the upstream session to stop sending results.
pub type UnsubscribeHook = Box<dyn FnOnce() -> std::result::Result<(), UpstreamError> + Send>;

/// Lifecycle of a [`ResultQueue`].
///
/// `Completed` and `Failed` are terminal: once entered, every producer call
/// becomes a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueState {
    /// No producer signal yet.
    #[default]
    NotStarted,
    /// The producer announced the start of the result stream.
    Started,
    /// The producer finished, or the consumer closed the queue.
    Completed,
    /// The producer reported an error.
    Failed,
}

impl QueueState {
    /// Returns true if the queue is in a terminal state.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the state as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sizing of the queue's circular buffer.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Slots allocated up front.
    pub initial_capacity: usize,
    /// Slots added each time a full buffer receives another result.
    pub grow_increment: usize,
}

impl QueueConfig {
    /// Default initial capacity and growth increment.
    pub const DEFAULT_SLOTS: usize = 1000;

    fn validate(&self) -> Result<()> {
        if self.initial_capacity == 0 {
            return Err(TickpipeError::Config(
                "queue initial_capacity must be at least 1".to_string(),
            ));
        }
        if self.grow_increment == 0 {
            return Err(TickpipeError::Config(
                "queue grow_increment must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            initial_capacity: Self::DEFAULT_SLOTS,
            grow_increment: Self::DEFAULT_SLOTS,
        }
    }
}

struct Inner<T> {
    buffer: RingBuffer<T>,
    state: QueueState,
    error: Option<UpstreamError>,
    total_count: Option<u64>,
    unsubscribe: Option<UnsubscribeHook>,
}

impl<T> Inner<T> {
    fn failure(&self) -> TickpipeError {
        self.error
            .clone()
            .unwrap_or_else(|| UpstreamError::new("operation failed"))
            .into()
    }
}

/// Single-producer, single-consumer queue bridging a callback-driven
/// producer to a blocking consumer.
///
/// The producer (usually the network thread) calls [`set_begin`],
/// [`set_result`], [`set_end`] and [`set_error`]; none of them ever fail.
/// The consumer pulls with [`begin`], [`next`] and [`end`], each bounded by
/// its own timeout, and cancels with [`close`]. Every producer call wakes
/// all waiters, and every waiter re-checks its own condition.
///
/// [`set_begin`]: Self::set_begin
/// [`set_result`]: Self::set_result
/// [`set_end`]: Self::set_end
/// [`set_error`]: Self::set_error
/// [`begin`]: Self::begin
/// [`next`]: Self::next
/// [`end`]: Self::end
/// [`close`]: Self::close
pub struct ResultQueue<T> {
    inner: Mutex<Inner<T>>,
    changed: Condvar,
}

impl<T> ResultQueue<T> {
    /// Creates a queue with the default buffer sizing.
    #[must_use]
    pub fn new() -> Self {
        Self::build(&QueueConfig::default(), None)
    }

    /// Creates a queue with custom buffer sizing.
    ///
    /// # Errors
    ///
    /// Returns [`TickpipeError::Config`] if a size is zero.
    pub fn with_config(config: &QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, None))
    }

    /// Creates a queue that calls `unsubscribe` the first time it is closed
    /// before reaching a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`TickpipeError::Config`] if a size is zero.
    pub fn with_unsubscribe(config: &QueueConfig, unsubscribe: UnsubscribeHook) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, Some(unsubscribe)))
    }

    fn build(config: &QueueConfig, unsubscribe: Option<UnsubscribeHook>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: RingBuffer::new(config.initial_capacity, config.grow_increment),
                state: QueueState::NotStarted,
                error: None,
                total_count: None,
                unsubscribe,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until the producer has started the stream.
    ///
    /// Returns the server-reported total, if any. A queue that completed
    /// without an explicit start also counts as started.
    ///
    /// # Errors
    ///
    /// Returns the stored [`UpstreamError`] if the producer failed, or
    /// [`TickpipeError::Timeout`] if nothing happened within `timeout`.
    pub fn begin(&self, timeout: Option<Duration>) -> Result<Option<u64>> {
        let (inner, outcome) = wait_while(&self.changed, self.lock(), timeout, |inner| {
            inner.state == QueueState::NotStarted
        });
        if outcome == WaitOutcome::TimedOut {
            return Err(timed_out(timeout));
        }

        match inner.state {
            QueueState::NotStarted => Err(timed_out(timeout)),
            QueueState::Failed => Err(inner.failure()),
            QueueState::Started | QueueState::Completed => Ok(inner.total_count),
        }
    }

    /// Pops the oldest buffered result.
    ///
    /// Buffered results are always delivered before a terminal state is
    /// reported. Returns `Ok(None)` once the queue has completed and is
    /// drained; this is repeatable and never an error.
    ///
    /// # Errors
    ///
    /// Returns the stored [`UpstreamError`] if the producer failed, or
    /// [`TickpipeError::Timeout`] if no result arrived within `timeout`.
    /// A timeout leaves the queue untouched.
    pub fn next(&self, timeout: Option<Duration>) -> Result<Option<T>> {
        let (mut inner, outcome) = wait_while(&self.changed, self.lock(), timeout, |inner| {
            inner.buffer.is_empty() && !inner.state.is_finished()
        });
        if outcome == WaitOutcome::TimedOut {
            return Err(timed_out(timeout));
        }

        if let Some(item) = inner.buffer.pop() {
            return Ok(Some(item));
        }
        match inner.state {
            QueueState::Failed => Err(inner.failure()),
            QueueState::Completed => Ok(None),
            QueueState::NotStarted | QueueState::Started => Err(timed_out(timeout)),
        }
    }

    /// Discards every unread result and waits for the terminal state.
    ///
    /// Results arriving while waiting are discarded as well.
    ///
    /// # Errors
    ///
    /// Returns the stored [`UpstreamError`] if the producer failed, or
    /// [`TickpipeError::Timeout`] if the queue did not finish in time.
    pub fn end(&self, timeout: Option<Duration>) -> Result<()> {
        let mut inner = self.lock();
        let discarded = inner.buffer.clear();
        if discarded > 0 {
            trace!(discarded, "fast-forwarding result queue");
        }

        let (mut inner, outcome) = wait_while(&self.changed, inner, timeout, |inner| {
            inner.buffer.clear();
            !inner.state.is_finished()
        });
        if outcome == WaitOutcome::TimedOut {
            return Err(timed_out(timeout));
        }
        inner.buffer.clear();

        match inner.state {
            QueueState::Failed => Err(inner.failure()),
            QueueState::Completed => Ok(()),
            QueueState::NotStarted | QueueState::Started => Err(timed_out(timeout)),
        }
    }

    /// Cancels the queue from the consumer side.
    ///
    /// If the queue has not finished yet it is marked completed and the
    /// unsubscribe hook runs once; a failing hook is logged and ignored.
    /// Buffered results are dropped and every blocked caller wakes up.
    /// Safe to call repeatedly and from any thread.
    pub fn close(&self) {
        let hook = {
            let mut inner = self.lock();
            let hook = inner.unsubscribe.take();
            let hook = if inner.state.is_finished() {
                None
            } else {
                inner.state = QueueState::Completed;
                hook
            };
            let discarded = inner.buffer.clear();
            debug!(discarded, state = %inner.state, "result queue closed");
            hook
        };
        self.changed.notify_all();

        if let Some(unsubscribe) = hook
            && let Err(e) = unsubscribe()
        {
            warn!(error = %e, "unsubscribe failed while closing result queue");
        }
    }

    /// Marks the stream as started, recording the server-reported total.
    ///
    /// No-op once the queue has finished.
    pub fn set_begin(&self, total_count: Option<u64>) {
        {
            let mut inner = self.lock();
            if inner.state.is_finished() {
                return;
            }
            inner.total_count = total_count;
            inner.state = QueueState::Started;
        }
        self.changed.notify_all();
    }

    /// Appends a result, growing the buffer if it is full.
    ///
    /// No-op once the queue has finished.
    pub fn set_result(&self, item: T) {
        {
            let mut inner = self.lock();
            if inner.state.is_finished() {
                return;
            }
            if inner.buffer.push(item) {
                trace!(
                    capacity = inner.buffer.capacity(),
                    "result queue buffer grown"
                );
            }
        }
        self.changed.notify_all();
    }

    /// Completes the stream.
    ///
    /// No-op once the queue has finished.
    pub fn set_end(&self) {
        {
            let mut inner = self.lock();
            if inner.state.is_finished() {
                return;
            }
            inner.state = QueueState::Completed;
            debug!(buffered = inner.buffer.len(), "result queue completed");
        }
        self.changed.notify_all();
    }

    /// Fails the stream with `error`, replayed to every consumer call once
    /// the results buffered before it are drained.
    ///
    /// No-op once the queue has finished, so a late error never replaces a
    /// clean completion.
    pub fn set_error(&self, error: UpstreamError) {
        {
            let mut inner = self.lock();
            if inner.state.is_finished() {
                return;
            }
            debug!(error = %error, buffered = inner.buffer.len(), "result queue failed");
            inner.error = Some(error);
            inner.state = QueueState::Failed;
        }
        self.changed.notify_all();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> QueueState {
        self.lock().state
    }

    /// Returns true once the queue is completed or failed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.lock().state.is_finished()
    }

    /// Number of buffered, unread results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Returns true if no results are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    /// Physical capacity of the circular buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().buffer.capacity()
    }

    /// Total announced by the producer in [`set_begin`](Self::set_begin).
    #[must_use]
    pub fn total_count(&self) -> Option<u64> {
        self.lock().total_count
    }

    /// Iterates over results, waiting up to `timeout` for each one.
    ///
    /// The iterator ends at end-of-data. A producer failure is yielded once
    /// and ends iteration; a timeout is yielded without ending it.
    pub const fn iter(&self, timeout: Option<Duration>) -> ResultIter<'_, T> {
        ResultIter {
            queue: self,
            timeout,
            done: false,
        }
    }
}

impl<T> Default for ResultQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ResultQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ResultQueue")
            .field("state", &inner.state)
            .field("len", &inner.buffer.len())
            .field("capacity", &inner.buffer.capacity())
            .field("total_count", &inner.total_count)
            .finish_non_exhaustive()
    }
}

fn timed_out(timeout: Option<Duration>) -> TickpipeError {
    TickpipeError::Timeout(timeout.unwrap_or_default())
}

/// Iterator returned by [`ResultQueue::iter`].
#[derive(Debug)]
pub struct ResultIter<'a, T> {
    queue: &'a ResultQueue<T>,
    timeout: Option<Duration>,
    done: bool,
}

impl<T> Iterator for ResultIter<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.queue.next(self.timeout) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = !e.is_timeout();
                Some(Err(e))
            }
        }
    }
}
