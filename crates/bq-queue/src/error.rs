//! Error types for queue operations.

use std::fmt;

use thiserror::Error;

/// Why a queue operation did not complete.
///
/// Internal invariant violations are not represented here: they panic,
/// since they can only come from a synchronization bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Rejected before touching any state (e.g. zero capacity).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// A blocking call was cancelled through its `CancelToken`.
    #[error("operation interrupted while waiting")]
    Interrupted,
    /// A bounded wait expired before the queue changed.
    #[error("timed out waiting on the queue")]
    Timeout,
    /// Non-blocking enqueue on a full queue.
    #[error("queue is full")]
    Full,
    /// Non-blocking dequeue on an empty queue.
    #[error("queue is empty")]
    Empty,
    /// Enqueue on a closed queue.
    #[error("queue is closed")]
    Closed,
    /// Dequeue on a closed queue that has been drained.
    #[error("no such element: queue is closed and empty")]
    NoSuchElement,
}

/// A failed enqueue. Ownership of the item goes back to the caller.
#[derive(Error)]
#[error("enqueue failed: {reason}")]
pub struct EnqueueError<T> {
    item: T,
    #[source]
    reason: QueueError,
}

impl<T> EnqueueError<T> {
    pub(crate) fn new(item: T, reason: QueueError) -> Self {
        Self { item, reason }
    }

    /// Why the enqueue failed.
    #[must_use]
    pub fn reason(&self) -> QueueError {
        self.reason
    }

    /// Take back the item that was not enqueued.
    #[must_use]
    pub fn into_item(self) -> T {
        self.item
    }

    /// Split into the item and the reason.
    #[must_use]
    pub fn into_parts(self) -> (T, QueueError) {
        (self.item, self.reason)
    }
}

impl<T> fmt::Debug for EnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnqueueError")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<T> PartialEq<QueueError> for EnqueueError<T> {
    fn eq(&self, other: &QueueError) -> bool {
        self.reason == *other
    }
}

impl<T> From<EnqueueError<T>> for QueueError {
    fn from(err: EnqueueError<T>) -> Self {
        err.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_enqueue_error_returns_item() {
        let err = EnqueueError::new(String::from("payload"), QueueError::Full);
        assert_eq!(err, QueueError::Full);
        assert_eq!(err.to_string(), "enqueue failed: queue is full");
        assert!(err.source().is_some());
        assert_eq!(err.into_item(), "payload");
    }

    #[test]
    fn test_debug_does_not_need_item_debug() {
        struct Opaque;
        let err = EnqueueError::new(Opaque, QueueError::Closed);
        assert_eq!(format!("{:?}", err), "EnqueueError { reason: Closed, .. }");
        let reason: QueueError = err.into();
        assert_eq!(reason, QueueError::Closed);
    }
}
