//! Queue wrapper that records its history for property checking.
//!
//! Each operation carries the linearization stamp assigned inside the
//! queue's critical section, so the recorded history sorts into exactly
//! the order the queue applied. Records are appended after the queue lock
//! is released: check properties only when the queue is quiescent.

use bq_core::invariants::{QueueHistory, QueueProperties};

use crate::error::{EnqueueError, QueueError};
use crate::queue::{BoundedQueue, Wait};
use crate::strategy::{Conditions, WaitStrategy};
use crate::sync::{self, Arc, Mutex};

#[derive(Default)]
struct Tracker {
    /// (stamp, item)
    enqueued: Vec<(u64, u64)>,
    dequeued: Vec<(u64, u64)>,
    history: QueueHistory,
}

impl Tracker {
    fn sorted_items(records: &[(u64, u64)]) -> Vec<u64> {
        let mut records = records.to_vec();
        records.sort_unstable_by_key(|&(stamp, _)| stamp);
        records.into_iter().map(|(_, item)| item).collect()
    }
}

/// A `u64` queue that tracks every enqueue and dequeue.
///
/// Clones share the queue and the tracker.
pub struct TrackedQueue<S: WaitStrategy = Conditions> {
    queue: BoundedQueue<u64, S>,
    tracker: Arc<Mutex<Tracker>>,
}

impl<S: WaitStrategy> TrackedQueue<S> {
    /// # Errors
    ///
    /// `InvalidArgument` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        Ok(Self {
            queue: BoundedQueue::new(capacity)?,
            tracker: Arc::new(Mutex::new(Tracker::default())),
        })
    }

    /// The underlying queue. Operations made through it are not tracked.
    #[must_use]
    pub fn queue(&self) -> &BoundedQueue<u64, S> {
        &self.queue
    }

    /// Blocking enqueue on behalf of `thread_id`.
    ///
    /// # Errors
    ///
    /// As [`BoundedQueue::enqueue`].
    pub fn enqueue(&self, thread_id: u64, item: u64) -> Result<(), EnqueueError<u64>> {
        self.record_enqueue(thread_id, item, Wait::Forever)
    }

    /// Blocking dequeue on behalf of `thread_id`.
    ///
    /// # Errors
    ///
    /// As [`BoundedQueue::dequeue`].
    pub fn dequeue(&self, thread_id: u64) -> Result<u64, QueueError> {
        self.record_dequeue(thread_id, Wait::Forever)
    }

    /// # Errors
    ///
    /// As [`BoundedQueue::try_enqueue`].
    pub fn try_enqueue(&self, thread_id: u64, item: u64) -> Result<(), EnqueueError<u64>> {
        self.record_enqueue(thread_id, item, Wait::Never)
    }

    /// Non-blocking dequeue. An empty observation is recorded too.
    ///
    /// # Errors
    ///
    /// As [`BoundedQueue::try_dequeue`].
    pub fn try_dequeue(&self, thread_id: u64) -> Result<u64, QueueError> {
        self.record_dequeue(thread_id, Wait::Never)
    }

    pub fn close(&self) -> bool {
        self.queue.close()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn record_enqueue(
        &self,
        thread_id: u64,
        item: u64,
        wait: Wait<'_>,
    ) -> Result<(), EnqueueError<u64>> {
        let stamp = self.queue.enqueue_with(item, wait)?;
        let mut tracker = sync::lock(&self.tracker);
        tracker.enqueued.push((stamp, item));
        tracker.history.record_enqueue(thread_id, item, stamp);
        Ok(())
    }

    fn record_dequeue(&self, thread_id: u64, wait: Wait<'_>) -> Result<u64, QueueError> {
        let (stamp, result) = self.queue.dequeue_with(wait);
        let mut tracker = sync::lock(&self.tracker);
        match result {
            Ok(item) => {
                tracker.dequeued.push((stamp, item));
                tracker.history.record_dequeue(thread_id, Some(item), stamp);
            }
            Err(QueueError::Empty) => tracker.history.record_dequeue(thread_id, None, stamp),
            Err(_) => {}
        }
        result
    }
}

impl<S: WaitStrategy> Clone for TrackedQueue<S> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            tracker: Arc::clone(&self.tracker),
        }
    }
}

impl<S: WaitStrategy> QueueProperties for TrackedQueue<S> {
    fn enqueued_items(&self) -> Vec<u64> {
        Tracker::sorted_items(&sync::lock(&self.tracker).enqueued)
    }

    fn dequeued_items(&self) -> Vec<u64> {
        Tracker::sorted_items(&sync::lock(&self.tracker).dequeued)
    }

    fn current_contents(&self) -> Vec<u64> {
        self.queue.snapshot().collect()
    }

    fn capacity(&self) -> u64 {
        self.queue.capacity() as u64
    }

    fn history(&self) -> QueueHistory {
        sync::lock(&self.tracker).history.clone()
    }
}
