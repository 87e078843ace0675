//! Point-in-time view of a queue's contents.

use std::iter::FusedIterator;
use std::vec;

/// Items of a queue at one instant, oldest first.
///
/// Produced by [`crate::BoundedQueue::snapshot`]. The copy is taken under
/// the queue lock; iterating it never touches the queue again, so it
/// neither blocks nor observes later producers and consumers. It is
/// consumed as it is iterated and cannot be restarted.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    items: vec::IntoIter<T>,
}

impl<T> Snapshot<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into_iter(),
        }
    }
}

impl<T> Iterator for Snapshot<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl<T> ExactSizeIterator for Snapshot<T> {}

impl<T> FusedIterator for Snapshot<T> {}
