//! Cancellation of blocked queue calls.
//!
//! A [`CancelToken`] is handed to `enqueue_cancellable` /
//! `dequeue_cancellable`. While such a call sleeps it registers a wake
//! hook on the token; [`CancelToken::cancel`] sets the flag and then runs
//! every registered hook. A hook takes the queue lock before notifying, so
//! the waiter is either already asleep (and gets the notification) or has
//! not yet checked the flag (and sees it set).

use std::fmt;
use std::sync::Arc;

use crate::sync::{self, AtomicBool, Mutex, Ordering};

/// Wakes the waiters of one queue condition.
///
/// Held in a std `Arc` even under loom, which cannot coerce its own `Arc`
/// to a trait object.
pub(crate) trait WakeHook: Send + Sync {
    fn wake(&self);
}

struct Hooks {
    next_id: u64,
    entries: Vec<(u64, Arc<dyn WakeHook>)>,
}

struct TokenInner {
    cancelled: AtomicBool,
    hooks: Mutex<Hooks>,
}

/// Cloneable handle used to interrupt blocked queue calls.
///
/// Cancellation is sticky: once cancelled, every cancellable call that
/// would have to wait fails with `QueueError::Interrupted`. Calls that can
/// complete without waiting still complete.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                hooks: Mutex::new(Hooks {
                    next_id: 0,
                    entries: Vec::new(),
                }),
            }),
        }
    }

    /// Cancel every current and future wait on this token.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        // Run hooks outside the token lock; a hook takes a queue lock.
        let hooks: Vec<Arc<dyn WakeHook>> = sync::lock(&self.inner.hooks)
            .entries
            .iter()
            .map(|(_, hook)| Arc::clone(hook))
            .collect();
        tracing::debug!(waiters = hooks.len(), "cancel token fired");
        for hook in hooks {
            hook.wake();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Register `hook` for the lifetime of the returned guard.
    pub(crate) fn register(&self, hook: Arc<dyn WakeHook>) -> Registration<'_> {
        let mut hooks = sync::lock(&self.inner.hooks);
        let id = hooks.next_id;
        hooks.next_id += 1;
        hooks.entries.push((id, hook));
        Registration { token: self, id }
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        sync::lock(&self.inner.hooks).entries.len()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Removes its hook from the token when dropped.
pub(crate) struct Registration<'t> {
    token: &'t CancelToken,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        sync::lock(&self.token.inner.hooks)
            .entries
            .retain(|(id, _)| *id != self.id);
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter(AtomicUsize);

    impl WakeHook for Counter {
        fn wake(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_cancel_runs_registered_hooks_once() {
        let token = CancelToken::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let _registration = token.register(counter.clone());

        assert!(!token.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_drop_unregisters() {
        let token = CancelToken::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        {
            let _registration = token.register(counter.clone());
            assert_eq!(token.registered(), 1);
        }
        assert_eq!(token.registered(), 0);
        token.cancel();
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(format!("{:?}", token), "CancelToken { cancelled: true }");
    }
}
