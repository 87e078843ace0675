//! # bq-queue
//!
//! Bounded, thread-safe blocking FIFO queue.
//!
//! - `queue`: [`BoundedQueue`] over a fixed ring buffer, one lock, two
//!   pluggable wait strategies
//! - `strategy`: [`Conditions`] (two condition variables, wake-one) and
//!   [`Monitor`] (one wait set, wake-all)
//! - `cancel`: [`CancelToken`] for interrupting blocked calls
//! - `tracked`: [`TrackedQueue`], a `u64` queue recording its history for
//!   the `bq-core` property checker
//! - `kani_proofs`: bounded proofs of the ring arithmetic (under `#[cfg(kani)]`)
//!
//! Loom tests for the blocking protocol run with
//! `RUSTFLAGS="--cfg loom" cargo test -p bq-queue --release`.

mod cancel;
mod error;
pub mod kani_proofs;
mod queue;
mod ring;
mod snapshot;
mod strategy;
mod sync;
mod tracked;

pub use cancel::CancelToken;
pub use error::{EnqueueError, QueueError};
pub use queue::{BoundedQueue, ConditionQueue, MonitorQueue};
pub use snapshot::Snapshot;
pub use strategy::{Conditions, Monitor, Signal, WaitStrategy};
pub use tracked::TrackedQueue;
