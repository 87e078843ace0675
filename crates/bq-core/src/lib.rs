//! # bq-core
//!
//! Core types and invariants for the verified bounded blocking queue.
//!
//! This crate provides:
//! - `PropertyResult` and `PropertyChecker` for verifying invariants
//! - `Counterexample` for rendering failure paths
//! - Invariant traits for the queue (`QueueProperties`)
//!
//! Implementations live in `bq-queue`; the DST harness and the stateright
//! model reuse the same property names so a failure reads the same no
//! matter which level caught it.

pub mod counterexample;
pub mod invariants;
pub mod property;

pub use counterexample::{Counterexample, StateSnapshot, SyncIssue, ThreadAction};
pub use invariants::{QueueHistory, QueueOpType, QueueOperation, QueueProperties, QueuePropertyChecker};
pub use property::{PropertyChecker, PropertyResult};
