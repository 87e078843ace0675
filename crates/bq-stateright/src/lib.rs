//! # bq-stateright
//!
//! Exhaustive model checking of the bounded queue's wait/notify protocol.
//!
//! The model abstracts the queue to one lock-protected step per attempt
//! and checks the three signalings side by side: two condition variables
//! and single-set broadcast never deadlock, while a single wait set with
//! wake-one does.
//!
//! ```ignore
//! use bq_stateright::{ModelConfig, Signaling, check};
//!
//! let report = check(ModelConfig::lost_wakeup(Signaling::SingleWaitSetNotifyOne));
//! let deadlock = report.property("no deadlock").unwrap();
//! println!("{}", deadlock.counterexample.as_ref().unwrap().render_diagram());
//! ```

pub mod model;
pub mod verify;

pub use model::{
    ModelConfig, QueueAction, QueueModel, QueueState, Role, Signaling, ThreadId, ThreadState,
    ThreadStatus, WaitSet,
};
pub use verify::{ALWAYS, ModelReport, SOMETIMES, check, replay};
