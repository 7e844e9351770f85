//! Bounded Measurement Channel
//!
//! A mutex-and-condvar MPSC ring shared by all sensor workers and their
//! consumers. Producers never block on a full queue; the oldest pending
//! item is displaced instead.

mod queue;

pub use queue::{GlobalQueue, QueueError};
