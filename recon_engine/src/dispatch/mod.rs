//! Background execution of reconciliation work.
//!
//! [`queue`] provides a bounded job queue that runs a limited number of jobs at a time. [`refunds`] uses it to
//! reconcile refunds without making the caller wait.
pub mod queue;
pub mod refunds;

pub use queue::{Handler, JobProducer, JobQueue, QueueError};
pub use refunds::RefundDispatcher;
