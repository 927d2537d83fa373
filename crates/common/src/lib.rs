//! Types shared by the ClarityNow API and worker processes: task names and
//! arguments, job records with their result envelope, and the task queue.

pub mod error;
pub mod job;
pub mod queue;
pub mod task;

pub use error::{Error, Result};
pub use job::{Job, JobStatus, TaskEnvelope};
pub use queue::{MemoryQueue, RedisQueue, TaskQueue};
pub use task::{Task, TaskCall};

/// Component tag carried by every appliance this service manages.
pub const COMPONENT: &str = "ClarityNow";
