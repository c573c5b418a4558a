//! # Tenant Lifecycle Jobs
//!
//! Bottom-up:
//!
//! - [`backoff`]: retry a tenant action with capped exponential backoff.
//! - [`fan_out`]: run backend actions concurrently, first error cancels the rest.
//! - [`job`]: per-project state machine for initialize/cleanup.
//! - [`manager`]: the single task that owns the job table.
//!
//! Cancellation is a token tree: manager token, then one child per job, then one
//! child per fan-out. Each attempt's fan-out is also bounded by `job.timeout`.

pub mod backoff;
pub mod fan_out;
pub mod job;
pub mod manager;

pub use backoff::{retry_with_backoff, Backoff, RetryOutcome};
pub use fan_out::{fan_out, BoxedAction};
pub use job::{Job, JobContext, JobStatus};
pub use manager::{JobManager, LifecycleClient, ManagerRequest};
