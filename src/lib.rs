//! # Observability Tenant Controller
//!
//! > **Keeps one observability tenant per project, everywhere.**
//!
//! Projects live in a control-plane resource store. When one appears, this crate
//! provisions a tenant for it in every downstream backend (alerting monitor, SRE
//! exporter); when one is marked deleted, it tears the tenant down again,
//! including the logs and metrics stored for it. Meanwhile the current state of
//! every project is streamed to subscribed observers.
//!
//! ## 🏗️ Design
//!
//! ### One job per project
//! Every lifecycle event becomes a [`Job`](jobs::Job) owned by the single
//! [`JobManager`](jobs::JobManager) task. A newer event for the same project
//! cancels the running job and starts a fresh one; the cancelled job is not
//! awaited. That is safe because every backend call is idempotent: "already
//! exists" on create and "not found" on delete count as success.
//!
//! ### Retry until done
//! An attempt reports progress to the project's watcher resource, fans out to
//! all backends concurrently and reports the outcome. A failed attempt is
//! retried with capped exponential backoff until it succeeds, the job is
//! cancelled, or the watcher turns out to belong to a recreated project
//! (identity mismatch), which ends the job without touching the newer project.
//!
//! ### Cancellation tree
//! Manager token, then one child token per job, then one per fan-out, with each
//! fan-out bounded by the configured job timeout. Cancelling a parent wakes
//! every sleep and aborts every in-flight backend call below it.
//!
//! ## 🗺️ Module Tour
//!
//! - [`model`]: projects, tenant IDs, actions and the streamed snapshot shapes.
//! - [`watcher`]: progress reporting and the identity fence.
//! - [`backends`]: alerting/SRE services and the Loki/Mimir HTTP cleanup.
//! - [`jobs`]: backoff, fan-out, the job state machine and the manager.
//! - [`projects`]: the snapshot and its coalescing broadcaster.
//! - [`controller`]: the resource-watch boundary.
//! - [`runtime`]: [`TenantSystem`](runtime::TenantSystem) and tracing setup.
//! - [`config`] / [`error`]: YAML configuration and error types.
//! - [`mock`]: in-memory collaborators for tests and the demo.
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Run the in-memory demo
//! RUST_LOG=info cargo run -- --config tests/testdata/config.yaml
//!
//! # Run the tests
//! cargo test
//! ```

pub mod backends;
pub mod config;
pub mod controller;
pub mod error;
pub mod jobs;
pub mod mock;
pub mod model;
pub mod projects;
pub mod runtime;
pub mod watcher;
