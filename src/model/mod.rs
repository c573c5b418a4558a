//! Pure data structures shared by the controller, the job manager and the broadcaster.

pub mod project;

pub use project::*;
