//! Runtime orchestration.
//!
//! - [`TenantSystem`] wires the broadcaster, the job manager and the controller
//!   and shuts them down in order.
//! - [`setup_tracing`] initializes logging.

pub mod system;
pub mod tracing;

pub use self::system::*;
pub use self::tracing::*;
