//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter filtered
//! by `RUST_LOG` (default `info`). Module paths are hidden; every line carries
//! structured fields instead, with jobs running inside a `job` span:
//!
//! ```text
//! INFO job{tenant_id=uid-1 action=InitializeTenant}: Creating tenant backend="alerting monitor"
//! INFO job{tenant_id=uid-1 action=InitializeTenant}: Action completed successfully
//! INFO Removing finished job tenant_id=uid-2 status=TenantDeleted
//! ```
//!
//! ```bash
//! RUST_LOG=debug cargo run -- --config config.yaml
//! RUST_LOG=tenant_controller::jobs=debug cargo run
//! ```

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// Calling it twice is harmless; the second subscriber is ignored.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
