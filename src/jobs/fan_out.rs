//! # Fan-Out Executor
//!
//! Runs independent backend actions concurrently under one cancellation group.
//! The first failure cancels the group; the call still waits for every action
//! to return before reporting that first error, so nothing is left running.

use crate::error::TenantError;
use std::future::Future;
use std::pin::Pin;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A backend action ready to be spawned.
pub type BoxedAction = Pin<Box<dyn Future<Output = Result<(), TenantError>> + Send + 'static>>;

/// Boxes `fut` as a [`BoxedAction`].
pub fn boxed<F>(fut: F) -> BoxedAction
where
    F: Future<Output = Result<(), TenantError>> + Send + 'static,
{
    Box::pin(fut)
}

/// Runs `actions` concurrently and returns the first error, if any.
///
/// Cancelling `token` cancels every action still running. Dropping the returned
/// future aborts them.
pub async fn fan_out(token: &CancellationToken, actions: Vec<BoxedAction>) -> Result<(), TenantError> {
    let group = token.child_token();
    let mut set = JoinSet::new();

    for action in actions {
        let group = group.clone();
        set.spawn(async move {
            tokio::select! {
                _ = group.cancelled() => Err(TenantError::Cancelled),
                result = action => result,
            }
        });
    }

    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        let result = joined.unwrap_or_else(|e| Err(TenantError::TaskFailed(e.to_string())));
        if let Err(e) = result {
            if first_error.is_none() {
                debug!(error = %e, "Fan-out action failed, cancelling siblings");
                group.cancel();
                first_error = Some(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
