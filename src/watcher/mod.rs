//! # Watcher Reconciler
//!
//! A watcher is a small status resource hanging off a project in the resource
//! store, one per application. Jobs use it to publish progress
//! (`InProgress` while working, `Idle` once a tenant is created) and to fence
//! themselves: before touching an existing watcher the job checks that the
//! watcher's parent project still carries the job's tenant ID. If the project was
//! deleted and recreated under the same name, the parent has a new UID and the
//! stale job must leave the watcher alone.
//!
//! "Already exists" and "not found" answers from the store are normal outcomes
//! here, never failures.

use crate::error::{StoreError, TenantError};
use crate::model::{Project, ProjectId, TenantId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Application name used for watcher resources.
pub const APP_NAME: &str = "observability-tenant-controller";

/// Progress shown on a watcher: working, or settled with a tenant in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherStatus {
    InProgress,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watcher {
    pub name: String,
    pub status: WatcherStatus,
    pub message: String,
    /// Unix seconds of the last change.
    pub timestamp: u64,
}

/// Access to watcher resources in the resource store.
///
/// Watchers are addressed by the owning project's resource name, not its UID:
/// that is exactly why a recreated project can inherit a stale job's watcher slot.
#[async_trait]
pub trait WatcherStore: Send + Sync {
    async fn get(&self, project: &str, name: &str) -> Result<Watcher, StoreError>;

    async fn create(&self, project: &str, watcher: Watcher) -> Result<(), StoreError>;

    async fn update(&self, project: &str, watcher: Watcher) -> Result<(), StoreError>;

    async fn delete(&self, project: &str, name: &str) -> Result<(), StoreError>;

    /// UID of the project currently owning the watcher, if any.
    async fn parent(&self, project: &str, name: &str) -> Result<Option<ProjectId>, StoreError>;
}

/// Publishes job progress to the store and fences stale jobs.
#[derive(Clone)]
pub struct WatcherReconciler {
    store: Arc<dyn WatcherStore>,
    app_name: String,
}

impl WatcherReconciler {
    pub fn new(store: Arc<dyn WatcherStore>) -> Self {
        Self {
            store,
            app_name: APP_NAME.to_string(),
        }
    }

    /// Creates the watcher or, if it belongs to this tenant, updates it.
    ///
    /// A watcher owned by another generation of the project is left untouched and
    /// the call succeeds.
    pub async fn report_progress(
        &self,
        project: &Project,
        tenant: &TenantId,
        status: WatcherStatus,
        message: impl Into<String>,
    ) -> Result<(), TenantError> {
        let message = message.into();
        let existing = match self.store.get(&project.name, &self.app_name).await {
            Ok(watcher) => watcher,
            Err(e) if e.is_absent() => return self.create(project, tenant, status, message).await,
            Err(source) => {
                return Err(TenantError::Store {
                    tenant: tenant.clone(),
                    source,
                })
            }
        };

        match self.verify_identity(project, tenant).await {
            Ok(()) => {}
            Err(e) if e.is_identity_mismatch() => {
                info!(tenant_id = %tenant, "Skipped updating watcher - actual and job's project IDs do not match");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        debug!(tenant_id = %tenant, ?status, "Updating watcher");
        let updated = Watcher {
            status,
            message,
            timestamp: unix_now(),
            ..existing
        };
        self.store
            .update(&project.name, updated)
            .await
            .map_err(|source| TenantError::Store {
                tenant: tenant.clone(),
                source,
            })
    }

    /// Checks that the watcher's parent project is still `tenant`.
    ///
    /// Returns [`TenantError::IdentityMismatch`] when the parent is gone or has a
    /// different UID.
    pub async fn verify_identity(&self, project: &Project, tenant: &TenantId) -> Result<(), TenantError> {
        let parent = match self.store.parent(&project.name, &self.app_name).await {
            Ok(parent) => parent,
            Err(e) if e.is_absent() => None,
            Err(source) => {
                return Err(TenantError::Store {
                    tenant: tenant.clone(),
                    source,
                })
            }
        };

        match parent {
            Some(uid) if tenant.matches(&uid) => Ok(()),
            _ => Err(TenantError::IdentityMismatch(tenant.clone())),
        }
    }

    /// Deletes the watcher if it still belongs to `tenant`.
    ///
    /// Returns [`TenantError::IdentityMismatch`] when it belongs to another project,
    /// which the job treats as a finished cleanup.
    pub async fn delete(&self, project: &Project, tenant: &TenantId) -> Result<(), TenantError> {
        match self.store.get(&project.name, &self.app_name).await {
            Ok(_) => {}
            Err(e) if e.is_absent() => {
                info!(tenant_id = %tenant, "Watcher already deleted");
                return Ok(());
            }
            Err(source) => {
                return Err(TenantError::Store {
                    tenant: tenant.clone(),
                    source,
                })
            }
        }

        self.verify_identity(project, tenant).await?;

        debug!(tenant_id = %tenant, "Deleting watcher");
        match self.store.delete(&project.name, &self.app_name).await {
            Ok(()) => info!(tenant_id = %tenant, "Watcher deleted"),
            Err(e) if e.is_absent() => info!(tenant_id = %tenant, "Watcher already deleted"),
            Err(source) => {
                return Err(TenantError::Store {
                    tenant: tenant.clone(),
                    source,
                })
            }
        }
        Ok(())
    }

    async fn create(
        &self,
        project: &Project,
        tenant: &TenantId,
        status: WatcherStatus,
        message: String,
    ) -> Result<(), TenantError> {
        debug!(tenant_id = %tenant, ?status, "Creating watcher");
        let watcher = Watcher {
            name: self.app_name.clone(),
            status,
            message,
            timestamp: unix_now(),
        };
        match self.store.create(&project.name, watcher).await {
            Ok(()) => {
                info!(tenant_id = %tenant, "Watcher created");
                Ok(())
            }
            // Lost a race with another writer; the next report goes through the update path.
            Err(StoreError::AlreadyExists) => Ok(()),
            Err(source) => Err(TenantError::Store {
                tenant: tenant.clone(),
                source,
            }),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::InMemoryWatcherStore;

    fn project() -> Project {
        Project::new("uid-1", "project-a", "Project A", "org")
    }

    fn setup() -> (Arc<InMemoryWatcherStore>, WatcherReconciler) {
        let store = Arc::new(InMemoryWatcherStore::new());
        store.put_project("project-a", ProjectId::new("uid-1"));
        let reconciler = WatcherReconciler::new(store.clone());
        (store, reconciler)
    }

    #[tokio::test]
    async fn creates_watcher_when_missing() {
        let (store, reconciler) = setup();
        let p = project();

        reconciler
            .report_progress(&p, &p.tenant(), WatcherStatus::InProgress, "Creating tenant")
            .await
            .unwrap();

        let watcher = store.watcher("project-a", APP_NAME).unwrap();
        assert_eq!(watcher.status, WatcherStatus::InProgress);
        assert_eq!(watcher.message, "Creating tenant");
    }

    #[tokio::test]
    async fn updates_watcher_owned_by_same_project() {
        let (store, reconciler) = setup();
        let p = project();
        reconciler
            .report_progress(&p, &p.tenant(), WatcherStatus::InProgress, "working")
            .await
            .unwrap();

        reconciler
            .report_progress(&p, &p.tenant(), WatcherStatus::Idle, "done")
            .await
            .unwrap();

        let watcher = store.watcher("project-a", APP_NAME).unwrap();
        assert_eq!(watcher.status, WatcherStatus::Idle);
        assert_eq!(watcher.message, "done");
    }

    #[tokio::test]
    async fn leaves_watcher_of_recreated_project_untouched() {
        let (store, reconciler) = setup();
        let stale = project();
        reconciler
            .report_progress(&stale, &stale.tenant(), WatcherStatus::InProgress, "old")
            .await
            .unwrap();

        // Same resource name, new identity.
        store.put_project("project-a", ProjectId::new("uid-2"));

        reconciler
            .report_progress(&stale, &stale.tenant(), WatcherStatus::Idle, "stale write")
            .await
            .unwrap();
        assert_eq!(store.watcher("project-a", APP_NAME).unwrap().message, "old");

        let err = reconciler.delete(&stale, &stale.tenant()).await.unwrap_err();
        assert!(err.is_identity_mismatch());
        assert!(store.watcher("project-a", APP_NAME).is_some());
    }

    #[tokio::test]
    async fn missing_parent_is_a_mismatch() {
        let (store, reconciler) = setup();
        let p = project();
        reconciler
            .report_progress(&p, &p.tenant(), WatcherStatus::InProgress, "x")
            .await
            .unwrap();
        store.remove_project("project-a");

        let err = reconciler.verify_identity(&p, &p.tenant()).await.unwrap_err();
        assert!(err.is_identity_mismatch());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (store, reconciler) = setup();
        let p = project();
        reconciler
            .report_progress(&p, &p.tenant(), WatcherStatus::InProgress, "x")
            .await
            .unwrap();

        reconciler.delete(&p, &p.tenant()).await.unwrap();
        assert!(store.watcher("project-a", APP_NAME).is_none());
        reconciler.delete(&p, &p.tenant()).await.unwrap();
    }

    #[tokio::test]
    async fn store_outage_is_a_retryable_error() {
        let (store, reconciler) = setup();
        let p = project();
        store.fail_next(StoreError::Unavailable("etcd down".into()));

        let err = reconciler
            .report_progress(&p, &p.tenant(), WatcherStatus::InProgress, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::Store { .. }));
    }
}
