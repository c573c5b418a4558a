//! # Tenant Controller
//!
//! Boundary with the resource-watch mechanism. The controller registers the
//! application's project watcher in the resource store, turns project add and
//! update callbacks into [`ProjectEvent`]s for the job manager, and removes the
//! project watcher again on stop.
//!
//! Add and update are handled identically: the deleted flag on the project
//! decides between initialize and cleanup.

use crate::error::{ControllerError, StoreError};
use crate::jobs::LifecycleClient;
use crate::model::{Project, ProjectEvent};
use crate::watcher::APP_NAME;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Controller-wide project watcher registration in the resource store.
#[async_trait]
pub trait ProjectWatcherRegistry: Send + Sync {
    async fn add_project_watcher(&self, app_name: &str) -> Result<(), StoreError>;

    async fn delete_project_watcher(&self, app_name: &str) -> Result<(), StoreError>;
}

pub struct TenantController {
    registry: Arc<dyn ProjectWatcherRegistry>,
    lifecycle: LifecycleClient,
    watcher_timeout: Duration,
    app_name: String,
}

impl TenantController {
    pub fn new(
        registry: Arc<dyn ProjectWatcherRegistry>,
        lifecycle: LifecycleClient,
        watcher_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            watcher_timeout,
            app_name: APP_NAME.to_string(),
        }
    }

    /// Registers the project watcher. Failing here is fatal for startup.
    pub async fn start(&self) -> Result<(), ControllerError> {
        self.add_project_watcher().await?;
        info!(app_name = %self.app_name, "Tenant controller starting");
        Ok(())
    }

    #[instrument(skip_all, fields(tenant_id = %project.uid))]
    pub async fn on_project_added(&self, project: Project) -> Result<(), ControllerError> {
        info!("Project added");
        self.lifecycle.submit(ProjectEvent::from_project(project)).await
    }

    #[instrument(skip_all, fields(tenant_id = %project.uid))]
    pub async fn on_project_updated(&self, project: Project) -> Result<(), ControllerError> {
        info!("Project updated");
        self.lifecycle.submit(ProjectEvent::from_project(project)).await
    }

    /// Re-registers the project watcher after it was deleted out of band.
    pub async fn on_project_watcher_deleted(&self) {
        if let Err(e) = self.add_project_watcher().await {
            error!(error = %e, "Failed to recreate project watcher");
        }
    }

    pub async fn stop(&self) -> Result<(), ControllerError> {
        info!(app_name = %self.app_name, "Tenant controller stopping");
        match self
            .with_timeout(self.registry.delete_project_watcher(&self.app_name))
            .await?
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_absent() => {
                info!("Project watcher already deleted");
                Ok(())
            }
            Err(e) => Err(ControllerError::Unregister(e)),
        }
    }

    async fn add_project_watcher(&self) -> Result<(), ControllerError> {
        match self
            .with_timeout(self.registry.add_project_watcher(&self.app_name))
            .await?
        {
            Ok(()) => Ok(()),
            Err(StoreError::AlreadyExists) => {
                info!("Project watcher already exists");
                Ok(())
            }
            Err(e) => Err(ControllerError::Register(e)),
        }
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = T>) -> Result<T, ControllerError> {
        tokio::time::timeout(self.watcher_timeout, fut)
            .await
            .map_err(|_| ControllerError::Timeout(self.watcher_timeout))
    }
}
