use crate::backends::{TenantBackends, TenantHttp, TenantService};
use crate::config::Config;
use crate::controller::{ProjectWatcherRegistry, TenantController};
use crate::error::ControllerError;
use crate::jobs::{JobContext, JobManager, LifecycleClient};
use crate::projects::ProjectUpdates;
use crate::watcher::{WatcherReconciler, WatcherStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// External collaborators the system is wired against.
#[derive(Clone)]
pub struct Collaborators {
    pub watcher_store: Arc<dyn WatcherStore>,
    pub registry: Arc<dyn ProjectWatcherRegistry>,
    pub alerting: Arc<dyn TenantService>,
    pub sre: Arc<dyn TenantService>,
    pub http: Arc<dyn TenantHttp>,
}

/// The running tenant controller: broadcaster, job manager and controller.
///
/// # Example
///
/// ```ignore
/// let system = TenantSystem::start(config, collaborators).await?;
///
/// system.controller.on_project_added(project).await?;
/// let jobs = system.lifecycle.jobs().await?;
///
/// system.shutdown().await?;
/// ```
pub struct TenantSystem {
    pub controller: TenantController,
    pub lifecycle: LifecycleClient,
    pub updates: Arc<ProjectUpdates>,
    token: CancellationToken,
    manager: tokio::task::JoinHandle<()>,
}

impl TenantSystem {
    /// Wires everything from `config` and registers the project watcher.
    ///
    /// The SRE exporter only takes part in jobs when `job.sre.enabled` is set.
    pub async fn start(config: Config, collaborators: Collaborators) -> Result<Self, ControllerError> {
        let Collaborators {
            watcher_store,
            registry,
            alerting,
            sre,
            http,
        } = collaborators;

        let sre = config.job.sre.enabled.then_some(sre);
        let context = Arc::new(JobContext {
            backends: TenantBackends::new(&config.endpoints, http, alerting, sre),
            watcher: WatcherReconciler::new(watcher_store),
            config: config.job.clone(),
        });

        let updates = Arc::new(ProjectUpdates::new());
        let token = CancellationToken::new();
        let (manager, lifecycle) = JobManager::new(
            config.controller.channel.max_inflight_requests,
            context,
            updates.clone(),
            config.job.manager.deletion.rate,
            token.clone(),
        );

        let controller = TenantController::new(
            registry,
            lifecycle.clone(),
            config.controller.create_delete_watcher_timeout,
        );
        controller.start().await?;

        let manager = tokio::spawn(manager.run());
        info!("Tenant system started");

        Ok(Self {
            controller,
            lifecycle,
            updates,
            token,
            manager,
        })
    }

    /// Cancels every running job and stops the manager.
    ///
    /// The project watcher is removed first; a failure there is logged and the
    /// shutdown continues.
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down tenant system...");

        if let Err(e) = self.controller.stop().await {
            error!(error = %e, "Failed to delete project watcher");
        }

        self.token.cancel();
        if let Err(e) = self.manager.await {
            error!("Job manager task failed: {:?}", e);
            return Err(format!("Job manager task failed: {:?}", e));
        }

        info!("Tenant system shutdown complete.");
        Ok(())
    }

    /// Token cancelled on shutdown; streaming sessions can hang off it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }
}
