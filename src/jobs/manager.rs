//! # Job Manager
//!
//! Single task owning the table of jobs keyed by project identity. It
//! multiplexes three sources:
//!
//! - lifecycle events: record the intended state, cancel any job already
//!   running for the identity and start a fresh one;
//! - the sweep tick: drop jobs that ended in `TenantDeleted` or
//!   `IdentityMismatch`, together with their snapshot entry;
//! - the shutdown token: every job token is a child of it, so cancelling it
//!   stops all running jobs.
//!
//! The table needs no lock because only this task touches it. Superseded jobs
//! are not awaited; their last in-flight backend call may still land after the
//! successor started.

use super::job::{Job, JobContext, JobStatus};
use crate::error::ControllerError;
use crate::model::{ProjectData, ProjectEvent, ProjectId};
use crate::projects::ProjectUpdates;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Messages accepted by the manager loop.
#[derive(Debug)]
pub enum ManagerRequest {
    Lifecycle(ProjectEvent),
    Inspect {
        respond_to: oneshot::Sender<HashMap<ProjectId, JobStatus>>,
    },
}

pub struct JobManager {
    receiver: mpsc::Receiver<ManagerRequest>,
    jobs: HashMap<ProjectId, Job>,
    context: Arc<JobContext>,
    updates: Arc<ProjectUpdates>,
    sweep_rate: Duration,
    token: CancellationToken,
}

impl JobManager {
    /// Creates the manager and the client used to feed it.
    ///
    /// `buffer` bounds how many events may wait for the loop.
    pub fn new(
        buffer: usize,
        context: Arc<JobContext>,
        updates: Arc<ProjectUpdates>,
        sweep_rate: Duration,
        token: CancellationToken,
    ) -> (Self, LifecycleClient) {
        let (client, receiver) = LifecycleClient::channel(buffer);
        let manager = Self {
            receiver,
            jobs: HashMap::new(),
            context,
            updates,
            sweep_rate,
            token,
        };
        (manager, client)
    }

    /// Runs the event loop until the token is cancelled or every client is gone.
    pub async fn run(mut self) {
        info!(sweep_rate = ?self.sweep_rate, "Job manager started");

        let mut sweep = tokio::time::interval(self.sweep_rate);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep.tick().await;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                request = self.receiver.recv() => match request {
                    Some(ManagerRequest::Lifecycle(event)) => self.start_job(event).await,
                    Some(ManagerRequest::Inspect { respond_to }) => {
                        let _ = respond_to.send(self.statuses());
                    }
                    None => {
                        self.token.cancel();
                        break;
                    }
                },
                _ = sweep.tick() => self.sweep().await,
            }
        }

        info!(jobs = self.jobs.len(), "Job manager stopped");
    }

    async fn start_job(&mut self, event: ProjectEvent) {
        let ProjectEvent { project, action } = event;
        let key = project.uid.clone();

        self.updates
            .record(key.clone(), ProjectData::new(&project, action))
            .await;

        if let Some(previous) = self.jobs.get(&key) {
            info!(tenant_id = %key, previous = ?previous.status(), %action, "Superseding job");
            previous.cancel();
        }

        let mut job = Job::new(project);
        job.run(&self.token, action, self.context.clone());
        self.jobs.insert(key, job);
    }

    async fn sweep(&mut self) {
        let finished: Vec<ProjectId> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.status().is_reapable())
            .map(|(key, _)| key.clone())
            .collect();

        for key in finished {
            if let Some(job) = self.jobs.remove(&key) {
                info!(tenant_id = %key, status = ?job.status(), "Removing finished job");
                self.updates.remove(&key).await;
            }
        }
        debug!(jobs = self.jobs.len(), "Sweep done");
    }

    fn statuses(&self) -> HashMap<ProjectId, JobStatus> {
        self.jobs
            .iter()
            .map(|(key, job)| (key.clone(), job.status()))
            .collect()
    }
}

/// Handle for sending lifecycle events to the [`JobManager`].
#[derive(Clone)]
pub struct LifecycleClient {
    sender: mpsc::Sender<ManagerRequest>,
}

impl LifecycleClient {
    /// A client plus the receiving end a manager loop would own.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ManagerRequest>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }

    #[instrument(skip(self, event), fields(tenant_id = %event.project.uid, action = %event.action))]
    pub async fn submit(&self, event: ProjectEvent) -> Result<(), ControllerError> {
        debug!(project = ?event.project, "Submitting lifecycle event");
        self.sender
            .send(ManagerRequest::Lifecycle(event))
            .await
            .map_err(|_| ControllerError::ManagerClosed)
    }

    /// Current status of every job in the table.
    pub async fn jobs(&self) -> Result<HashMap<ProjectId, JobStatus>, ControllerError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ManagerRequest::Inspect { respond_to })
            .await
            .map_err(|_| ControllerError::ManagerClosed)?;
        response.await.map_err(|_| ControllerError::ManagerClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{TenantBackends, TenantService};
    use crate::config::Config;
    use crate::error::{RpcCode, RpcError};
    use crate::mock::{InMemoryWatcherStore, MockHttp, MockTenantService};
    use crate::model::{Project, ProjectStatus};
    use crate::watcher::{WatcherReconciler, APP_NAME};

    struct Harness {
        client: LifecycleClient,
        updates: Arc<ProjectUpdates>,
        alerting: Arc<MockTenantService>,
        store: Arc<InMemoryWatcherStore>,
        token: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(alerting: MockTenantService) -> Harness {
        start_with_store(alerting, InMemoryWatcherStore::new())
    }

    fn start_with_store(alerting: MockTenantService, store: InMemoryWatcherStore) -> Harness {
        let config = Config::default();
        let store = Arc::new(store);
        store.put_project("p1", ProjectId::new("uid-1"));
        let alerting = Arc::new(alerting);
        let context = Arc::new(JobContext {
            config: config.job.clone(),
            backends: TenantBackends::new(
                &config.endpoints,
                Arc::new(MockHttp::completing_deletions(&config.endpoints)),
                alerting.clone() as Arc<dyn TenantService>,
                None,
            ),
            watcher: WatcherReconciler::new(store.clone()),
        });
        let updates = Arc::new(ProjectUpdates::new());
        let token = CancellationToken::new();
        let (manager, client) = JobManager::new(
            4,
            context,
            updates.clone(),
            config.job.manager.deletion.rate,
            token.clone(),
        );
        let handle = tokio::spawn(manager.run());
        Harness {
            client,
            updates,
            alerting,
            store,
            token,
            handle,
        }
    }

    fn project() -> Project {
        Project::new("uid-1", "p1", "Project One", "org")
    }

    async fn wait_until<F>(client: &LifecycleClient, mut done: F) -> HashMap<ProjectId, JobStatus>
    where
        F: FnMut(&HashMap<ProjectId, JobStatus>) -> bool,
    {
        for _ in 0..10_000 {
            let jobs = client.jobs().await.unwrap();
            if done(&jobs) {
                return jobs;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("condition never reached");
    }

    #[tokio::test(start_paused = true)]
    async fn event_updates_snapshot_immediately() {
        let alerting =
            MockTenantService::new("alerting monitor").with_latency(Duration::from_secs(3600));
        let h = start(alerting);

        h.client.submit(ProjectEvent::from_project(project())).await.unwrap();
        let jobs = h.client.jobs().await.unwrap();

        assert_eq!(jobs.get(&ProjectId::new("uid-1")), Some(&JobStatus::InProgress));
        let data = h.updates.snapshot_for(&ProjectId::new("uid-1")).await.unwrap();
        assert_eq!(data.status, ProjectStatus::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_event_supersedes_running_job() {
        let alerting = MockTenantService::new("alerting monitor");
        alerting.reply_init(Err(RpcError::new(RpcCode::Unavailable, "down")));
        let h = start(alerting);

        h.client.submit(ProjectEvent::from_project(project())).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        h.client
            .submit(ProjectEvent::from_project(project().marked_deleted()))
            .await
            .unwrap();

        let jobs = wait_until(&h.client, |jobs| jobs.is_empty()).await;
        assert!(jobs.is_empty());
        assert!(h.updates.snapshot().await.projects.is_empty());
        assert_eq!(h.alerting.cleanup_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_initialize_is_kept_until_superseded() {
        let h = start(MockTenantService::new("alerting monitor"));

        h.client.submit(ProjectEvent::from_project(project())).await.unwrap();
        wait_until(&h.client, |jobs| {
            jobs.get(&ProjectId::new("uid-1")) == Some(&JobStatus::TenantCreated)
        })
        .await;

        tokio::time::sleep(Duration::from_secs(180)).await;
        let jobs = h.client.jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(h.updates.snapshot_for(&ProjectId::new("uid-1")).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_jobs_and_stops_loop() {
        let alerting =
            MockTenantService::new("alerting monitor").with_latency(Duration::from_secs(3600));
        let h = start(alerting);
        h.client.submit(ProjectEvent::from_project(project())).await.unwrap();
        h.client.jobs().await.unwrap();

        h.token.cancel();
        h.handle.await.unwrap();

        assert!(matches!(h.client.jobs().await, Err(ControllerError::ManagerClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_pending_watcher_call() {
        let store = InMemoryWatcherStore::new().with_latency(Duration::from_secs(60));
        let h = start_with_store(MockTenantService::new("alerting monitor"), store);
        h.client.submit(ProjectEvent::from_project(project())).await.unwrap();
        h.client.jobs().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        h.token.cancel();
        h.handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;

        // The job neither finished its watcher write nor reached the backends.
        assert!(h.store.watcher("p1", APP_NAME).is_none());
        assert!(h.alerting.init_calls().is_empty());
    }
}
