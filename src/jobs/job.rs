//! # Job
//!
//! Drives one project through initialize or cleanup. Status transitions:
//!
//! ```text
//! Created -> InProgress -> Cancelled | TenantCreated | TenantDeleted | IdentityMismatch
//! ```
//!
//! `InProgress` is written synchronously by [`Job::run`]; the terminal state is
//! written only by the job's own background task.

use super::backoff::{retry_with_backoff, RetryOutcome};
use super::fan_out::{boxed, fan_out, BoxedAction};
use crate::backends::{tenant_service, TenantBackends};
use crate::config::JobConfig;
use crate::error::TenantError;
use crate::model::{Action, Project, TenantId};
use crate::watcher::{WatcherReconciler, WatcherStatus};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum JobStatus {
    Created = 0,
    InProgress = 1,
    Cancelled = 2,
    TenantCreated = 3,
    TenantDeleted = 4,
    IdentityMismatch = 5,
}

impl JobStatus {
    /// Inverse of `status as u8`; the cell only ever holds values written by
    /// [`StatusCell::store`].
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => JobStatus::Created,
            1 => JobStatus::InProgress,
            2 => JobStatus::Cancelled,
            3 => JobStatus::TenantCreated,
            4 => JobStatus::TenantDeleted,
            5 => JobStatus::IdentityMismatch,
            other => unreachable!("invalid job status byte {other}"),
        }
    }

    /// Whether the periodic sweep drops a job in this state.
    pub fn is_reapable(self) -> bool {
        matches!(self, JobStatus::TenantDeleted | JobStatus::IdentityMismatch)
    }
}

/// Lock-free status cell shared between the manager and the job task.
#[derive(Debug, Clone)]
struct StatusCell(Arc<AtomicU8>);

impl StatusCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(JobStatus::Created as u8)))
    }

    fn load(&self) -> JobStatus {
        JobStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, status: JobStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

/// Everything a job needs besides its project.
pub struct JobContext {
    pub config: JobConfig,
    pub backends: TenantBackends,
    pub watcher: WatcherReconciler,
}

/// One project's lifecycle work, owned by the [`JobManager`](super::JobManager).
///
/// # Example
///
/// ```ignore
/// let mut job = Job::new(project);
/// job.run(&manager_token, Action::Initialize, ctx);
/// assert_eq!(job.status(), JobStatus::InProgress);
///
/// job.cancel();
/// ```
pub struct Job {
    project: Arc<Project>,
    status: StatusCell,
    cancel: Option<CancellationToken>,
}

impl Job {
    /// A job in `Created` state; nothing runs until [`Job::run`].
    pub fn new(project: Project) -> Self {
        Self {
            project: Arc::new(project),
            status: StatusCell::new(),
            cancel: None,
        }
    }

    /// The project as it was when the job was created.
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Latest status written by `run` or the background task.
    pub fn status(&self) -> JobStatus {
        self.status.load()
    }

    /// Starts `action` in the background under a child of `parent`.
    pub fn run(&mut self, parent: &CancellationToken, action: Action, ctx: Arc<JobContext>) {
        self.status.store(JobStatus::InProgress);

        let token = parent.child_token();
        self.cancel = Some(token.clone());

        let project = self.project.clone();
        let status = self.status.clone();
        let span = info_span!("job", tenant_id = %project.uid, %action);

        tokio::spawn(
            async move {
                let tenant = project.tenant();
                let outcome = retry_with_backoff(&token, ctx.config.backoff, &tenant, action, || {
                    attempt(&ctx, &project, &tenant, action, &token)
                })
                .await;

                let terminal = if token.is_cancelled() {
                    JobStatus::Cancelled
                } else {
                    match (outcome, action) {
                        (RetryOutcome::Cancelled, _) => JobStatus::Cancelled,
                        (RetryOutcome::IdentityMismatch, _) => JobStatus::IdentityMismatch,
                        (RetryOutcome::Completed, Action::Initialize) => JobStatus::TenantCreated,
                        (RetryOutcome::Completed, Action::Cleanup) => JobStatus::TenantDeleted,
                    }
                };
                info!(status = ?terminal, "Job finished");
                status.store(terminal);
            }
            .instrument(span),
        );
    }

    /// Cancels the running action. No-op if the job never started.
    pub fn cancel(&self) {
        if let Some(token) = &self.cancel {
            token.cancel();
        }
    }
}

/// One attempt of `action`: watcher progress, backend fan-out, watcher outcome.
///
/// Every step is a suspension point on `token`, store calls included.
async fn attempt(
    ctx: &JobContext,
    project: &Project,
    tenant: &TenantId,
    action: Action,
    token: &CancellationToken,
) -> Result<(), TenantError> {
    match action {
        Action::Initialize => {
            let creating = format!("Creating tenant {:?}", tenant.as_str());
            until_cancelled(
                token,
                ctx.watcher
                    .report_progress(project, tenant, WatcherStatus::InProgress, creating),
            )
            .await?;
            run_with_timeout(ctx, token, initialize_actions(&ctx.backends, tenant)).await?;
            let created = format!("Tenant {:?} created", tenant.as_str());
            until_cancelled(
                token,
                ctx.watcher
                    .report_progress(project, tenant, WatcherStatus::Idle, created),
            )
            .await
        }
        Action::Cleanup => {
            let deleting = format!("Deleting tenant {:?}", tenant.as_str());
            until_cancelled(
                token,
                ctx.watcher
                    .report_progress(project, tenant, WatcherStatus::InProgress, deleting),
            )
            .await?;
            run_with_timeout(ctx, token, cleanup_actions(&ctx.backends, tenant)).await?;
            until_cancelled(token, ctx.watcher.delete(project, tenant)).await
        }
    }
}

/// Drops `step` as soon as `token` fires.
async fn until_cancelled<F>(token: &CancellationToken, step: F) -> Result<(), TenantError>
where
    F: Future<Output = Result<(), TenantError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(TenantError::Cancelled),
        result = step => result,
    }
}

async fn run_with_timeout(
    ctx: &JobContext,
    token: &CancellationToken,
    actions: Vec<BoxedAction>,
) -> Result<(), TenantError> {
    let timeout = ctx.config.timeout;
    tokio::time::timeout(timeout, fan_out(token, actions))
        .await
        .unwrap_or_else(|_| Err(TenantError::Timeout(timeout)))
}

fn initialize_actions(backends: &TenantBackends, tenant: &TenantId) -> Vec<BoxedAction> {
    let mut actions = Vec::with_capacity(2);

    let (service, id) = (backends.alerting.clone(), tenant.clone());
    actions.push(boxed(async move { tenant_service::initialize(service.as_ref(), &id).await }));

    if let Some(sre) = &backends.sre {
        let (service, id) = (sre.clone(), tenant.clone());
        actions.push(boxed(async move { tenant_service::initialize(service.as_ref(), &id).await }));
    }
    actions
}

fn cleanup_actions(backends: &TenantBackends, tenant: &TenantId) -> Vec<BoxedAction> {
    let mut actions = Vec::with_capacity(4);

    let (service, id) = (backends.alerting.clone(), tenant.clone());
    actions.push(boxed(async move { tenant_service::cleanup(service.as_ref(), &id).await }));

    if let Some(sre) = &backends.sre {
        let (service, id) = (sre.clone(), tenant.clone());
        actions.push(boxed(async move { tenant_service::cleanup(service.as_ref(), &id).await }));
    }

    let (logs, id) = (backends.logs.clone(), tenant.clone());
    actions.push(boxed(async move { logs.cleanup_tenant(&id).await }));

    let (metrics, id) = (backends.metrics.clone(), tenant.clone());
    actions.push(boxed(async move { metrics.cleanup_tenant(&id).await }));

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::TenantService;
    use crate::config::Config;
    use crate::error::{RpcCode, RpcError};
    use crate::mock::{InMemoryWatcherStore, MockHttp, MockTenantService};
    use crate::model::ProjectId;
    use crate::watcher::APP_NAME;
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryWatcherStore>,
        alerting: Arc<MockTenantService>,
        sre: Arc<MockTenantService>,
        ctx: Arc<JobContext>,
    }

    fn harness(alerting: MockTenantService) -> Harness {
        harness_with_store(alerting, InMemoryWatcherStore::new())
    }

    fn harness_with_store(alerting: MockTenantService, store: InMemoryWatcherStore) -> Harness {
        let config = Config::default();
        let store = Arc::new(store);
        store.put_project("project-a", ProjectId::new("uid-1"));
        let alerting = Arc::new(alerting);
        let sre = Arc::new(MockTenantService::new("sre exporter"));
        let backends = TenantBackends::new(
            &config.endpoints,
            Arc::new(MockHttp::completing_deletions(&config.endpoints)),
            alerting.clone() as Arc<dyn TenantService>,
            Some(sre.clone() as Arc<dyn TenantService>),
        );
        let ctx = Arc::new(JobContext {
            config: config.job,
            backends,
            watcher: WatcherReconciler::new(store.clone()),
        });
        Harness {
            store,
            alerting,
            sre,
            ctx,
        }
    }

    fn project() -> Project {
        Project::new("uid-1", "project-a", "Project A", "org")
    }

    async fn wait_for(job: &Job, status: JobStatus) {
        for _ in 0..10_000 {
            if job.status() == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("job stuck in {:?}, expected {:?}", job.status(), status);
    }

    #[test]
    fn status_round_trips_through_atomic() {
        let cell = StatusCell::new();
        assert_eq!(cell.load(), JobStatus::Created);
        cell.store(JobStatus::IdentityMismatch);
        assert_eq!(cell.load(), JobStatus::IdentityMismatch);
        assert!(JobStatus::TenantDeleted.is_reapable());
        assert!(!JobStatus::Cancelled.is_reapable());
    }

    #[test]
    fn every_status_survives_the_cell() {
        let cell = StatusCell::new();
        for status in [
            JobStatus::Created,
            JobStatus::InProgress,
            JobStatus::Cancelled,
            JobStatus::TenantCreated,
            JobStatus::TenantDeleted,
            JobStatus::IdentityMismatch,
        ] {
            cell.store(status);
            assert_eq!(cell.load(), status);
        }
    }

    #[test]
    #[should_panic(expected = "invalid job status byte")]
    fn unknown_status_byte_is_rejected() {
        JobStatus::from_u8(42);
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_creates_tenant_and_idles_watcher() {
        let h = harness(MockTenantService::new("alerting monitor"));
        let mut job = Job::new(project());

        job.run(&CancellationToken::new(), Action::Initialize, h.ctx.clone());
        assert_eq!(job.status(), JobStatus::InProgress);
        wait_for(&job, JobStatus::TenantCreated).await;

        let tenant = project().tenant();
        assert_eq!(h.alerting.init_calls(), vec![tenant.clone()]);
        assert_eq!(h.sre.init_calls(), vec![tenant]);
        let watcher = h.store.watcher("project-a", APP_NAME).unwrap();
        assert_eq!(watcher.status, WatcherStatus::Idle);
        assert_eq!(watcher.message, "Tenant \"uid-1\" created");
    }

    #[tokio::test(start_paused = true)]
    async fn already_exists_needs_no_retry() {
        let alerting = MockTenantService::new("alerting monitor");
        alerting.reply_init(Err(RpcError::new(RpcCode::AlreadyExists, "exists")));
        let h = harness(alerting);
        let mut job = Job::new(project());

        job.run(&CancellationToken::new(), Action::Initialize, h.ctx.clone());
        wait_for(&job, JobStatus::TenantCreated).await;
        assert_eq!(h.alerting.init_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_whole_fan_out() {
        let alerting = MockTenantService::new("alerting monitor");
        alerting.reply_init(Err(RpcError::new(RpcCode::Unavailable, "down")));
        alerting.reply_init(Ok(()));
        let h = harness(alerting);
        let mut job = Job::new(project());

        job.run(&CancellationToken::new(), Action::Initialize, h.ctx.clone());
        wait_for(&job, JobStatus::TenantCreated).await;
        assert_eq!(h.alerting.init_calls().len(), 2);
        assert_eq!(h.sre.init_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_deletes_tenant_and_watcher() {
        let h = harness(MockTenantService::new("alerting monitor"));
        let mut job = Job::new(project().marked_deleted());

        job.run(&CancellationToken::new(), Action::Cleanup, h.ctx.clone());
        wait_for(&job, JobStatus::TenantDeleted).await;

        assert_eq!(h.alerting.cleanup_calls().len(), 1);
        assert_eq!(h.sre.cleanup_calls().len(), 1);
        assert!(h.store.watcher("project-a", APP_NAME).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_of_recreated_project_ends_in_identity_mismatch() {
        let h = harness(MockTenantService::new("alerting monitor"));
        let mut first = Job::new(project());
        first.run(&CancellationToken::new(), Action::Initialize, h.ctx.clone());
        wait_for(&first, JobStatus::TenantCreated).await;

        h.store.put_project("project-a", ProjectId::new("uid-2"));

        let mut stale = Job::new(project().marked_deleted());
        stale.run(&CancellationToken::new(), Action::Cleanup, h.ctx.clone());
        wait_for(&stale, JobStatus::IdentityMismatch).await;

        assert!(h.store.watcher("project-a", APP_NAME).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_retry_loop() {
        let alerting = MockTenantService::new("alerting monitor");
        alerting.reply_init(Err(RpcError::new(RpcCode::Unavailable, "down")));
        let h = harness(alerting);
        let mut job = Job::new(project());

        job.run(&CancellationToken::new(), Action::Initialize, h.ctx.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;
        job.cancel();
        wait_for(&job, JobStatus::Cancelled).await;
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_reaches_job() {
        let alerting =
            MockTenantService::new("alerting monitor").with_latency(Duration::from_secs(3600));
        let h = harness(alerting);
        let parent = CancellationToken::new();
        let mut job = Job::new(project());

        job.run(&parent, Action::Initialize, h.ctx.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;
        parent.cancel();
        wait_for(&job, JobStatus::Cancelled).await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_slow_watcher_call() {
        let store = InMemoryWatcherStore::new().with_latency(Duration::from_secs(3600));
        let h = harness_with_store(MockTenantService::new("alerting monitor"), store);
        let mut job = Job::new(project());

        job.run(&CancellationToken::new(), Action::Initialize, h.ctx.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;
        job.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(job.status(), JobStatus::Cancelled);
        assert!(h.alerting.init_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_cleanup_never_reaches_backends() {
        let store = InMemoryWatcherStore::new().with_latency(Duration::from_secs(60));
        let h = harness_with_store(MockTenantService::new("alerting monitor"), store);
        let parent = CancellationToken::new();
        let mut job = Job::new(project().marked_deleted());

        job.run(&parent, Action::Cleanup, h.ctx.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;
        parent.cancel();
        wait_for(&job, JobStatus::Cancelled).await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(job.status(), JobStatus::Cancelled);
        assert!(h.alerting.cleanup_calls().is_empty());
        assert!(h.sre.cleanup_calls().is_empty());
    }

    #[test]
    fn cancel_before_run_is_noop() {
        let job = Job::new(project());
        job.cancel();
        assert_eq!(job.status(), JobStatus::Created);
    }
}
