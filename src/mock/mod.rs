//! # Mock Collaborators
//!
//! In-memory stand-ins for everything the controller talks to, so jobs, the
//! manager and the whole system can be exercised without a resource store or
//! any backend running.
//!
//! Scripted replies are queued per call site. The last queued reply is sticky:
//! once the queue is down to one entry it is returned for every further call, so
//! `reply_init(Err(..)); reply_init(Ok(()))` means "fail once, then succeed".
//!
//! ```ignore
//! let alerting = Arc::new(MockTenantService::new("alerting monitor"));
//! alerting.reply_init(Err(RpcError::new(RpcCode::Unavailable, "down")));
//! alerting.reply_init(Ok(()));
//! ```

use crate::backends::{TenantHttp, TenantService};
use crate::config::Endpoints;
use crate::controller::ProjectWatcherRegistry;
use crate::error::{HttpError, RpcError, StoreError};
use crate::model::{ProjectId, TenantId};
use crate::watcher::{Watcher, WatcherStore};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Queue of scripted replies where the last one repeats.
struct Script<T: Clone> {
    replies: VecDeque<T>,
    fallback: T,
}

impl<T: Clone> Script<T> {
    fn new(fallback: T) -> Self {
        Self {
            replies: VecDeque::new(),
            fallback,
        }
    }

    fn push(&mut self, reply: T) {
        self.replies.push_back(reply);
    }

    fn next(&mut self) -> T {
        match self.replies.len() {
            0 => self.fallback.clone(),
            1 => self.replies[0].clone(),
            _ => self.replies.pop_front().unwrap_or_else(|| self.fallback.clone()),
        }
    }
}

// =============================================================================
// WATCHER STORE
// =============================================================================

#[derive(Default)]
struct StoreState {
    /// Project resource name → current UID.
    projects: HashMap<String, ProjectId>,
    /// (project name, watcher name) → watcher.
    watchers: HashMap<(String, String), Watcher>,
    fail_next: Option<StoreError>,
}

impl StoreState {
    fn take_failure(&mut self) -> Result<(), StoreError> {
        match self.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn ensure_project(&self, project: &str) -> Result<(), StoreError> {
        if self.projects.contains_key(project) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }
}

/// Resource store holding projects and their watchers.
#[derive(Default)]
pub struct InMemoryWatcherStore {
    state: Mutex<StoreState>,
    latency: Option<Duration>,
}

impl InMemoryWatcherStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every store call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Creates or recreates the project resource `name` with identity `uid`.
    ///
    /// Existing watchers are kept, which is what a stale job sees after the
    /// project was recreated under the same name.
    pub fn put_project(&self, name: &str, uid: ProjectId) {
        lock(&self.state).projects.insert(name.to_string(), uid);
    }

    /// Deletes the project resource together with its watchers.
    pub fn remove_project(&self, name: &str) {
        let mut state = lock(&self.state);
        state.projects.remove(name);
        state.watchers.retain(|(project, _), _| project != name);
    }

    pub fn watcher(&self, project: &str, name: &str) -> Option<Watcher> {
        lock(&self.state)
            .watchers
            .get(&(project.to_string(), name.to_string()))
            .cloned()
    }

    /// Makes the next store call fail with `err`.
    pub fn fail_next(&self, err: StoreError) {
        lock(&self.state).fail_next = Some(err);
    }
}

#[async_trait]
impl WatcherStore for InMemoryWatcherStore {
    async fn get(&self, project: &str, name: &str) -> Result<Watcher, StoreError> {
        self.delay().await;
        let mut state = lock(&self.state);
        state.take_failure()?;
        state.ensure_project(project)?;
        state
            .watchers
            .get(&(project.to_string(), name.to_string()))
            .cloned()
            .ok_or(StoreError::ChildNotFound)
    }

    async fn create(&self, project: &str, watcher: Watcher) -> Result<(), StoreError> {
        self.delay().await;
        let mut state = lock(&self.state);
        state.take_failure()?;
        state.ensure_project(project)?;
        let key = (project.to_string(), watcher.name.clone());
        if state.watchers.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        state.watchers.insert(key, watcher);
        Ok(())
    }

    async fn update(&self, project: &str, watcher: Watcher) -> Result<(), StoreError> {
        self.delay().await;
        let mut state = lock(&self.state);
        state.take_failure()?;
        state.ensure_project(project)?;
        match state.watchers.get_mut(&(project.to_string(), watcher.name.clone())) {
            Some(slot) => {
                *slot = watcher;
                Ok(())
            }
            None => Err(StoreError::ChildNotFound),
        }
    }

    async fn delete(&self, project: &str, name: &str) -> Result<(), StoreError> {
        self.delay().await;
        let mut state = lock(&self.state);
        state.take_failure()?;
        state.ensure_project(project)?;
        state
            .watchers
            .remove(&(project.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or(StoreError::ChildNotFound)
    }

    async fn parent(&self, project: &str, name: &str) -> Result<Option<ProjectId>, StoreError> {
        self.delay().await;
        let mut state = lock(&self.state);
        state.take_failure()?;
        let uid = state.projects.get(project).cloned().ok_or(StoreError::NotFound)?;
        if state.watchers.contains_key(&(project.to_string(), name.to_string())) {
            Ok(Some(uid))
        } else {
            Err(StoreError::ChildNotFound)
        }
    }
}

// =============================================================================
// TENANT SERVICES
// =============================================================================

/// Scripted [`TenantService`] that records every call.
pub struct MockTenantService {
    name: String,
    latency: Option<Duration>,
    init: Mutex<Script<Result<(), RpcError>>>,
    cleanup: Mutex<Script<Result<(), RpcError>>>,
    init_calls: Mutex<Vec<TenantId>>,
    cleanup_calls: Mutex<Vec<TenantId>>,
}

impl MockTenantService {
    /// A service that answers `Ok(())` to everything.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: None,
            init: Mutex::new(Script::new(Ok(()))),
            cleanup: Mutex::new(Script::new(Ok(()))),
            init_calls: Mutex::new(Vec::new()),
            cleanup_calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn reply_init(&self, reply: Result<(), RpcError>) {
        lock(&self.init).push(reply);
    }

    pub fn reply_cleanup(&self, reply: Result<(), RpcError>) {
        lock(&self.cleanup).push(reply);
    }

    pub fn init_calls(&self) -> Vec<TenantId> {
        lock(&self.init_calls).clone()
    }

    pub fn cleanup_calls(&self) -> Vec<TenantId> {
        lock(&self.cleanup_calls).clone()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl TenantService for MockTenantService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize_tenant(&self, tenant: &TenantId) -> Result<(), RpcError> {
        lock(&self.init_calls).push(tenant.clone());
        self.delay().await;
        lock(&self.init).next()
    }

    async fn cleanup_tenant(&self, tenant: &TenantId) -> Result<(), RpcError> {
        lock(&self.cleanup_calls).push(tenant.clone());
        self.delay().await;
        lock(&self.cleanup).next()
    }
}

// =============================================================================
// HTTP
// =============================================================================

const PROCESSED_LOG_DELETION: &str = r#"[{"request_id": "1", "start_time": 1, "end_time": 1, "query": "{}", "status": "processed", "created_at": 1}]"#;

/// Scripted [`TenantHttp`] keyed by full URL.
///
/// Unscripted POSTs succeed and unscripted GETs return an empty body.
#[derive(Default)]
pub struct MockHttp {
    gets: Mutex<HashMap<String, Script<Result<Vec<u8>, HttpError>>>>,
    posts: Mutex<HashMap<String, Script<Result<(), HttpError>>>>,
    get_log: Mutex<Vec<(String, TenantId)>>,
    post_log: Mutex<Vec<(String, TenantId)>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport on which the log and metrics stores see every deletion finish
    /// on the first status poll.
    pub fn completing_deletions(endpoints: &Endpoints) -> Self {
        let http = Self::new();
        http.respond_get(
            &format!("{}/loki/api/v1/delete", endpoints.loki.backend),
            Ok(PROCESSED_LOG_DELETION.as_bytes().to_vec()),
        );
        http.respond_get(
            &format!("{}/compactor/delete_tenant_status", endpoints.mimir.compactor),
            Ok(br#"{"tenant_id": "", "blocks_deleted": true}"#.to_vec()),
        );
        http
    }

    pub fn respond_get(&self, url: &str, reply: Result<Vec<u8>, HttpError>) {
        lock(&self.gets)
            .entry(url.to_string())
            .or_insert_with(|| Script::new(Ok(Vec::new())))
            .push(reply);
    }

    pub fn respond_post(&self, url: &str, reply: Result<(), HttpError>) {
        lock(&self.posts)
            .entry(url.to_string())
            .or_insert_with(|| Script::new(Ok(())))
            .push(reply);
    }

    pub fn fail_get(&self, url: &str, status: u16) {
        self.respond_get(
            url,
            Err(HttpError::Status {
                url: url.to_string(),
                status,
            }),
        );
    }

    pub fn fail_post(&self, url: &str, status: u16) {
        self.respond_post(
            url,
            Err(HttpError::Status {
                url: url.to_string(),
                status,
            }),
        );
    }

    /// Every POST issued so far, in order.
    pub fn posts(&self) -> Vec<(String, TenantId)> {
        lock(&self.post_log).clone()
    }

    pub fn get_count(&self, url: &str) -> usize {
        lock(&self.get_log).iter().filter(|(u, _)| u == url).count()
    }
}

#[async_trait]
impl TenantHttp for MockHttp {
    async fn post(&self, url: &str, tenant: &TenantId) -> Result<(), HttpError> {
        lock(&self.post_log).push((url.to_string(), tenant.clone()));
        match lock(&self.posts).get_mut(url) {
            Some(script) => script.next(),
            None => Ok(()),
        }
    }

    async fn get(&self, url: &str, tenant: &TenantId) -> Result<Vec<u8>, HttpError> {
        lock(&self.get_log).push((url.to_string(), tenant.clone()));
        match lock(&self.gets).get_mut(url) {
            Some(script) => script.next(),
            None => Ok(Vec::new()),
        }
    }
}

// =============================================================================
// PROJECT WATCHER REGISTRY
// =============================================================================

#[derive(Default)]
pub struct InMemoryProjectWatcherRegistry {
    registered: Mutex<HashSet<String>>,
    adds: Mutex<usize>,
    latency: Option<Duration>,
    fail_next: Mutex<Option<StoreError>>,
}

impl InMemoryProjectWatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn is_registered(&self, app_name: &str) -> bool {
        lock(&self.registered).contains(app_name)
    }

    /// Number of registration attempts, successful or not.
    pub fn add_count(&self) -> usize {
        *lock(&self.adds)
    }

    /// Simulates someone deleting the project watcher out of band.
    pub fn drop_registration(&self, app_name: &str) {
        lock(&self.registered).remove(app_name);
    }

    pub fn fail_next(&self, err: StoreError) {
        *lock(&self.fail_next) = Some(err);
    }

    fn take_failure(&self) -> Result<(), StoreError> {
        match lock(&self.fail_next).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProjectWatcherRegistry for InMemoryProjectWatcherRegistry {
    async fn add_project_watcher(&self, app_name: &str) -> Result<(), StoreError> {
        *lock(&self.adds) += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.take_failure()?;
        if lock(&self.registered).insert(app_name.to_string()) {
            Ok(())
        } else {
            Err(StoreError::AlreadyExists)
        }
    }

    async fn delete_project_watcher(&self, app_name: &str) -> Result<(), StoreError> {
        self.take_failure()?;
        if lock(&self.registered).remove(app_name) {
            Ok(())
        } else {
            Err(StoreError::ChildNotFound)
        }
    }
}
