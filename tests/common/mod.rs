#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tenant_controller::config::Config;
use tenant_controller::jobs::{JobStatus, LifecycleClient};
use tenant_controller::mock::{
    InMemoryProjectWatcherRegistry, InMemoryWatcherStore, MockHttp, MockTenantService,
};
use tenant_controller::model::{Project, ProjectId};
use tenant_controller::runtime::{Collaborators, TenantSystem};

pub struct Harness {
    pub system: TenantSystem,
    pub store: Arc<InMemoryWatcherStore>,
    pub registry: Arc<InMemoryProjectWatcherRegistry>,
    pub alerting: Arc<MockTenantService>,
    pub sre: Arc<MockTenantService>,
    pub http: Arc<MockHttp>,
}

pub fn project(n: u32) -> Project {
    Project::new(format!("uid-{n}"), format!("p{n}"), format!("Project {n}"), "acme")
}

pub async fn start(config: Config, alerting: MockTenantService, sre: MockTenantService) -> Harness {
    let store = Arc::new(InMemoryWatcherStore::new());
    for n in 1..=3 {
        let p = project(n);
        store.put_project(&p.name, p.uid.clone());
    }
    let registry = Arc::new(InMemoryProjectWatcherRegistry::new());
    let alerting = Arc::new(alerting);
    let sre = Arc::new(sre);
    let http = Arc::new(MockHttp::completing_deletions(&config.endpoints));

    let collaborators = Collaborators {
        watcher_store: store.clone(),
        registry: registry.clone(),
        alerting: alerting.clone(),
        sre: sre.clone(),
        http: http.clone(),
    };
    let system = TenantSystem::start(config, collaborators)
        .await
        .expect("system should start");

    Harness {
        system,
        store,
        registry,
        alerting,
        sre,
        http,
    }
}

pub async fn start_default() -> Harness {
    start(
        Config::default(),
        MockTenantService::new("alerting monitor"),
        MockTenantService::new("sre exporter"),
    )
    .await
}

/// Polls the job table (in paused time) until `done` holds.
pub async fn wait_for_jobs<F>(client: &LifecycleClient, mut done: F) -> HashMap<ProjectId, JobStatus>
where
    F: FnMut(&HashMap<ProjectId, JobStatus>) -> bool,
{
    for _ in 0..36_000 {
        let jobs = client.jobs().await.expect("manager running");
        if done(&jobs) {
            return jobs;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("job table never reached the expected state");
}
