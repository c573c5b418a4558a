//! Demo: runs the tenant controller against in-memory collaborators.
//!
//! Two projects are added and the first one is then marked deleted. Every
//! snapshot streamed to the observer is printed as JSON until the first project
//! has been cleaned up and the second one provisioned.

use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tenant_controller::config::Config;
use tenant_controller::error::ControllerError;
use tenant_controller::jobs::{JobStatus, LifecycleClient};
use tenant_controller::mock::{
    InMemoryProjectWatcherRegistry, InMemoryWatcherStore, MockHttp, MockTenantService,
};
use tenant_controller::model::{Project, ProjectId};
use tenant_controller::runtime::{setup_tracing, Collaborators, TenantSystem};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "tenant-controller", version, about = "Observability tenant controller demo")]
struct Args {
    /// Path to the YAML config file; built-in defaults otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// How long to wait for the demo projects to settle
    #[arg(long, default_value = "5m", value_parser = humantime::parse_duration)]
    wait: Duration,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };
    info!(config = ?args.config, "Starting tenant controller demo");

    let alpha = Project::new("uid-alpha", "alpha", "Alpha", "acme");
    let beta = Project::new("uid-beta", "beta", "Beta", "acme");

    let store = Arc::new(InMemoryWatcherStore::new());
    store.put_project(&alpha.name, alpha.uid.clone());
    store.put_project(&beta.name, beta.uid.clone());

    let collaborators = Collaborators {
        watcher_store: store,
        registry: Arc::new(InMemoryProjectWatcherRegistry::new()),
        alerting: Arc::new(MockTenantService::new("alerting monitor")),
        sre: Arc::new(MockTenantService::new("sre exporter")),
        http: Arc::new(MockHttp::completing_deletions(&config.endpoints)),
    };
    let system = TenantSystem::start(config, collaborators)
        .await
        .map_err(|e| e.to_string())?;

    let (sink, mut stream) = mpsc::channel(16);
    let streamer = {
        let updates = system.updates.clone();
        let shutdown = system.shutdown_token();
        tokio::spawn(async move { updates.stream_project_updates(sink, shutdown).await })
    };
    let printer = tokio::spawn(async move {
        while let Some(update) = stream.recv().await {
            match serde_json::to_string(&update) {
                Ok(json) => println!("{json}"),
                Err(e) => error!(error = %e, "Failed to encode project update"),
            }
        }
    });

    let events = async {
        system.controller.on_project_added(alpha.clone()).await?;
        system.controller.on_project_added(beta.clone()).await?;
        system.controller.on_project_updated(alpha.clone().marked_deleted()).await
    };
    if let Err(e) = events.await {
        error!(error = %e, "Failed to submit project events");
    }

    let settled = wait_until_settled(&system.lifecycle, &alpha.uid, &beta.uid);
    tokio::select! {
        result = tokio::time::timeout(args.wait, settled) => match result {
            Ok(Ok(())) => info!("Demo projects settled"),
            Ok(Err(e)) => error!(error = %e, "Job manager unavailable"),
            Err(_) => warn!(wait = ?args.wait, "Demo projects did not settle in time"),
        },
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    system.shutdown().await?;
    let _ = streamer.await;
    let _ = printer.await;

    info!("Demo completed");
    Ok(())
}

/// Waits until `deleted` was reaped and `created` holds a tenant.
async fn wait_until_settled(
    lifecycle: &LifecycleClient,
    deleted: &ProjectId,
    created: &ProjectId,
) -> Result<(), ControllerError> {
    loop {
        let jobs: HashMap<ProjectId, JobStatus> = lifecycle.jobs().await?;
        if !jobs.contains_key(deleted) && jobs.get(created) == Some(&JobStatus::TenantCreated) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
