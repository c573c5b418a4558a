//! # Update Broadcaster
//!
//! Holds the externally visible project snapshot and pushes it to streaming
//! subscribers.
//!
//! Each subscriber owns a notification channel of capacity one. [`ProjectUpdates::notify`]
//! does a non-blocking send on every channel and skips the full ones: a
//! subscriber that has not drained its last wake-up will re-read the whole
//! snapshot anyway, so several changes collapse into one push without losing
//! anything.

use crate::model::{ProjectData, ProjectEntry, ProjectId, ProjectUpdate};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type Subscribers = Arc<DashMap<u64, mpsc::Sender<()>>>;

#[derive(Default)]
pub struct ProjectUpdates {
    projects: RwLock<HashMap<ProjectId, ProjectData>>,
    subscribers: Subscribers,
    next_subscriber: AtomicU64,
}

/// A registered notification channel; deregisters itself on drop.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<()>,
    subscribers: Subscribers,
}

impl Subscription {
    /// Waits for the next change notification.
    pub async fn changed(&mut self) -> bool {
        self.receiver.recv().await.is_some()
    }

    /// Whether a notification is waiting.
    pub fn is_pending(&self) -> bool {
        !self.receiver.is_empty()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.remove(&self.id);
    }
}

impl ProjectUpdates {
    /// An empty snapshot with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry for `key` and wakes every subscriber.
    pub async fn record(&self, key: ProjectId, data: ProjectData) {
        {
            let mut projects = self.projects.write().await;
            projects.insert(key, data);
        }
        self.notify();
    }

    /// Drops the entry for `key`; wakes subscribers only if something was removed.
    pub async fn remove(&self, key: &ProjectId) -> bool {
        let removed = self.projects.write().await.remove(key).is_some();
        if removed {
            debug!(project_id = %key, "Removed project from snapshot");
            self.notify();
        }
        removed
    }

    /// Current entry for one project, if it is in the snapshot.
    pub async fn snapshot_for(&self, key: &ProjectId) -> Option<ProjectData> {
        self.projects.read().await.get(key).cloned()
    }

    /// Full snapshot, ordered by project ID.
    pub async fn snapshot(&self) -> ProjectUpdate {
        let projects = self.projects.read().await;
        let mut entries: Vec<ProjectEntry> = projects
            .iter()
            .map(|(key, data)| ProjectEntry {
                key: key.clone(),
                data: data.clone(),
            })
            .collect();
        drop(projects);

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        ProjectUpdate { projects: entries }
    }

    /// Wakes every subscriber without blocking.
    pub fn notify(&self) {
        for subscriber in self.subscribers.iter() {
            if subscriber.value().try_send(()).is_err() {
                debug!(subscriber = *subscriber.key(), "Subscriber already notified, skipping");
            }
        }
    }

    /// Registers a coalescing notification channel.
    ///
    /// Dropping the returned [`Subscription`] deregisters it.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut subscription = updates.subscribe();
    /// while subscription.changed().await {
    ///     send(updates.snapshot().await);
    /// }
    /// ```
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(1);
        self.subscribers.insert(id, sender);
        Subscription {
            id,
            receiver,
            subscribers: self.subscribers.clone(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Streams full snapshots into `sink` until it closes or `shutdown` fires.
    ///
    /// The current state is pushed first. The subscription is registered before
    /// that push, so a change racing the connect still produces a wake-up.
    pub async fn stream_project_updates(&self, sink: mpsc::Sender<ProjectUpdate>, shutdown: CancellationToken) {
        let mut subscription = self.subscribe();
        info!("Client connected to project updates stream");

        if sink.send(self.snapshot().await).await.is_err() {
            info!("Client disconnected from project updates stream");
            return;
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Project updates stream closed");
                    return;
                }
                _ = sink.closed() => {
                    info!("Client disconnected from project updates stream");
                    return;
                }
                changed = subscription.changed() => {
                    if !changed || sink.send(self.snapshot().await).await.is_err() {
                        info!("Client disconnected from project updates stream");
                        return;
                    }
                }
            }
        }
    }
}
