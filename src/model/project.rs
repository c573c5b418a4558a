//! Represents a runtime project as seen by the resource store.
//!
//! # Identity
//! `uid` is the persistent identity of the project and doubles as the tenant ID
//! in every backend. `name` is the resource name the store addresses the project
//! by; a project that is deleted and recreated keeps the name but gets a new `uid`,
//! which is what the watcher fencing in [`crate::watcher`] relies on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persistent project UID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The tenant ID used when talking to backends for this project.
    pub fn tenant(&self) -> TenantId {
        TenantId(self.0.clone())
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant key sent to backends (`X-Scope-OrgID`, RPC tenant field).
///
/// Only obtainable from a [`ProjectId`], so every backend call is tied to a
/// project identity at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, project: &ProjectId) -> bool {
        self.0 == project.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub uid: ProjectId,
    pub name: String,
    pub display_name: String,
    pub org: String,
    pub deleted: bool,
}

impl Project {
    /// Creates a new active Project.
    ///
    /// # Arguments
    /// * `uid` - Persistent identity (tenant ID)
    /// * `name` - Resource name within the store
    /// * `display_name` - Human readable name
    /// * `org` - Owning organization name
    pub fn new(
        uid: impl Into<String>,
        name: impl Into<String>,
        display_name: impl Into<String>,
        org: impl Into<String>,
    ) -> Self {
        Self {
            uid: ProjectId::new(uid),
            name: name.into(),
            display_name: display_name.into(),
            org: org.into(),
            deleted: false,
        }
    }

    /// Returns the same project marked for deletion.
    pub fn marked_deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn tenant(&self) -> TenantId {
        self.uid.tenant()
    }
}

/// Tenant lifecycle action requested for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Initialize,
    Cleanup,
}

impl Action {
    /// Add and update callbacks both derive their intent from the deleted flag.
    pub fn for_project(project: &Project) -> Self {
        if project.deleted {
            Action::Cleanup
        } else {
            Action::Initialize
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Initialize => f.write_str("InitializeTenant"),
            Action::Cleanup => f.write_str("CleanupTenant"),
        }
    }
}

/// A lifecycle event routed to the job manager.
#[derive(Debug, Clone)]
pub struct ProjectEvent {
    pub project: Project,
    pub action: Action,
}

impl ProjectEvent {
    pub fn from_project(project: Project) -> Self {
        let action = Action::for_project(&project);
        Self { project, action }
    }
}

/// Externally visible project status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    Created,
    Deleted,
}

impl From<Action> for ProjectStatus {
    fn from(action: Action) -> Self {
        match action {
            Action::Initialize => ProjectStatus::Created,
            Action::Cleanup => ProjectStatus::Deleted,
        }
    }
}

/// Snapshot entry streamed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectData {
    pub project_name: String,
    pub org_name: String,
    pub status: ProjectStatus,
}

impl ProjectData {
    pub fn new(project: &Project, action: Action) -> Self {
        Self {
            project_name: project.display_name.clone(),
            org_name: project.org.clone(),
            status: action.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub key: ProjectId,
    pub data: ProjectData,
}

/// Full snapshot pushed on every broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub projects: Vec<ProjectEntry>,
}

impl ProjectUpdate {
    pub fn get(&self, key: &ProjectId) -> Option<&ProjectData> {
        self.projects
            .iter()
            .find(|entry| &entry.key == key)
            .map(|entry| &entry.data)
    }
}
