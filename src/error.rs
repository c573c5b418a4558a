//! # Controller Errors
//!
//! Error types shared across the controller. Each collaborator boundary gets its
//! own enum so callers can match on the idempotent outcomes (already-exists,
//! not-found) explicitly, and [`TenantError`] is what a tenant action hands to the
//! retry loop.

use crate::model::TenantId;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a tenant action (one attempt of initialize or cleanup).
#[derive(Debug, Error)]
pub enum TenantError {
    /// The watcher's parent project is no longer the job's project.
    #[error("actual and job's project IDs do not match for tenant {0}")]
    IdentityMismatch(TenantId),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("watcher store error for tenant {tenant}: {source}")]
    Store {
        tenant: TenantId,
        #[source]
        source: StoreError,
    },

    #[error("{backend} failed for tenant {tenant}: {source}")]
    Backend {
        backend: String,
        tenant: TenantId,
        #[source]
        source: RpcError,
    },

    #[error("{context} for tenant {tenant}: {source}")]
    Http {
        context: &'static str,
        tenant: TenantId,
        #[source]
        source: HttpError,
    },

    #[error("backend task failed: {0}")]
    TaskFailed(String),

    #[error("failed to decode {what} response: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl TenantError {
    pub fn is_identity_mismatch(&self) -> bool {
        matches!(self, TenantError::IdentityMismatch(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TenantError::Cancelled)
    }
}

/// Outcomes of watcher-store calls.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("resource already exists")]
    AlreadyExists,
    #[error("resource not found")]
    NotFound,
    #[error("child resource not found")]
    ChildNotFound,
    #[error("resource store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Both not-found flavours mean "nothing there", which every caller treats as
    /// an idempotent outcome.
    pub fn is_absent(&self) -> bool {
        matches!(self, StoreError::NotFound | StoreError::ChildNotFound)
    }
}

/// Status codes a tenant-management backend can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCode {
    AlreadyExists,
    NotFound,
    Unavailable,
    DeadlineExceeded,
    Internal,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("rpc error {code:?}: {message}")]
pub struct RpcError {
    pub code: RpcCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum HttpError {
    #[error("failed to parse url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to reach endpoint {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("invalid response status code '{status}' for endpoint: {url}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to unmarshal: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal startup and shutdown errors of the tenant controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to create project watcher: {0}")]
    Register(#[source] StoreError),

    #[error("project watcher operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to delete project watcher: {0}")]
    Unregister(#[source] StoreError),

    #[error("job manager is not running")]
    ManagerClosed,
}
