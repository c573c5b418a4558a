//! # Backends
//!
//! Downstream observability systems a tenant lives in. The alerting monitor and
//! the SRE exporter speak an RPC-style [`TenantService`]; the log and metrics
//! stores are driven over HTTP through [`TenantHttp`].

pub mod http;
pub mod loki;
pub mod mimir;
pub mod tenant_service;

pub use http::{ReqwestTenantHttp, TenantHttp, TENANT_HEADER};
pub use loki::LogStore;
pub use mimir::MetricsStore;
pub use tenant_service::TenantService;

use crate::config::Endpoints;
use std::sync::Arc;

/// Every backend a job fans out to.
#[derive(Clone)]
pub struct TenantBackends {
    pub alerting: Arc<dyn TenantService>,
    /// `None` when the SRE integration is disabled.
    pub sre: Option<Arc<dyn TenantService>>,
    pub logs: LogStore,
    pub metrics: MetricsStore,
}

impl TenantBackends {
    /// Builds the log and metrics stores from `endpoints` on top of a shared transport.
    pub fn new(
        endpoints: &Endpoints,
        http: Arc<dyn TenantHttp>,
        alerting: Arc<dyn TenantService>,
        sre: Option<Arc<dyn TenantService>>,
    ) -> Self {
        Self {
            alerting,
            sre,
            logs: LogStore::new(http.clone(), endpoints.loki.clone()),
            metrics: MetricsStore::new(http, endpoints.mimir.clone()),
        }
    }
}
