//! Log store (Loki) tenant cleanup: flush ingesters, request deletion, then
//! wait for the deletion to be processed.

use super::http::TenantHttp;
use crate::config::{LokiConfig, VerifyMode};
use crate::error::TenantError;
use crate::model::TenantId;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One entry of the delete-requests listing.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteLogRequest {
    pub request_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub query: String,
    pub status: String,
    pub created_at: f64,
}

#[derive(Clone)]
pub struct LogStore {
    http: Arc<dyn TenantHttp>,
    config: LokiConfig,
}

impl LogStore {
    /// Log store client over `http`, addressed by `config.write` and `config.backend`.
    pub fn new(http: Arc<dyn TenantHttp>, config: LokiConfig) -> Self {
        Self { http, config }
    }

    /// Flushes the ingesters, requests deletion of every log line of `tenant`
    /// and waits until the deletion is confirmed per `deleteVerifyMode`.
    pub async fn cleanup_tenant(&self, tenant: &TenantId) -> Result<(), TenantError> {
        info!(tenant_id = %tenant, "Deleting tenant logs");

        self.flush_ingesters(tenant).await?;
        self.delete_logs_request(tenant).await?;
        self.check_deletion_status(tenant).await?;

        info!(tenant_id = %tenant, "Tenant logs deleted");
        Ok(())
    }

    pub async fn flush_ingesters(&self, tenant: &TenantId) -> Result<(), TenantError> {
        let url = format!("{}/flush", self.config.write);
        self.http
            .post(&url, tenant)
            .await
            .map_err(|source| TenantError::Http {
                context: "failed to flush log ingesters",
                tenant: tenant.clone(),
                source,
            })
    }

    pub async fn delete_logs_request(&self, tenant: &TenantId) -> Result<(), TenantError> {
        let url = format!(
            "{}/loki/api/v1/delete?query={{__tenant_id__=\"{}\"}}&start=0000000001",
            self.config.backend, tenant
        );
        self.http
            .post(&url, tenant)
            .await
            .map_err(|source| TenantError::Http {
                context: "failed to delete logs",
                tenant: tenant.clone(),
                source,
            })
    }

    /// Polls the delete-requests listing until the deletion is confirmed.
    ///
    /// Loose mode accepts any non-empty listing; strict mode waits for the newest
    /// entry to reach `processed`. An empty listing means the request was lost, so
    /// it is re-issued and the poll interval doubles up to `max_polling_rate`.
    pub async fn check_deletion_status(&self, tenant: &TenantId) -> Result<(), TenantError> {
        let url = format!("{}/loki/api/v1/delete", self.config.backend);
        let mut sleep = self.config.polling_rate;
        let mut empty_polls: u32 = 0;

        debug!(tenant_id = %tenant, "Waiting for logs deletion");
        loop {
            tokio::time::sleep(sleep).await;

            let body = self
                .http
                .get(&url, tenant)
                .await
                .map_err(|source| TenantError::Http {
                    context: "failed to check logs deletion status",
                    tenant: tenant.clone(),
                    source,
                })?;
            let requests: Vec<DeleteLogRequest> =
                serde_json::from_slice(&body).map_err(|source| TenantError::Decode {
                    what: "log deletion status",
                    source,
                })?;

            if let Some(newest) = requests.last() {
                if self.config.delete_verify_mode == VerifyMode::Loose || newest.status == "processed" {
                    return Ok(());
                }
                debug!(tenant_id = %tenant, status = %newest.status, "Logs deletion pending");
                continue;
            }

            warn!(tenant_id = %tenant, "Empty deletion status response, re-requesting deletion");
            self.delete_logs_request(tenant).await?;
            sleep = self.next_empty_poll_delay(&mut empty_polls);
        }
    }

    fn next_empty_poll_delay(&self, empty_polls: &mut u32) -> Duration {
        let calculated = self
            .config
            .polling_rate
            .checked_mul(1u32.checked_shl(*empty_polls).unwrap_or(u32::MAX))
            .unwrap_or(self.config.max_polling_rate);
        if calculated < self.config.max_polling_rate {
            *empty_polls += 1;
            calculated
        } else {
            self.config.max_polling_rate
        }
    }
}
