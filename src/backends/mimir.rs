//! Metrics store (Mimir) tenant cleanup.

use super::http::TenantHttp;
use crate::config::{MimirConfig, VerifyMode};
use crate::error::TenantError;
use crate::model::TenantId;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Compactor answer for a tenant deletion.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteStatus {
    pub tenant_id: String,
    pub blocks_deleted: bool,
}

#[derive(Clone)]
pub struct MetricsStore {
    http: Arc<dyn TenantHttp>,
    config: MimirConfig,
}

impl MetricsStore {
    /// Metrics store client over `http`, addressed by `config.ingester` and `config.compactor`.
    pub fn new(http: Arc<dyn TenantHttp>, config: MimirConfig) -> Self {
        Self { http, config }
    }

    /// Flushes the ingesters and deletes the tenant's blocks.
    ///
    /// Only strict mode waits for the compactor to report the blocks deleted.
    pub async fn cleanup_tenant(&self, tenant: &TenantId) -> Result<(), TenantError> {
        info!(tenant_id = %tenant, "Deleting tenant metrics");

        self.flush_ingesters(tenant).await?;
        self.delete_metrics_request(tenant).await?;
        if self.config.delete_verify_mode == VerifyMode::Strict {
            self.check_deletion_status(tenant).await?;
        }

        info!(tenant_id = %tenant, "Tenant metrics deleted");
        Ok(())
    }

    pub async fn flush_ingesters(&self, tenant: &TenantId) -> Result<(), TenantError> {
        let url = format!("{}/ingester/flush?wait=true", self.config.ingester);
        self.http
            .get(&url, tenant)
            .await
            .map(|_| ())
            .map_err(|source| TenantError::Http {
                context: "failed to flush metrics ingesters",
                tenant: tenant.clone(),
                source,
            })
    }

    pub async fn delete_metrics_request(&self, tenant: &TenantId) -> Result<(), TenantError> {
        let url = format!("{}/compactor/delete_tenant", self.config.compactor);
        self.http
            .post(&url, tenant)
            .await
            .map_err(|source| TenantError::Http {
                context: "failed to delete metrics",
                tenant: tenant.clone(),
                source,
            })
    }

    /// Polls the compactor every `polling_rate` until the tenant's blocks are gone.
    pub async fn check_deletion_status(&self, tenant: &TenantId) -> Result<(), TenantError> {
        let url = format!("{}/compactor/delete_tenant_status", self.config.compactor);

        loop {
            let body = self
                .http
                .get(&url, tenant)
                .await
                .map_err(|source| TenantError::Http {
                    context: "failed to check metrics deletion status",
                    tenant: tenant.clone(),
                    source,
                })?;
            let status: DeleteStatus =
                serde_json::from_slice(&body).map_err(|source| TenantError::Decode {
                    what: "metrics deletion status",
                    source,
                })?;

            if status.blocks_deleted {
                return Ok(());
            }
            debug!(tenant_id = %tenant, "Metrics blocks not deleted yet");
            tokio::time::sleep(self.config.polling_rate).await;
        }
    }
}
