//! RPC-style tenant management backends (alerting monitor, SRE exporter).

use crate::error::{RpcCode, RpcError, TenantError};
use crate::model::TenantId;
use async_trait::async_trait;
use tracing::{info, instrument};

/// A backend that keeps per-tenant state and exposes init/cleanup calls.
#[async_trait]
pub trait TenantService: Send + Sync {
    /// Human readable backend name used in logs and errors.
    fn name(&self) -> &str;

    async fn initialize_tenant(&self, tenant: &TenantId) -> Result<(), RpcError>;

    async fn cleanup_tenant(&self, tenant: &TenantId) -> Result<(), RpcError>;
}

/// Provisions `tenant`; an `AlreadyExists` answer counts as success.
#[instrument(skip(service), fields(backend = service.name()))]
pub async fn initialize(service: &dyn TenantService, tenant: &TenantId) -> Result<(), TenantError> {
    info!(tenant_id = %tenant, "Creating tenant");
    match service.initialize_tenant(tenant).await {
        Ok(()) => {
            info!(tenant_id = %tenant, "Tenant initialized");
            Ok(())
        }
        Err(e) if e.code == RpcCode::AlreadyExists => {
            info!(tenant_id = %tenant, "Tenant already initialized");
            Ok(())
        }
        Err(source) => Err(TenantError::Backend {
            backend: service.name().to_string(),
            tenant: tenant.clone(),
            source,
        }),
    }
}

/// Removes `tenant`; a `NotFound` answer counts as success.
#[instrument(skip(service), fields(backend = service.name()))]
pub async fn cleanup(service: &dyn TenantService, tenant: &TenantId) -> Result<(), TenantError> {
    info!(tenant_id = %tenant, "Deleting tenant");
    match service.cleanup_tenant(tenant).await {
        Ok(()) => {
            info!(tenant_id = %tenant, "Tenant deleted");
            Ok(())
        }
        Err(e) if e.code == RpcCode::NotFound => {
            info!(tenant_id = %tenant, "Tenant already deleted");
            Ok(())
        }
        Err(source) => Err(TenantError::Backend {
            backend: service.name().to_string(),
            tenant: tenant.clone(),
            source,
        }),
    }
}
