//! HTTP transport for the log and metrics stores.
//!
//! Every request carries the tenant in the `X-Scope-OrgID` header and only
//! `200 OK` / `204 No Content` count as success.

use crate::error::HttpError;
use crate::model::TenantId;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

pub const TENANT_HEADER: &str = "X-Scope-OrgID";

#[async_trait]
pub trait TenantHttp: Send + Sync {
    async fn post(&self, url: &str, tenant: &TenantId) -> Result<(), HttpError>;

    async fn get(&self, url: &str, tenant: &TenantId) -> Result<Vec<u8>, HttpError>;
}

/// [`TenantHttp`] backed by `reqwest`.
#[derive(Clone, Default)]
pub struct ReqwestTenantHttp {
    client: Client,
}

impl ReqwestTenantHttp {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &Url) -> Result<reqwest::Response, HttpError> {
        let response = request.send().await.map_err(|e| HttpError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(response),
            status => Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl TenantHttp for ReqwestTenantHttp {
    async fn post(&self, url: &str, tenant: &TenantId) -> Result<(), HttpError> {
        let url = parse_url(url)?;
        let request = self
            .client
            .post(url.clone())
            .header(TENANT_HEADER, tenant.as_str());
        self.send(request, &url).await.map(|_| ())
    }

    async fn get(&self, url: &str, tenant: &TenantId) -> Result<Vec<u8>, HttpError> {
        let url = parse_url(url)?;
        let request = self
            .client
            .get(url.clone())
            .header(TENANT_HEADER, tenant.as_str());
        let response = self.send(request, &url).await?;
        let body = response.bytes().await.map_err(|e| HttpError::Transport {
            url: url.to_string(),
            reason: format!("failed to read response body: {e}"),
        })?;
        Ok(body.to_vec())
    }
}

fn parse_url(raw: &str) -> Result<Url, HttpError> {
    Url::parse(raw).map_err(|e| HttpError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}
