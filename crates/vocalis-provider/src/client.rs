//! Voice provider API client
//!
//! Read-only client for the provider's paginated call-listing endpoint,
//! used by the reconciliation worker to learn which calls actually
//! happened upstream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, instrument};
use uuid::Uuid;
use vocalis_core::{
    config::ProviderConfig,
    models::{ProviderCall, ProviderCallPage},
    traits::CallProviderClient,
    AppError, AppResult,
};

/// HTTP client for the upstream voice provider
pub struct VoiceProviderClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

impl VoiceProviderClient {
    /// Build a client from provider configuration
    pub fn new(config: &ProviderConfig) -> AppResult<Self> {
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Provider(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_ms: config.timeout_ms,
        })
    }
}

#[async_trait]
impl CallProviderClient for VoiceProviderClient {
    #[instrument(skip(self), fields(page = page))]
    async fn list_calls(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        page: u32,
        page_size: u32,
    ) -> AppResult<ProviderCallPage> {
        let url = format!("{}/v1/calls", self.base_url);

        debug!("Listing provider calls, page {}", page);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[
                ("created_after", window_start.to_rfc3339()),
                ("created_before", window_end.to_rfc3339()),
                ("page", page.to_string()),
                ("page_size", page_size.to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!("Provider call listing timed out");
                    AppError::ProviderTimeout(self.timeout_ms)
                } else {
                    error!("Provider call listing failed: {}", e);
                    AppError::Provider(format!("Call listing request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Provider returned {}: {}", status, body);
            return Err(AppError::Provider(format!(
                "Call listing returned {}: {}",
                status, body
            )));
        }

        let page: ListCallsResponse = response.json().await.map_err(|e| {
            error!("Failed to decode provider response: {}", e);
            AppError::Provider(format!("Invalid call listing response: {}", e))
        })?;

        Ok(page.into())
    }
}

/// Wire shape of the provider's call listing
#[derive(Debug, Deserialize)]
struct ListCallsResponse {
    calls: Vec<CallDto>,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct CallDto {
    call_id: String,
    organization_id: Uuid,
    duration_seconds: i64,
    cost_usd_cents: i64,
    direction: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<ListCallsResponse> for ProviderCallPage {
    fn from(response: ListCallsResponse) -> Self {
        Self {
            calls: response.calls.into_iter().map(Into::into).collect(),
            has_more: response.has_more,
        }
    }
}

impl From<CallDto> for ProviderCall {
    fn from(dto: CallDto) -> Self {
        Self {
            external_ref: dto.call_id,
            org_id: dto.organization_id,
            duration_seconds: dto.duration_seconds,
            cost_usd_cents: dto.cost_usd_cents,
            direction: dto.direction,
            status: dto.status,
            created_at: dto.created_at,
        }
    }
}
