//! Payment gateway client
//!
//! Collects auto-recharge top-ups against a stored payment method. A
//! decline is a normal outcome; only transport and gateway faults are
//! errors. The gateway deduplicates on the idempotency key header, so a
//! retried collection charges the card at most once.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, instrument};
use uuid::Uuid;
use vocalis_core::{
    config::PaymentsConfig,
    traits::{PaymentOutcome, PaymentProcessor},
    AppError, AppResult,
};

/// HTTP client for the payment gateway
pub struct PaymentGatewayClient {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl PaymentGatewayClient {
    /// Build a client from payments configuration
    pub fn new(config: &PaymentsConfig) -> AppResult<Self> {
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| AppError::Payment(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChargeRequest<'a> {
    organization_id: Uuid,
    payment_method: &'a str,
    amount_pence: i64,
    currency: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    status: String,
    #[serde(default)]
    payment_ref: Option<String>,
    #[serde(default)]
    decline_reason: Option<String>,
}

#[async_trait]
impl PaymentProcessor for PaymentGatewayClient {
    #[instrument(skip(self, payment_method_ref), fields(org_id = %org_id))]
    async fn collect(
        &self,
        org_id: Uuid,
        payment_method_ref: &str,
        amount_pence: i64,
        idempotency_key: &str,
    ) -> AppResult<PaymentOutcome> {
        let url = format!("{}/v1/charges", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(&ChargeRequest {
                organization_id: org_id,
                payment_method: payment_method_ref,
                amount_pence,
                currency: "GBP",
            })
            .send()
            .await
            .map_err(|e| {
                error!("Payment collection failed: {}", e);
                AppError::Payment(format!("Charge request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Payment gateway returned {}: {}", status, body);
            return Err(AppError::Payment(format!(
                "Charge returned {}: {}",
                status, body
            )));
        }

        let charge: ChargeResponse = response.json().await.map_err(|e| {
            error!("Failed to decode charge response: {}", e);
            AppError::Payment(format!("Invalid charge response: {}", e))
        })?;

        match charge.status.as_str() {
            "succeeded" => {
                let payment_ref = charge
                    .payment_ref
                    .ok_or_else(|| AppError::Payment("Charge succeeded without a ref".to_string()))?;
                info!("Collected {}p for org {} ({})", amount_pence, org_id, payment_ref);
                Ok(PaymentOutcome::Collected { payment_ref })
            }
            "declined" => Ok(PaymentOutcome::Declined {
                reason: charge
                    .decline_reason
                    .unwrap_or_else(|| "unspecified".to_string()),
            }),
            other => Err(AppError::Payment(format!(
                "Unexpected charge status: {}",
                other
            ))),
        }
    }
}
