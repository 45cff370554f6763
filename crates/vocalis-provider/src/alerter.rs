//! Webhook alert sink
//!
//! Pushes alerts to an operator webhook. Delivery is strictly
//! best-effort: any failure is logged and swallowed so an unreachable
//! webhook can never fail a charge or a background run. Without a
//! configured URL the sink degrades to structured logging.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::{error, info, warn};
use vocalis_core::{
    config::AlertingConfig,
    models::{Alert, AlertSeverity},
    traits::AlertSink,
    AppError, AppResult,
};

/// Alert sink delivering to an HTTP webhook
pub struct WebhookAlerter {
    http_client: Client,
    webhook_url: Option<String>,
}

impl WebhookAlerter {
    /// Build a sink from alerting configuration
    pub fn new(config: &AlertingConfig) -> AppResult<Self> {
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        if config.webhook_url.is_none() {
            warn!("No alert webhook configured; alerts will be log-only");
        }

        Ok(Self {
            http_client,
            webhook_url: config.webhook_url.clone(),
        })
    }

    fn log_alert(alert: &Alert) {
        match alert.severity {
            AlertSeverity::Critical => {
                error!(details = ?alert.details, "ALERT [critical] {}", alert.title)
            }
            AlertSeverity::Warning => {
                warn!(details = ?alert.details, "ALERT [warning] {}", alert.title)
            }
            AlertSeverity::Info => {
                info!(details = ?alert.details, "ALERT [info] {}", alert.title)
            }
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlerter {
    async fn notify(&self, alert: Alert) {
        Self::log_alert(&alert);

        let url = match &self.webhook_url {
            Some(url) => url,
            None => return,
        };

        let result = self.http_client.post(url).json(&alert).send().await;

        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(
                    "Alert webhook returned {} for '{}'",
                    response.status(),
                    alert.title
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Alert webhook delivery failed for '{}': {}", alert.title, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_only_mode_swallows_everything() {
        let alerter = WebhookAlerter::new(&AlertingConfig {
            webhook_url: None,
            timeout_ms: 1000,
        })
        .unwrap();

        // Must not panic or error with no webhook configured.
        alerter
            .notify(Alert::critical("Reliability degraded").detail("reliability_pct", "0.90"))
            .await;
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_swallowed() {
        let alerter = WebhookAlerter::new(&AlertingConfig {
            webhook_url: Some("http://127.0.0.1:1/alerts".to_string()),
            timeout_ms: 200,
        })
        .unwrap();

        alerter.notify(Alert::info("Test alert")).await;
    }
}
