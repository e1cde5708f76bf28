//! Webhook notification dispatcher.
//!
//! This module provides the [`WebhookDispatcher`] struct posting alert
//! notifications as JSON to a configured HTTP endpoint, compatible with
//! generic webhook receivers like ntfy or a home automation hub.

use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::Client;
use serde_json::json;

use crate::alerts::{ArrivalAlert, ProximityAlert};
use crate::notify::NotificationDispatcher;

/// Dispatcher that posts notifications to an HTTP webhook.
pub struct WebhookDispatcher {
    /// URL the notification payloads are posted to
    url: String,
    /// HTTP client
    client: Client,
}

impl WebhookDispatcher {
    /// Create a new [WebhookDispatcher] posting to `url`.
    pub fn new(url: &str) -> Self {
        let client = reqwest::Client::new();
        WebhookDispatcher {
            url: url.to_string(),
            client,
        }
    }

    /// Posts `payload` to the webhook, logging any failure.
    async fn post(&self, payload: serde_json::Value) {
        debug!("post notification to {} -> {}", &self.url, &payload);

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!("webhook answered with status {}", response.status());
            }
            Ok(_) => debug!("notification delivered"),
            Err(e) => error!("failed to deliver notification: {}", e),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn dispatch_time_alert(&self, alert: &ArrivalAlert, qualifying_services: &[String]) {
        let services = qualifying_services.join(", ");
        let payload = json!({
            "kind": "arrival",
            "alert_id": alert.id,
            "stop": alert.stop_code,
            "services": qualifying_services,
            "message": format!(
                "Service(s) {} due at stop {} within {} minutes",
                services, alert.stop_code, alert.time_trigger
            ),
        });

        self.post(payload).await;
    }

    async fn dispatch_proximity_alert(&self, alert: &ProximityAlert) {
        let payload = json!({
            "kind": "proximity",
            "alert_id": alert.id,
            "stop": alert.stop_code,
            "message": format!("You are near stop {}", alert.stop_code),
        });

        self.post(payload).await;
    }

    async fn dispatch_monitoring_unavailable(&self, removed: &[ProximityAlert]) {
        let stops: Vec<&str> = removed.iter().map(|alert| alert.stop_code.as_str()).collect();
        let payload = json!({
            "kind": "monitoring_unavailable",
            "stops": stops,
            "message": format!(
                "Proximity monitoring is unavailable, {} alert(s) were cancelled",
                removed.len()
            ),
        });

        self.post(payload).await;
    }
}
