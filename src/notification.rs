use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::*;

use crate::alert::{AlertResult, Location, Notifier};

#[derive(Serialize, Debug)]
struct AlertRequest<'a> {
    user_id: &'a str,
    latitude: f64,
    longitude: f64,
    contacts: &'a [String],
}

#[derive(Deserialize, Debug)]
struct AlertResponse {
    success: bool,
    message: String,
    contacts_notified: u32,
}

/// Emergency contact dispatch over an HTTP webhook (SMS gateway or
/// similar). Misconfiguration surfaces as an error here; the dispatcher
/// above converts it into a degraded success.
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: Option<String>,
    contacts: Vec<String>,
}

impl WebhookNotifier {
    pub fn new(endpoint: Option<String>, contacts: Vec<String>) -> Self {
        if endpoint.is_none() {
            warn!("No notification endpoint configured, alert dispatch will be degraded");
        }
        Self {
            client: reqwest::Client::new(),
            endpoint,
            contacts,
        }
    }

    /// Never report more contacts than are configured
    fn clamp_contact_count(&self, claimed: u32) -> u32 {
        claimed.min(self.contacts.len() as u32)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, user_id: &str, location: Location) -> anyhow::Result<AlertResult> {
        let endpoint = self
            .endpoint
            .as_ref()
            .context("notification endpoint not configured")?;

        let request = AlertRequest {
            user_id,
            latitude: location.latitude,
            longitude: location.longitude,
            contacts: &self.contacts,
        };

        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .context("Failed to reach notification provider")?
            .error_for_status()
            .context("Notification provider rejected the alert")?;

        let parsed: AlertResponse = response
            .json()
            .await
            .context("Failed to parse notification provider response")?;

        let contacts_notified = self.clamp_contact_count(parsed.contacts_notified);
        if contacts_notified < parsed.contacts_notified {
            debug!(
                "Provider claimed {} contacts, clamping to {}",
                parsed.contacts_notified, contacts_notified
            );
        }

        Ok(AlertResult {
            success: parsed.success,
            message: parsed.message,
            contacts_notified,
            location,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_notifier_errors() {
        let notifier = WebhookNotifier::new(None, vec!["+15550001111".to_string()]);
        let result = notifier.notify("user-1", Location::FALLBACK).await;
        assert!(result.is_err());
    }

    #[test]
    fn provider_contact_count_is_clamped_to_configured_list() {
        let notifier = WebhookNotifier::new(
            Some("http://localhost/alert".to_string()),
            vec!["+15550001111".to_string(), "+15550002222".to_string()],
        );
        // a provider claiming more contacts than exist is not believed
        assert_eq!(notifier.clamp_contact_count(5), 2);
        assert_eq!(notifier.clamp_contact_count(2), 2);
        assert_eq!(notifier.clamp_contact_count(0), 0);

        let empty = WebhookNotifier::new(Some("http://localhost/alert".to_string()), vec![]);
        assert_eq!(empty.clamp_contact_count(3), 0);
    }

    #[test]
    fn alert_request_serializes_coordinates() {
        let contacts = vec!["+15550001111".to_string()];
        let request = AlertRequest {
            user_id: "user-1",
            latitude: 40.7,
            longitude: -74.0,
            contacts: &contacts,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["user_id"], "user-1");
        assert_eq!(json["latitude"], 40.7);
        assert_eq!(json["contacts"][0], "+15550001111");
    }
}
