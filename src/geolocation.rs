use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::*;

use crate::alert::{Location, LocationError, Locator};

#[derive(Deserialize, Debug)]
struct GeoResponse {
    #[serde(alias = "lat")]
    latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    longitude: f64,
}

/// Coarse location over an HTTP geolocation endpoint.
/// Accuracy is whatever the provider gives us; for the safety workflow a
/// rough position beats no position.
pub struct HttpLocator {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpLocator {
    pub fn new(endpoint: Option<String>) -> Self {
        if endpoint.is_none() {
            warn!("No geolocation endpoint configured, alerts will use the fallback location");
        }
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl Locator for HttpLocator {
    async fn locate(&self) -> Result<Location, LocationError> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or(LocationError::PositionUnavailable)?;

        let response = self.client.get(endpoint).send().await.map_err(|e| {
            debug!("Geolocation request failed: {:?}", e);
            if e.is_timeout() {
                LocationError::Timeout
            } else {
                LocationError::PositionUnavailable
            }
        })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(LocationError::PermissionDenied)
            }
            status if !status.is_success() => {
                debug!("Geolocation endpoint returned {}", status);
                return Err(LocationError::PositionUnavailable);
            }
            _ => {}
        }

        let geo: GeoResponse = response
            .json()
            .await
            .map_err(|_| LocationError::PositionUnavailable)?;

        Ok(Location {
            latitude: geo.latitude,
            longitude: geo.longitude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_endpoint_is_position_unavailable() {
        let locator = HttpLocator::new(None);
        assert_eq!(
            locator.locate().await,
            Err(LocationError::PositionUnavailable)
        );
    }

    #[test]
    fn provider_field_aliases_are_accepted() {
        let geo: GeoResponse = serde_json::from_str(r#"{"lat": 51.5, "lon": -0.12}"#).unwrap();
        assert!((geo.latitude - 51.5).abs() < f64::EPSILON);
        assert!((geo.longitude + 0.12).abs() < f64::EPSILON);
    }
}
