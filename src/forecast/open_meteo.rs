use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::types::{Coordinate, OpenMeteoResponse};
use super::ForecastError;
use crate::config::Config;

/// Hourly variables requested from the provider.
pub const HOURLY_FIELDS: &str = "temperature_2m,relativehumidity_2m,precipitation_probability";

/// Days of hourly data requested; two days always cover an eight-hour
/// window starting late in the evening.
pub const FORECAST_DAYS: u8 = 2;

/// Something that can produce a raw provider forecast for a coordinate.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch(&self, coordinate: Coordinate) -> Result<OpenMeteoResponse, ForecastError>;
}

pub struct OpenMeteoClient {
    client: Client,
    forecast_url: String,
}

impl OpenMeteoClient {
    pub fn new(config: &Config) -> Result<Self, ForecastError> {
        let client = Client::builder()
            .user_agent(concat!("FlightWeather/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| ForecastError::Unavailable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            forecast_url: config.forecast_url(),
        })
    }

    fn query(coordinate: Coordinate) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", coordinate.latitude().to_string()),
            ("longitude", coordinate.longitude().to_string()),
            ("forecast_days", FORECAST_DAYS.to_string()),
            ("timezone", "auto".to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
            ("current_weather", "true".to_string()),
        ]
    }
}

#[async_trait]
impl ForecastSource for OpenMeteoClient {
    async fn fetch(&self, coordinate: Coordinate) -> Result<OpenMeteoResponse, ForecastError> {
        tracing::debug!(
            lat = coordinate.latitude(),
            lon = coordinate.longitude(),
            "Requesting Open-Meteo forecast"
        );

        let response = self
            .client
            .get(&self.forecast_url)
            .query(&Self::query(coordinate))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Open-Meteo request failed: {}", e);
                ForecastError::Unavailable(format!("request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Open-Meteo returned HTTP {}", status);
            let excerpt: String = body.chars().take(200).collect();
            return Err(ForecastError::Unavailable(format!("HTTP {}: {}", status, excerpt)));
        }

        let body: Value = response.json().await.map_err(|e| {
            tracing::warn!("Open-Meteo body is not JSON: {}", e);
            ForecastError::Unavailable(format!("undecodable body: {}", e))
        })?;

        serde_json::from_value(body)
            .map_err(|e| ForecastError::MalformedResponse(format!("unexpected body: {}", e)))
    }
}
