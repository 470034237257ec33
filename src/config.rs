use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::forecast::cache::DEFAULT_CAPACITY;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub open_meteo_base_url: String,
    pub open_meteo_forecast_path: String,
    pub forecast_cache_capacity: u64,
    pub http_timeout_secs: u64,
    pub airports_csv_url: String,
    pub tickets_csv_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite:./flight_weather.db".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            open_meteo_base_url: "https://api.open-meteo.com".to_string(),
            open_meteo_forecast_path: "/v1/forecast".to_string(),
            forecast_cache_capacity: DEFAULT_CAPACITY,
            http_timeout_secs: 10,
            airports_csv_url: "https://davidmegginson.github.io/ourairports-data/airports.csv"
                .to_string(),
            tickets_csv_path: "./tickets.csv".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        Ok(Config {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            open_meteo_base_url: env::var("OPEN_METEO_BASE_URL")
                .unwrap_or(defaults.open_meteo_base_url),
            open_meteo_forecast_path: env::var("OPEN_METEO_FORECAST_PATH")
                .unwrap_or(defaults.open_meteo_forecast_path),
            forecast_cache_capacity: parse_number(
                "FORECAST_CACHE_CAPACITY",
                env::var("FORECAST_CACHE_CAPACITY").ok(),
                defaults.forecast_cache_capacity,
            )?,
            http_timeout_secs: parse_number(
                "HTTP_TIMEOUT_SECS",
                env::var("HTTP_TIMEOUT_SECS").ok(),
                defaults.http_timeout_secs,
            )?,
            airports_csv_url: env::var("AIRPORTS_CSV_URL").unwrap_or(defaults.airports_csv_url),
            tickets_csv_path: env::var("TICKETS_CSV_PATH").unwrap_or(defaults.tickets_csv_path),
        })
    }

    pub fn forecast_url(&self) -> String {
        format!(
            "{}{}",
            self.open_meteo_base_url.trim_end_matches('/'),
            self.open_meteo_forecast_path
        )
    }
}

fn parse_number<T>(name: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be a number, got {:?}: {}", name, value, e)),
    }
}
