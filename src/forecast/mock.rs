use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Timelike};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::open_meteo::{ForecastSource, FORECAST_DAYS};
use super::types::{Coordinate, OpenMeteoCurrentWeather, OpenMeteoHourly, OpenMeteoResponse};
use super::window::PROVIDER_TIME_FORMAT;
use super::ForecastError;

/// In-process stand-in for the Open-Meteo API that counts its calls.
pub struct StubForecastSource {
    current_time: NaiveDateTime,
    series_start: NaiveDateTime,
    fail: bool,
    calls: AtomicUsize,
}

impl StubForecastSource {
    /// Provider reporting `current_time`, with hourly data from that day's
    /// midnight on.
    pub fn new(current_time: NaiveDateTime) -> Self {
        let midnight = current_time
            - Duration::hours(i64::from(current_time.hour()))
            - Duration::minutes(i64::from(current_time.minute()));
        Self::with_series(current_time, midnight)
    }

    pub fn with_series(current_time: NaiveDateTime, series_start: NaiveDateTime) -> Self {
        Self {
            current_time,
            series_start,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Provider that is always down.
    pub fn failing() -> Self {
        let epoch = NaiveDateTime::default();
        Self {
            fail: true,
            ..Self::with_series(epoch, epoch)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForecastSource for StubForecastSource {
    async fn fetch(&self, coordinate: Coordinate) -> Result<OpenMeteoResponse, ForecastError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ForecastError::Unavailable("stub provider is down".to_string()));
        }

        let mut response = generate_mock_response(
            self.current_time,
            self.series_start,
            usize::from(FORECAST_DAYS) * 24,
        );
        response.latitude = Some(coordinate.latitude());
        response.longitude = Some(coordinate.longitude());
        Ok(response)
    }
}

// Realistic-looking provider payload with a diurnal temperature curve.
pub fn generate_mock_response(
    current_time: NaiveDateTime,
    series_start: NaiveDateTime,
    hours: usize,
) -> OpenMeteoResponse {
    let times: Vec<NaiveDateTime> = (0..hours)
        .map(|hour| series_start + Duration::hours(hour as i64))
        .collect();

    let temperature_2m = times
        .iter()
        .map(|t| {
            let phase = (f64::from(t.hour()) - 9.0) * std::f64::consts::PI / 12.0;
            Some(18.0 + 7.0 * phase.sin())
        })
        .collect();
    let relativehumidity_2m = times
        .iter()
        .map(|t| {
            let phase = (f64::from(t.hour()) - 15.0) * std::f64::consts::PI / 12.0;
            Some((65.0 - 20.0 * phase.sin()).clamp(20.0, 100.0))
        })
        .collect();
    let precipitation_probability = times
        .iter()
        .map(|_| Some((fastrand::f64() * 100.0).round()))
        .collect();

    OpenMeteoResponse {
        latitude: None,
        longitude: None,
        timezone: Some("GMT".to_string()),
        current_weather: OpenMeteoCurrentWeather {
            time: current_time.format(PROVIDER_TIME_FORMAT).to_string(),
            temperature: Some(18.0),
        },
        hourly: OpenMeteoHourly {
            time: times
                .iter()
                .map(|t| t.format(PROVIDER_TIME_FORMAT).to_string())
                .collect(),
            temperature_2m,
            relativehumidity_2m,
            precipitation_probability,
        },
    }
}
