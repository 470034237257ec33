use serde::{Deserialize, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

use super::ForecastError;

/// Number of hourly records in every forecast window.
pub const WINDOW_HOURS: usize = 8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("Invalid latitude: {0}. Must be between -90 and 90")]
    Latitude(f64),
    #[error("Invalid longitude: {0}. Must be between -180 and 180")]
    Longitude(f64),
}

/// A WGS84 location. Equality and hashing are by exact numeric value, so the
/// same pair of numbers always maps to the same cache slot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }

        // Adding +0.0 folds -0.0 into 0.0 so both hash alike.
        Ok(Self {
            latitude: latitude + 0.0,
            longitude: longitude + 0.0,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.latitude.to_bits() == other.latitude.to_bits()
            && self.longitude.to_bits() == other.longitude.to_bits()
    }
}

// NaN is rejected by `new`, so bitwise equality is a total equivalence.
impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.latitude.to_bits().hash(state);
        self.longitude.to_bits().hash(state);
    }
}

/// One hour of forecast as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRecord {
    /// Local provider time formatted `DD-MM HH:MM`.
    pub time: String,
    pub temperature: f64,
    pub humidity: f64,
    pub precipitation: f64,
}

/// Exactly [`WINDOW_HOURS`] consecutive hourly records, earliest first.
///
/// Cloning is cheap; the records are shared behind an `Arc` so cache hits
/// hand out the very same window.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastWindow(Arc<[ForecastRecord; WINDOW_HOURS]>);

impl ForecastWindow {
    pub fn from_records(records: Vec<ForecastRecord>) -> Result<Self, ForecastError> {
        let len = records.len();
        let records: [ForecastRecord; WINDOW_HOURS] = records.try_into().map_err(|_| {
            ForecastError::MalformedResponse(format!(
                "forecast window needs {} records, got {}",
                WINDOW_HOURS, len
            ))
        })?;
        Ok(Self(Arc::new(records)))
    }

    pub fn records(&self) -> &[ForecastRecord] {
        self.0.as_slice()
    }
}

impl Deref for ForecastWindow {
    type Target = [ForecastRecord];

    fn deref(&self) -> &Self::Target {
        self.records()
    }
}

impl Serialize for ForecastWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.records().serialize(serializer)
    }
}

// Open-Meteo `/v1/forecast` payload, restricted to the fields we request.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenMeteoResponse {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
    pub current_weather: OpenMeteoCurrentWeather,
    pub hourly: OpenMeteoHourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenMeteoCurrentWeather {
    /// `YYYY-MM-DDTHH:MM` in the location's timezone.
    pub time: String,
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// Parallel arrays indexed by hour. The provider sends `null` for hours it
/// has no model output for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenMeteoHourly {
    pub time: Vec<String>,
    pub temperature_2m: Vec<Option<f64>>,
    pub relativehumidity_2m: Vec<Option<f64>>,
    pub precipitation_probability: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn record(hour: u32) -> ForecastRecord {
        ForecastRecord {
            time: format!("01-03 {:02}:00", hour),
            temperature: 20.0,
            humidity: 50.0,
            precipitation: 0.0,
        }
    }

    #[test]
    fn test_coordinate_bounds() {
        assert!(Coordinate::new(0.0, 0.0).is_ok());
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert_eq!(Coordinate::new(91.0, 0.0), Err(CoordinateError::Latitude(91.0)));
        assert_eq!(Coordinate::new(0.0, -181.0), Err(CoordinateError::Longitude(-181.0)));
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_coordinate_identity_is_numeric() {
        let mut seen = HashSet::new();
        seen.insert(Coordinate::new(33.9425, -118.408).unwrap());
        seen.insert(Coordinate::new(33.9425, -118.408).unwrap());
        seen.insert(Coordinate::new(-0.0, 0.0).unwrap());
        seen.insert(Coordinate::new(0.0, -0.0).unwrap());

        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_window_requires_exact_length() {
        let short: Vec<_> = (13..20).map(record).collect();
        assert!(matches!(
            ForecastWindow::from_records(short),
            Err(ForecastError::MalformedResponse(_))
        ));

        let full: Vec<_> = (13..21).map(record).collect();
        let window = ForecastWindow::from_records(full).unwrap();
        assert_eq!(window.len(), WINDOW_HOURS);
        assert_eq!(window[0].time, "01-03 13:00");
    }

    #[test]
    fn test_window_serializes_as_list() {
        let window = ForecastWindow::from_records((0..8).map(record).collect()).unwrap();
        let json = serde_json::to_value(&window).unwrap();

        let items = json.as_array().unwrap();
        assert_eq!(items.len(), 8);
        assert_eq!(items[7]["time"], "01-03 07:00");
        assert_eq!(items[0]["humidity"], 50.0);
    }

    #[test]
    fn test_response_accepts_null_hours() {
        let body = serde_json::json!({
            "latitude": 33.94,
            "longitude": -118.4,
            "timezone": "America/Los_Angeles",
            "current_weather": { "time": "2024-03-01T12:50", "temperature": 18.2 },
            "hourly": {
                "time": ["2024-03-01T13:00"],
                "temperature_2m": [18.5],
                "relativehumidity_2m": [60.0],
                "precipitation_probability": [null]
            }
        });

        let parsed: OpenMeteoResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.current_weather.time, "2024-03-01T12:50");
        assert_eq!(parsed.hourly.precipitation_probability, vec![None]);
    }
}
