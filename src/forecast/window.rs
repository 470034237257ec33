use chrono::{Duration, NaiveDateTime};

use super::bucket::canonical_hour;
use super::types::{ForecastRecord, ForecastWindow, OpenMeteoResponse, WINDOW_HOURS};
use super::ForecastError;

/// Timestamp format used by the provider for `current_weather.time` and
/// `hourly.time`.
pub const PROVIDER_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Format of [`ForecastRecord::time`].
pub const DISPLAY_TIME_FORMAT: &str = "%d-%m %H:%M";

/// Slices the eight hours starting at the provider's canonical current hour
/// out of a forecast response.
pub fn extract_window(response: &OpenMeteoResponse) -> Result<ForecastWindow, ForecastError> {
    let reported = &response.current_weather.time;
    let reported_at = NaiveDateTime::parse_from_str(reported, PROVIDER_TIME_FORMAT).map_err(|e| {
        ForecastError::MalformedResponse(format!(
            "current_weather.time {:?} is not a provider timestamp: {}",
            reported, e
        ))
    })?;

    let start = canonical_hour(reported_at).ok_or_else(|| {
        ForecastError::MalformedResponse(format!("current_weather.time {:?} is out of range", reported))
    })?;
    let needle = start.format(PROVIDER_TIME_FORMAT).to_string();

    let hourly = &response.hourly;
    let index = hourly
        .time
        .iter()
        .position(|t| *t == needle)
        .ok_or_else(|| {
            ForecastError::MalformedResponse(format!("hour {} missing from hourly.time", needle))
        })?;

    trailing(&hourly.time, index, "time")?;
    let temperatures = trailing(&hourly.temperature_2m, index, "temperature_2m")?;
    let humidities = trailing(&hourly.relativehumidity_2m, index, "relativehumidity_2m")?;
    let precipitation = trailing(
        &hourly.precipitation_probability,
        index,
        "precipitation_probability",
    )?;

    let records = (0..WINDOW_HOURS)
        .map(|step| {
            let at = start
                .checked_add_signed(Duration::hours(step as i64))
                .ok_or_else(|| {
                    ForecastError::MalformedResponse(format!(
                        "window from {} runs past the last representable date",
                        needle
                    ))
                })?;
            Ok(ForecastRecord {
                time: at.format(DISPLAY_TIME_FORMAT).to_string(),
                temperature: required(temperatures[step], "temperature_2m", &at)?,
                humidity: required(humidities[step], "relativehumidity_2m", &at)?,
                precipitation: required(precipitation[step], "precipitation_probability", &at)?,
            })
        })
        .collect::<Result<Vec<_>, ForecastError>>()?;

    ForecastWindow::from_records(records)
}

fn trailing<'a, T>(values: &'a [T], index: usize, field: &str) -> Result<&'a [T], ForecastError> {
    values.get(index..index + WINDOW_HOURS).ok_or_else(|| {
        ForecastError::MalformedResponse(format!(
            "hourly.{} has {} entries, need {} from index {}",
            field,
            values.len(),
            WINDOW_HOURS,
            index
        ))
    })
}

fn required(value: Option<f64>, field: &str, at: &NaiveDateTime) -> Result<f64, ForecastError> {
    value.ok_or_else(|| {
        ForecastError::MalformedResponse(format!(
            "hourly.{} is null at {}",
            field,
            at.format(PROVIDER_TIME_FORMAT)
        ))
    })
}
