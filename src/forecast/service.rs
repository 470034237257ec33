use chrono::NaiveDateTime;
use std::sync::Arc;

use super::bucket::bucket;
use super::cache::{CacheStats, ForecastBucketKey, ForecastCache};
use super::open_meteo::ForecastSource;
use super::types::{Coordinate, ForecastWindow};
use super::window::extract_window;
use super::ForecastError;

/// Entry point for the web layer: an eight-hour forecast per coordinate,
/// fetched at most once per location and forecast hour.
pub struct ForecastService {
    source: Arc<dyn ForecastSource>,
    cache: ForecastCache,
}

impl ForecastService {
    pub fn new(source: Arc<dyn ForecastSource>, cache: ForecastCache) -> Self {
        Self { source, cache }
    }

    pub async fn get_forecast(
        &self,
        coordinate: Coordinate,
        now: NaiveDateTime,
    ) -> Result<ForecastWindow, ForecastError> {
        let key = ForecastBucketKey::new(coordinate, bucket(now));

        self.cache
            .get_or_compute(key, || async move {
                let response = self.source.fetch(coordinate).await?;
                extract_window(&response)
            })
            .await
    }

    /// [`get_forecast`](Self::get_forecast) against the current UTC time.
    /// A local clock repeats an hour when daylight saving ends, which would
    /// reuse the previous bucket for a full hour.
    pub async fn get_current_forecast(
        &self,
        coordinate: Coordinate,
    ) -> Result<ForecastWindow, ForecastError> {
        self.get_forecast(coordinate, chrono::Utc::now().naive_utc())
            .await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
