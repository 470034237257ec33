pub mod bucket;
pub mod cache;
#[cfg(test)]
pub mod mock;
pub mod open_meteo;
pub mod service;
pub mod types;
pub mod window;

use thiserror::Error;

pub use cache::{CacheStats, ForecastBucketKey, ForecastCache};
pub use open_meteo::{ForecastSource, OpenMeteoClient};
pub use service::ForecastService;
pub use types::{Coordinate, CoordinateError, ForecastRecord, ForecastWindow};

/// Why a forecast window could not be produced. Neither variant is ever
/// cached.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("Forecast unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed forecast response: {0}")]
    MalformedResponse(String),
}
