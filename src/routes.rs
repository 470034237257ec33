use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        Query, State,
    },
    response::Json,
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    database::{AirportMatch, Database},
    error::ApiError,
    forecast::{CacheStats, Coordinate, ForecastError, ForecastService, ForecastWindow},
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub database: Arc<Database>,
    pub forecasts: Arc<ForecastService>,
}

// Request/Response types
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub term: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub lat: f64,
    pub lon: f64,
}

/// Either a ticket number or an explicit pair of IATA codes.
#[derive(Debug, Deserialize)]
pub struct ClimateForm {
    pub num_ticket: Option<String>,
    pub origin: Option<String>,
    pub dest: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub database: String,
    pub forecast_cache: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct LocationInfo {
    pub lat: f64,
    pub lon: f64,
}

impl From<Coordinate> for LocationInfo {
    fn from(coordinate: Coordinate) -> Self {
        Self {
            lat: coordinate.latitude(),
            lon: coordinate.longitude(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub location: LocationInfo,
    pub forecast: ForecastWindow,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// Forecast for one end of a flight. A failed forecast only blanks its own
/// leg.
#[derive(Debug, Serialize)]
pub struct LegForecast {
    pub iata_code: String,
    pub location: LocationInfo,
    pub forecast: Option<ForecastWindow>,
    pub error: Option<String>,
}

impl LegForecast {
    fn new(
        iata_code: String,
        coordinate: Coordinate,
        result: Result<ForecastWindow, ForecastError>,
    ) -> Self {
        let (forecast, error) = match result {
            Ok(window) => (Some(window), None),
            Err(e) => {
                tracing::warn!("Forecast for {} failed: {}", iata_code, e);
                (None, Some("forecast unavailable".to_string()))
            }
        };

        Self {
            iata_code,
            location: coordinate.into(),
            forecast,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClimateResponse {
    pub origin: LegForecast,
    pub destination: LegForecast,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

// Route handlers
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.database.health_check().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::error!("Database health check failed: {}", e);
            "unavailable"
        }
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
        forecast_cache: state.forecasts.cache_stats(),
    })
}

pub async fn search_airports(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<AirportMatch>>, ApiError> {
    let term = params.term.unwrap_or_default();
    Ok(Json(state.database.search(&term).await?))
}

pub async fn get_forecast(
    State(state): State<AppState>,
    params: Result<Query<ForecastQuery>, QueryRejection>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(&e.body_text()))?;
    let coordinate = Coordinate::new(params.lat, params.lon)?;
    let forecast = state.forecasts.get_current_forecast(coordinate).await?;

    Ok(Json(ForecastResponse {
        location: coordinate.into(),
        forecast,
        generated_at: chrono::Utc::now(),
    }))
}

pub async fn climate(
    State(state): State<AppState>,
    form: Result<Form<ClimateForm>, FormRejection>,
) -> Result<Json<ClimateResponse>, ApiError> {
    let Form(form) = form.map_err(|e| ApiError::bad_request(&e.body_text()))?;
    let (origin, dest) = match non_empty(form.num_ticket) {
        Some(num_ticket) => {
            let route = state
                .database
                .get_ticket_iata(&num_ticket)
                .await?
                .ok_or_else(|| ApiError::not_found(&format!("Ticket not found: {}", num_ticket)))?;
            (route.origin, route.destination)
        }
        None => match (non_empty(form.origin), non_empty(form.dest)) {
            (Some(origin), Some(dest)) => (origin.to_uppercase(), dest.to_uppercase()),
            _ => {
                return Err(ApiError::bad_request(
                    "Provide num_ticket or both origin and dest",
                ))
            }
        },
    };

    let origin_coordinate = locate(&state.database, &origin).await?;
    let dest_coordinate = locate(&state.database, &dest).await?;

    let (origin_forecast, dest_forecast) = tokio::join!(
        state.forecasts.get_current_forecast(origin_coordinate),
        state.forecasts.get_current_forecast(dest_coordinate),
    );

    Ok(Json(ClimateResponse {
        origin: LegForecast::new(origin, origin_coordinate, origin_forecast),
        destination: LegForecast::new(dest, dest_coordinate, dest_forecast),
        generated_at: chrono::Utc::now(),
    }))
}

async fn locate(database: &Database, iata_code: &str) -> Result<Coordinate, ApiError> {
    database
        .get_iata_location(iata_code)
        .await?
        .ok_or_else(|| ApiError::not_found(&format!("Airport not found: {}", iata_code)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search_airports", get(search_airports))
        .route("/forecast", get(get_forecast))
        .route("/climate", post(climate))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::seeded_database;
    use crate::forecast::mock::StubForecastSource;
    use crate::forecast::ForecastCache;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::NaiveDate;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn app_with(source: StubForecastSource) -> (Router, Arc<StubForecastSource>) {
        let source = Arc::new(source);
        let state = AppState {
            database: Arc::new(seeded_database().await),
            forecasts: Arc::new(ForecastService::new(source.clone(), ForecastCache::new(16))),
        };
        (create_router(state), source)
    }

    async fn app() -> (Router, Arc<StubForecastSource>) {
        let provider_now = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 50, 0)
            .unwrap();
        app_with(StubForecastSource::new(provider_now)).await
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        read_json(resp).await
    }

    async fn post_form(app: Router, body: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/climate")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        read_json(resp).await
    }

    async fn read_json(resp: axum::response::Response) -> (StatusCode, Value) {
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health_reports_cache() {
        let (app, _) = app().await;
        let (status, body) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "ok");
        assert_eq!(body["forecast_cache"]["capacity"], 16);
    }

    #[tokio::test]
    async fn test_search_airports() {
        let (app, _) = app().await;
        let (status, body) = get_json(app.clone(), "/search_airports?term=AX").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["iata_code"], "LAX");

        let (_, empty) = get_json(app, "/search_airports").await;
        assert_eq!(empty, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_forecast_by_coordinates() {
        let (app, source) = app().await;
        let uri = "/forecast?lat=33.9425&lon=-118.408";

        let (status, body) = get_json(app.clone(), uri).await;
        assert_eq!(status, StatusCode::OK);
        let forecast = body["forecast"].as_array().unwrap();
        assert_eq!(forecast.len(), 8);
        assert_eq!(forecast[0]["time"], "01-03 13:00");
        assert_eq!(forecast[7]["time"], "01-03 20:00");

        let (status, _) = get_json(app, uri).await;
        assert_eq!(status, StatusCode::OK);
        // The second request may straddle a bucket boundary of the real clock.
        assert!(source.calls() <= 2);
    }

    #[tokio::test]
    async fn test_forecast_rejects_bad_coordinates() {
        let (app, source) = app().await;
        let (status, body) = get_json(app, "/forecast?lat=123&lon=0").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_coordinates");
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_forecast_malformed_query_is_json() {
        let (app, source) = app().await;

        for uri in ["/forecast?lat=33.9", "/forecast?lat=north&lon=0", "/forecast"] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["code"], "bad_request", "{uri}");
            assert!(body["error"].is_string(), "{uri}");
        }
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_forecast_provider_down() {
        let (app, _) = app_with(StubForecastSource::failing()).await;
        let (status, body) = get_json(app, "/forecast?lat=10&lon=10").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "forecast_unavailable");
    }

    #[tokio::test]
    async fn test_climate_by_ticket() {
        let (app, source) = app().await;
        let (status, body) = post_form(app, "num_ticket=T100").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["origin"]["iata_code"], "LAX");
        assert_eq!(body["destination"]["iata_code"], "MEX");
        assert_eq!(body["origin"]["forecast"].as_array().unwrap().len(), 8);
        assert_eq!(body["destination"]["forecast"].as_array().unwrap().len(), 8);
        assert!(body["origin"]["error"].is_null());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_climate_by_codes() {
        let (app, _) = app().await;
        let (status, body) = post_form(app, "origin=jfk&dest=LAX").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["origin"]["iata_code"], "JFK");
        assert_eq!(body["destination"]["location"]["lat"], 33.942501);
    }

    #[tokio::test]
    async fn test_climate_unknown_ticket() {
        let (app, _) = app().await;
        let (status, body) = post_form(app, "num_ticket=NOPE").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Ticket not found: NOPE");
    }

    #[tokio::test]
    async fn test_climate_unknown_airport() {
        let (app, source) = app().await;
        let (status, body) = post_form(app, "origin=LAX&dest=ZZZ").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Airport not found: ZZZ");
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_climate_requires_input() {
        let (app, _) = app().await;
        let (status, _) = post_form(app, "origin=LAX").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_climate_rejects_non_form_body() {
        let (app, _) = app().await;
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/climate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"num_ticket":"T100"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        let (status, body) = read_json(resp).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_climate_degrades_per_leg() {
        let (app, _) = app_with(StubForecastSource::failing()).await;
        let (status, body) = post_form(app, "num_ticket=T100").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["origin"]["forecast"].is_null());
        assert_eq!(body["origin"]["error"], "forecast unavailable");
        assert_eq!(body["destination"]["error"], "forecast unavailable");
    }
}
