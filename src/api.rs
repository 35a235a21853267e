//! HTTP surface of the dashboard backend.
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::aggregate::DatasetSummary;
use crate::{
    DashboardError, DashboardView, Dataset, FilterEvent, FilterQuery, FilterState, GeoFeature,
    LocationClient, WeatherClient, WeatherQuery, WeatherRequest, WeatherSummary,
};

#[derive(Clone)]
pub struct AppState {
    pub dataset: Arc<Dataset>,
    pub location: Arc<LocationClient>,
    pub weather: Arc<WeatherClient>,
}

/// Error response: the status follows the error kind, the body is
/// `{"error": message}`.
pub struct ApiError(DashboardError);

impl From<DashboardError> for ApiError {
    fn from(err: DashboardError) -> Self {
        Self(err)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(DashboardError::MalformedRequest(rejection.body_text()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(DashboardError::MalformedRequest(rejection.body_text()))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            DashboardError::ConflictingFilters
            | DashboardError::UnknownMonth(_)
            | DashboardError::InvalidCoordinates { .. }
            | DashboardError::GeospatialNotConfigured
            | DashboardError::MalformedRequest(_)
            | DashboardError::InvalidWeatherRequest(_) => StatusCode::BAD_REQUEST,
            DashboardError::NoWeatherData => StatusCode::NOT_FOUND,
            DashboardError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            DashboardError::Csv(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        } else {
            tracing::debug!("rejected request: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// API routes with state applied. Static files are mounted by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/regions", get(get_regions))
        .route("/api/summary", get(get_summary))
        .route("/api/incidents/geo", get(get_geo))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/dashboard/events", post(post_dashboard_event))
        .route("/api/location", get(get_location))
        .route("/api/weather", get(get_weather))
        .with_state(state)
}

async fn get_regions(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.dataset.regions())
}

async fn get_summary(State(state): State<AppState>) -> Json<DatasetSummary> {
    Json(state.dataset.summary())
}

#[derive(Serialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    geometry: PointGeometry,
    properties: FeatureProperties,
}

#[derive(Serialize)]
struct PointGeometry {
    #[serde(rename = "type")]
    kind: &'static str,
    coordinates: [f64; 2],
}

#[derive(Serialize)]
struct FeatureProperties {
    region: String,
    date: String,
    year: Option<i32>,
}

impl From<&GeoFeature> for Feature {
    fn from(feature: &GeoFeature) -> Self {
        Self {
            kind: "Feature",
            geometry: PointGeometry {
                kind: "Point",
                coordinates: [feature.lon, feature.lat],
            },
            properties: FeatureProperties {
                region: feature.region.clone(),
                date: feature.date.clone(),
                year: feature.year,
            },
        }
    }
}

async fn get_geo(State(state): State<AppState>) -> Json<FeatureCollection> {
    Json(FeatureCollection {
        kind: "FeatureCollection",
        features: state.dataset.geo_features().iter().map(Feature::from).collect(),
    })
}

async fn get_dashboard(
    State(state): State<AppState>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> Result<Json<DashboardView>, ApiError> {
    let Query(query) = query?;
    let filter = FilterState::try_from(query)?;
    Ok(Json(state.dataset.view(&filter)))
}

#[derive(Deserialize)]
struct EventRequest {
    #[serde(default)]
    state: FilterState,
    event: FilterEvent,
}

#[derive(Serialize)]
struct EventResponse {
    state: FilterState,
    view: DashboardView,
}

async fn post_dashboard_event(
    State(state): State<AppState>,
    request: Result<Json<EventRequest>, JsonRejection>,
) -> Result<Json<EventResponse>, ApiError> {
    let Json(request) = request?;
    let mut filter = request.state;
    filter.apply(&request.event);
    tracing::debug!("applied {:?} -> {:?}", request.event, filter);
    let view = state.dataset.view(&filter);
    Ok(Json(EventResponse { state: filter, view }))
}

#[derive(Deserialize)]
struct LocationQuery {
    lat: f64,
    lon: f64,
}

async fn get_location(
    State(state): State<AppState>,
    query: Result<Query<LocationQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(query) = query?;
    let data = state
        .location
        .fetch_location_data(query.lat, query.lon)
        .await?;
    Ok(Json(data))
}

async fn get_weather(
    State(state): State<AppState>,
    query: Result<Query<WeatherQuery>, QueryRejection>,
) -> Result<Json<WeatherSummary>, ApiError> {
    let Query(query) = query?;
    let request = WeatherRequest::try_from(query)?;
    let summary = state.weather.fetch_weather(&request).await?;
    Ok(Json(summary))
}
