use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{DateTime, FixedOffset, Local};
use h3o::Resolution;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::dataset::{DatasetError, IncidentSet, IncidentStore};
use crate::density::{DensityCell, IncidentDensity};
use crate::model::{RouteGeometry, ScoreBreakdown};
use crate::osrm::OsrmRoute;
use crate::scoring::{SafetyBand, assess_route};

// Shared State for concurrency
pub struct AppState {
    pub config: AppConfig,
    pub incidents: IncidentStore,
}

impl AppState {
    pub fn new(config: AppConfig, incidents: IncidentSet) -> Self {
        Self {
            config,
            incidents: IncidentStore::new(incidents),
        }
    }
}

pub fn build_app(state: Arc<AppState>) -> Router {
    // Allows a local HTML page to talk to this API
    let cors = CorsLayer::new()
        .allow_methods(tower_http::cors::Any)
        .allow_origin(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/route/score", post(score_route))
        .route("/incidents", get(incident_summary))
        .route("/incidents/geojson", put(replace_with_geojson))
        .route("/incidents/records", put(replace_with_records))
        .route("/incidents/density", get(incident_density))
        .layer(cors)
        .with_state(state)
}

// --- Errors ---

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Dataset(DatasetError::Io(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
            ApiError::Dataset(_) => (StatusCode::BAD_REQUEST, "invalid_dataset"),
        };
        tracing::warn!(error = %self, code, "request rejected");

        let body = ErrorEnvelope {
            error: ErrorBody {
                code,
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

// --- API DTOs ---

#[derive(Deserialize)]
pub struct ScoreRequest {
    route: OsrmRoute,
    threshold_meters: Option<f64>,
    /// RFC 3339; the hour is read in its own offset. Defaults to server local time.
    departure: Option<DateTime<FixedOffset>>,
}

#[derive(Serialize)]
pub struct ScoreResponse {
    score: u8,
    band: SafetyBand,
    breakdown: ScoreBreakdown,
    intensity: u32,
    total_distance: f64,
    total_duration: f64,
    step_count: usize,
}

#[derive(Serialize)]
pub struct DatasetSummary {
    source: String,
    count: usize,
    dropped: usize,
}

impl From<&IncidentSet> for DatasetSummary {
    fn from(set: &IncidentSet) -> Self {
        Self {
            source: set.source.clone(),
            count: set.len(),
            dropped: set.dropped,
        }
    }
}

#[derive(Deserialize)]
pub struct DensityQuery {
    resolution: Option<u8>,
}

#[derive(Serialize)]
pub struct DensityResponse {
    resolution: u8,
    total: usize,
    cells: Vec<DensityCell>,
}

// --- Handlers ---

async fn score_route(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let Json(payload) = payload?;
    let threshold = payload
        .threshold_meters
        .unwrap_or(state.config.threshold_meters);
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(ApiError::BadRequest(
            "threshold_meters must be a non-negative number".to_string(),
        ));
    }

    let route = RouteGeometry::from(payload.route);
    if route.coordinates.len() < 2 {
        return Err(ApiError::BadRequest(
            "route geometry needs at least two coordinates".to_string(),
        ));
    }

    // One snapshot for the whole computation
    let incidents = state.incidents.snapshot();
    let assessment = match payload.departure {
        Some(departure) => assess_route(&route, &incidents.incidents, threshold, &departure),
        None => assess_route(&route, &incidents.incidents, threshold, &Local::now()),
    };

    tracing::debug!(
        score = assessment.score,
        base = assessment.breakdown.base_score,
        crimes_near = assessment.breakdown.crimes_near,
        threshold,
        "scored route"
    );

    Ok(Json(ScoreResponse {
        score: assessment.score,
        band: assessment.band,
        breakdown: assessment.breakdown,
        intensity: assessment.intensity,
        total_distance: route.distance,
        total_duration: route.duration,
        step_count: route.step_count(),
    }))
}

async fn incident_summary(State(state): State<Arc<AppState>>) -> Json<DatasetSummary> {
    Json(DatasetSummary::from(state.incidents.snapshot().as_ref()))
}

async fn replace_with_geojson(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<DatasetSummary>, ApiError> {
    // Parse fully before touching the store so a bad upload keeps the old data
    let set = IncidentSet::from_geojson_str(&body, "upload:geojson")?;
    Ok(Json(install(&state, set)))
}

async fn replace_with_records(
    State(state): State<Arc<AppState>>,
    records: Result<Json<Vec<Value>>, JsonRejection>,
) -> Result<Json<DatasetSummary>, ApiError> {
    let Json(records) = records?;
    let set = IncidentSet::from_records(&records, state.config.zero_coordinates, "upload:records");
    Ok(Json(install(&state, set)))
}

fn install(state: &AppState, set: IncidentSet) -> DatasetSummary {
    let summary = DatasetSummary::from(&set);
    let previous = state.incidents.replace(set);
    tracing::info!(
        source = %summary.source,
        count = summary.count,
        dropped = summary.dropped,
        replaced = previous.len(),
        "incident dataset replaced"
    );
    summary
}

async fn incident_density(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DensityQuery>, QueryRejection>,
) -> Result<Json<DensityResponse>, ApiError> {
    let Query(query) = query?;
    let resolution = match query.resolution {
        Some(r) => Resolution::try_from(r).map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => state.config.density_resolution,
    };

    let incidents = state.incidents.snapshot();
    let density = IncidentDensity::from_incidents(&incidents.incidents, resolution);

    Ok(Json(DensityResponse {
        resolution: u8::from(density.resolution()),
        total: density.total(),
        cells: density.cells(),
    }))
}

#[cfg(test)]
mod tests {
    use std::env::VarError;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::config::build_config;

    // Two incidents on the route's end points, one across town
    const INCIDENTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [-95.3698, 29.7604]},
             "properties": {"type": "Theft"}},
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [-95.3652, 29.7569]},
             "properties": {"type": "Assault"}},
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [-95.4613, 29.7380]},
             "properties": {"type": "Robbery"}}
        ]
    }"#;

    fn test_state() -> Arc<AppState> {
        let config = build_config(|_| Err(VarError::NotPresent)).expect("default config");
        let incidents = IncidentSet::from_geojson_str(INCIDENTS, "test").expect("fixture");
        Arc::new(AppState::new(config, incidents))
    }

    fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    fn downtown_route() -> Value {
        json!({
            "geometry": {
                "type": "LineString",
                "coordinates": [[-95.3698, 29.7604], [-95.3675, 29.7588], [-95.3652, 29.7569]]
            },
            "distance": 612.4,
            "duration": 440.9,
            "legs": [{"steps": [
                {
                    "distance": 300.0,
                    "duration": 216.0,
                    "name": "Main Street",
                    "maneuver": {"instruction": "Head south"}
                },
                {
                    "distance": 312.4,
                    "duration": 224.9,
                    "name": "",
                    "maneuver": {"type": "arrive"}
                }
            ]}]
        })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_app(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn scores_a_daytime_route() {
        let app = build_app(test_state());
        let (status, json) = send(
            app,
            json_request(
                Method::POST,
                "/route/score",
                &json!({"route": downtown_route(), "departure": "2025-10-01T14:00:00-05:00"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["breakdown"]["base_score"], 8);
        assert_eq!(json["breakdown"]["crimes_near"], 2);
        assert_eq!(json["breakdown"]["crime_penalty"], 1);
        assert_eq!(json["score"], 7);
        assert_eq!(json["band"], "warn");
        assert_eq!(json["intensity"], 16);
        assert_eq!(json["step_count"], 2);
    }

    #[tokio::test]
    async fn night_departure_and_custom_threshold() {
        let app = build_app(test_state());
        let (status, json) = send(
            app,
            json_request(
                Method::POST,
                "/route/score",
                &json!({
                    "route": downtown_route(),
                    "departure": "2025-10-01T23:30:00-05:00",
                    "threshold_meters": 20000.0
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["breakdown"]["base_score"], 6);
        assert_eq!(json["breakdown"]["crimes_near"], 3);
        assert_eq!(json["score"], 4);
        assert_eq!(json["band"], "bad");
    }

    #[tokio::test]
    async fn rejects_degenerate_routes_and_thresholds() {
        let state = test_state();

        let mut single = downtown_route();
        single["geometry"]["coordinates"] = json!([[-95.3698, 29.7604]]);
        let (status, json) = send(
            build_app(Arc::clone(&state)),
            json_request(Method::POST, "/route/score", &json!({"route": single})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");

        let (status, _) = send(
            build_app(state),
            json_request(
                Method::POST,
                "/route/score",
                &json!({"route": downtown_route(), "threshold_meters": -1.0}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_bodies_get_the_error_envelope() {
        let state = test_state();

        // Route without geometry fails deserialization
        let (status, json) = send(
            build_app(Arc::clone(&state)),
            json_request(Method::POST, "/route/score", &json!({"route": {"distance": 5}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");
        assert!(json["error"]["message"].as_str().is_some_and(|m| !m.is_empty()));

        // Not JSON at all
        let request = Request::builder()
            .method(Method::POST)
            .uri("/route/score")
            .header("content-type", "application/json")
            .body(Body::from("{\"route\":"))
            .expect("request");
        let (status, json) = send(build_app(Arc::clone(&state)), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");

        // Missing content type
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/incidents/records")
            .body(Body::from("[]"))
            .expect("request");
        let (status, json) = send(build_app(Arc::clone(&state)), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");

        // Records must be an array
        let (status, json) = send(
            build_app(Arc::clone(&state)),
            json_request(Method::PUT, "/incidents/records", &json!({"lat": 29.7})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");
        assert_eq!(state.incidents.snapshot().source, "test");

        let (status, json) = send(
            build_app(state),
            Request::builder()
                .uri("/incidents/density?resolution=fine")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn records_upload_replaces_dataset() {
        let state = test_state();
        let records = json!([
            {"location": {"coordinates": [-95.36, 29.75]}, "offense": "theft"},
            {"latitude": "29.76", "longitude": "-95.37"},
            {"point": "(29.77, -95.38)"},
            {"lat": 0, "lng": -95.36},
            {"offense": "no location"}
        ]);

        let (status, json) = send(
            build_app(Arc::clone(&state)),
            json_request(Method::PUT, "/incidents/records", &records),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 3);
        assert_eq!(json["dropped"], 2);

        let (status, json) = send(
            build_app(state),
            Request::builder().uri("/incidents").body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["source"], "upload:records");
        assert_eq!(json["count"], 3);
    }

    #[tokio::test]
    async fn bad_geojson_keeps_previous_dataset() {
        let state = test_state();

        let request = Request::builder()
            .method(Method::PUT)
            .uri("/incidents/geojson")
            .body(Body::from("{\"type\": \"FeatureCollection\""))
            .expect("request");
        let (status, json) = send(build_app(Arc::clone(&state)), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "invalid_dataset");

        assert_eq!(state.incidents.snapshot().source, "test");
        assert_eq!(state.incidents.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn geojson_upload_replaces_dataset() {
        let state = test_state();
        let collection = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [-95.0, 29.0]},
                    "properties": {}
                }
            ]
        });

        let (status, json) = send(
            build_app(Arc::clone(&state)),
            json_request(Method::PUT, "/incidents/geojson", &collection),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);
        assert_eq!(state.incidents.snapshot().source, "upload:geojson");
    }

    #[tokio::test]
    async fn density_overlay() {
        let state = test_state();

        let (status, json) = send(
            build_app(Arc::clone(&state)),
            Request::builder()
                .uri("/incidents/density")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["resolution"], 9);
        assert_eq!(json["total"], 3);
        assert_eq!(json["cells"].as_array().expect("cells").len(), 3);

        let (status, json) = send(
            build_app(Arc::clone(&state)),
            Request::builder()
                .uri("/incidents/density?resolution=7")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["resolution"], 7);
        assert_eq!(json["total"], 3);

        let (status, json) = send(
            build_app(state),
            Request::builder()
                .uri("/incidents/density?resolution=99")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");
    }
}
