// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP and WebSocket API over the pipeline

mod ws;

use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::models::{AnalysisResult, Source};
use crate::pipeline::{Pipeline, TestFetchOutcome};
use crate::MicroclimateError;

/// Shared application state
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/webcams", get(api_sources))
        .route("/api/webcams/:id/test", get(api_test_source))
        .route("/api/latest", get(api_latest))
        .route("/api/latest/:id", get(api_latest_for))
        .route("/ws", get(ws::ws_updates))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// API-level failures rendered as JSON
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<MicroclimateError> for ApiError {
    fn from(err: MicroclimateError) -> Self {
        match err {
            MicroclimateError::UnknownSource(id) => Self::NotFound(format!("unknown source '{}'", id)),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match self {
            Self::NotFound(msg) | Self::Internal(msg) => msg,
        };

        let body = json!({
            "error": message,
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

// === Handlers ===

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Urban Micro-Climate Map API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "webcams": "/api/webcams",
            "latest": "/api/latest",
            "websocket": "/ws",
            "health": "/health",
        }
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    active_websocket_connections: usize,
    webcams_configured: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        active_websocket_connections: state.pipeline.broadcaster().connection_count().await,
        webcams_configured: state.pipeline.sources().len(),
    })
}

async fn api_sources(State(state): State<Arc<AppState>>) -> Json<Vec<Source>> {
    Json(state.pipeline.sources().to_vec())
}

#[derive(Serialize)]
struct TestFetchResponse {
    webcam_id: String,
    status: &'static str,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    message: String,
}

async fn api_test_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TestFetchResponse>, ApiError> {
    let outcome = state.pipeline.test_fetch(&id).await?;
    let url = state
        .pipeline
        .source(&id)
        .map(|s| s.url.clone())
        .unwrap_or_default();

    let response = match outcome {
        TestFetchOutcome::Success { image_size } => TestFetchResponse {
            webcam_id: id,
            status: "success",
            url,
            image_size: Some(image_size),
            reason: None,
            message: "Successfully fetched image".to_string(),
        },
        TestFetchOutcome::Demo => TestFetchResponse {
            webcam_id: id,
            status: "demo",
            url,
            image_size: None,
            reason: None,
            message: "Synthetic source, readings are generated".to_string(),
        },
        TestFetchOutcome::Failure { reason, message } => TestFetchResponse {
            webcam_id: id,
            status: "failed",
            url,
            image_size: None,
            reason: Some(reason),
            message,
        },
    };

    Ok(Json(response))
}

#[derive(Serialize)]
struct LatestResponse {
    data: Vec<AnalysisResult>,
    count: usize,
}

async fn api_latest(State(state): State<Arc<AppState>>) -> Json<LatestResponse> {
    let mut data: Vec<AnalysisResult> = state.pipeline.latest().await.into_values().collect();
    data.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    Json(LatestResponse { count: data.len(), data })
}

async fn api_latest_for(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisResult>, ApiError> {
    state
        .pipeline
        .latest_for(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no analysis for '{}'", id)))
}

/// Bind to the configured address and serve the API until `shutdown` resolves
pub async fn start_server<F>(
    config: &ServerConfig,
    pipeline: Arc<Pipeline>,
    shutdown: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("API available at http://{}", addr);
    serve(listener, pipeline, &config.cors_origins, shutdown).await
}

/// Serve the API on an already bound listener
pub async fn serve<F>(
    listener: TcpListener,
    pipeline: Arc<Pipeline>,
    cors_origins: &[String],
    shutdown: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = Arc::new(AppState { pipeline });
    let router = create_router(state, cors_origins);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| MicroclimateError::Server(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::error::FetchFailure;
    use crate::fetcher::SourceFetcher;
    use crate::models::{SourceKind, SyntheticProfile};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use std::time::Duration;
    use tower::ServiceExt;

    struct OfflineFetcher;

    #[async_trait]
    impl SourceFetcher for OfflineFetcher {
        async fn fetch(&self, _source: &Source, _timeout: Duration) -> Result<Vec<u8>, FetchFailure> {
            Err(FetchFailure::Timeout)
        }
    }

    fn test_state() -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.sources.push(Source {
            id: "offline".to_string(),
            name: "Offline".to_string(),
            url: "http://cams.invalid/offline.jpg".to_string(),
            latitude: 1.0,
            longitude: 2.0,
            enabled: true,
            kind: SourceKind::Live,
            profile: SyntheticProfile::Neutral,
        });
        let pipeline = Pipeline::new(&config, Arc::new(OfflineFetcher));
        Arc::new(AppState { pipeline: Arc::new(pipeline) })
    }

    fn router(state: Arc<AppState>) -> Router {
        create_router(state, &AppConfig::default().server.cors_origins)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_index() {
        let (status, body) = get_json(router(test_state()), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["endpoints"]["websocket"], "/ws");
        assert_eq!(body["endpoints"]["webcams"], "/api/webcams");
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(router(test_state()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["active_websocket_connections"], 0);
        assert_eq!(body["webcams_configured"], 5);
    }

    #[tokio::test]
    async fn test_sources() {
        let (_, body) = get_json(router(test_state()), "/api/webcams").await;
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["demo_1", "demo_2", "demo_3", "webcam_1", "offline"]);
    }

    #[tokio::test]
    async fn test_latest_empty_then_filled() {
        let state = test_state();

        let (_, body) = get_json(router(state.clone()), "/api/latest").await;
        assert_eq!(body["count"], 0);

        let (status, body) = get_json(router(state.clone()), "/api/latest/demo_1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("demo_1"));
        assert_eq!(body["status"], 404);

        state.pipeline.scheduler().run_cycle(1).await;

        let (_, body) = get_json(router(state.clone()), "/api/latest").await;
        assert_eq!(body["count"], 3);
        assert_eq!(body["data"][0]["webcam_id"], "demo_1");

        let (status, body) = get_json(router(state), "/api/latest/demo_3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["provenance"], "synthetic");
    }

    #[tokio::test]
    async fn test_source_test_endpoint() {
        let state = test_state();

        let (status, body) = get_json(router(state.clone()), "/api/webcams/demo_2/test").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "demo");
        assert_eq!(body["webcam_id"], "demo_2");

        let (_, body) = get_json(router(state.clone()), "/api/webcams/offline/test").await;
        assert_eq!(body["status"], "failed");
        assert_eq!(body["reason"], "timeout");
        assert_eq!(body["url"], "http://cams.invalid/offline.jpg");

        let (status, _) = get_json(router(state), "/api/webcams/ghost/test").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let response = router(test_state())
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
    }
}
