// SPDX-License-Identifier: GPL-3.0-or-later
pub mod handlers;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use handlers::scans::{
    create_scan, ErrorResponse, ScanResponse, SongResponse, __path_create_scan,
};
use serde::Serialize;
use songscout_config::AppConfig;
use songscout_pipeline::{Pipeline, PipelineError};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Build state with an ffmpeg-backed pipeline and the configured recognition service.
    pub fn from_config(config: AppConfig) -> Result<Self, PipelineError> {
        let pipeline = Pipeline::from_config(&config)?;
        Ok(Self::new(config, pipeline))
    }

    pub fn on_start(&self) {
        info!(
            target: "api",
            fragment_secs = self.config.media.fragment_duration_secs,
            max_concurrent = self.config.recognition.max_concurrent_requests,
            "application state initialized"
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
struct HealthResponse {
    status: &'static str,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(OpenApi)]
#[openapi(
    paths(health, create_scan),
    components(schemas(HealthResponse, ScanResponse, SongResponse, ErrorResponse)),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "scans", description = "Song detection in uploaded videos")
    ),
    info(
        title = "SongScout API",
        version = "0.1.0",
        description = "Detect the songs playing in a video",
    )
)]
struct ApiDoc;

pub fn router(state: AppState) -> Router {
    info!(target: "api", "building router");

    let body_limit = usize::try_from(state.config.upload.max_size_bytes).unwrap_or(usize::MAX);

    let api_v1 = Router::new()
        .route("/scans", post(create_scan))
        .layer(DefaultBodyLimit::max(body_limit));

    let openapi = ApiDoc::openapi();

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", openapi))
        .with_state(state)
}
