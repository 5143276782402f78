//! HTTP routes and handlers for the flash daemon API.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::session::ClientSession;
use super::state::{AppState, LastBuild};
use super::websocket::websocket_handler;
use flash_core::{boards, BoardProfile, BuildRequest, ErrorKind, PipelineFailure, SessionConfig};

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);

    Router::new()
        // Health and status
        .route("/health", get(health))
        .route("/status", get(status))
        // Session configuration
        .route("/target", post(select_target))
        .route("/saveBoardSelected", post(select_target)) // Alias for the block editor form
        .route("/destination", post(set_destination))
        .route("/setBoardLetter", post(set_destination)) // Alias for the block editor form
        .route("/session", get(get_session))
        .route("/boards", get(list_boards))
        // Build and deploy
        .route("/build", post(submit_build))
        .route("/writeFile", post(submit_build)) // Alias for the block editor form
        // WebSocket for live build progress
        .route("/live", get(websocket_handler))
        .route("/ws", get(websocket_handler))
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    duration_ms: u64,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T, duration_ms: u64) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            duration_ms,
        })
    }
}

/// Body returned when a build ends in `Failed`.
#[derive(Serialize)]
struct BuildFailureResponse {
    success: bool,
    error: String,
    build_id: String,
    stage: String,
    kind: ErrorKind,
    log_tail: Option<String>,
    duration_ms: u64,
}

fn failure_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ConfigMissing => StatusCode::CONFLICT,
        ErrorKind::BuildFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::IoError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure_response(failure: PipelineFailure, duration_ms: u64) -> Response {
    let status = failure_status(failure.kind);
    let body = BuildFailureResponse {
        success: false,
        error: failure.message,
        build_id: failure.build_id.to_string(),
        stage: failure.stage.to_string(),
        kind: failure.kind,
        log_tail: failure.log_tail,
        duration_ms,
    };
    (status, Json(body)).into_response()
}

// =============================================================================
// Health & Status
// =============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "flashd"
    }))
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    workspace: String,
    toolchain: String,
    timeout_secs: u64,
    sessions: usize,
    builds_total: u64,
    builds_failed: u64,
    last_build: Option<LastBuild>,
    connections: usize,
    uptime_seconds: f64,
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let start = Instant::now();
    let pipeline = &state.pipeline;

    let data = StatusResponse {
        status: "running".to_string(),
        workspace: pipeline.workspace().root().display().to_string(),
        toolchain: pipeline.toolchain().program().to_string(),
        timeout_secs: pipeline.toolchain().timeout().as_secs(),
        sessions: state.sessions.len().await,
        builds_total: state.stats.total(),
        builds_failed: state.stats.failed(),
        last_build: state.stats.last().await,
        connections: state.ws_connection_count(),
        uptime_seconds: state.uptime_seconds(),
    };

    ApiResponse::ok(data, start.elapsed().as_millis() as u64)
}

// =============================================================================
// Session Configuration
// =============================================================================

#[derive(Deserialize)]
struct TargetForm {
    #[serde(alias = "board")]
    target: String,
}

async fn select_target(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<TargetForm>,
) -> Response {
    let session = ClientSession::resolve(&headers, &state.sessions).await;

    if boards::find(&state.boards, &form.target).is_none() {
        debug!("Target {:?} is not in the board catalog", form.target);
    }
    let confirmation = state.sessions.set_target(session.id, &form.target).await;

    session.respond(confirmation)
}

#[derive(Deserialize)]
struct DestinationForm {
    #[serde(alias = "boardPath")]
    destination: String,
}

async fn set_destination(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<DestinationForm>,
) -> Response {
    let session = ClientSession::resolve(&headers, &state.sessions).await;
    let confirmation = state
        .sessions
        .set_destination(session.id, &form.destination)
        .await;

    session.respond(confirmation)
}

async fn get_session(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let start = Instant::now();
    let session = ClientSession::resolve(&headers, &state.sessions).await;
    let config: SessionConfig = state.sessions.config(session.id).await;

    session.respond(ApiResponse::ok(config, start.elapsed().as_millis() as u64))
}

async fn list_boards(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let boards: Vec<BoardProfile> = state.boards.as_ref().clone();
    ApiResponse::ok(boards, 0)
}

// =============================================================================
// Build
// =============================================================================

#[derive(Deserialize)]
struct BuildForm {
    #[serde(alias = "textarea")]
    source: String,
}

/// Run the full pipeline for the caller's session.
///
/// Responds with an empty body once the artifact is on the device.
async fn submit_build(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<BuildForm>,
) -> Response {
    let start = Instant::now();
    let session = ClientSession::resolve(&headers, &state.sessions).await;
    let config = state.sessions.config(session.id).await;

    info!("Build requested by session {} ({} bytes)", session.id, form.source.len());
    let outcome = state.pipeline.run(BuildRequest::new(form.source), &config).await;
    state.stats.record(&outcome).await;

    let response = match outcome {
        Ok(_report) => StatusCode::OK.into_response(),
        Err(failure) => failure_response(failure, start.elapsed().as_millis() as u64),
    };
    session.respond(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_status_mapping() {
        assert_eq!(failure_status(ErrorKind::ConfigMissing), StatusCode::CONFLICT);
        assert_eq!(failure_status(ErrorKind::BuildFailed), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(failure_status(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(failure_status(ErrorKind::IoError), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
