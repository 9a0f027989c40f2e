//! REST API Handlers
//!
//! Storage lifecycle endpoints over the orchestrator. Every body uses the
//! same envelope: `{code, message, data}` on success and
//! `{code, message, error}` on failure, `message` being the reason phrase
//! of `code`.

use crate::controlplane::Orchestrator;
use crate::domain::record::StorageSpec;
use crate::error::Error;
use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Response Envelope
// =============================================================================

/// Uniform response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    fn success(status: StatusCode, data: T) -> Self {
        Self {
            code: status.as_u16(),
            message: reason(status),
            data: Some(data),
            error: None,
        }
    }
}

impl Envelope<()> {
    fn failure(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            message: reason(status),
            data: None,
            error: Some(error.into()),
        }
    }
}

fn reason(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or_default().to_string()
}

fn respond<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(Envelope::success(status, data))).into_response()
}

fn fail(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(Envelope::failure(status, error))).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("Request failed: {}", self);
        } else {
            debug!("Request rejected: {}", self);
        }
        fail(status, self.to_string())
    }
}

/// Body of a successful delete
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedStorage {
    pub release_name: String,
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    orchestrator: Arc<Orchestrator>,
}

impl RestRouter {
    /// Create a new REST router
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator,
        };

        Router::new()
            // Storage endpoints
            .route("/v1/storage", get(list_storage).post(create_storage))
            .route(
                "/v1/storage/:release_name",
                get(get_storage).delete(delete_storage),
            )
            .route("/v1/schema/storage", get(storage_schema))
            .route("/v1/status", get(status))
            // Health endpoints
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn create_storage(
    State(state): State<AppState>,
    body: Result<Json<StorageSpec>, JsonRejection>,
) -> Response {
    let Json(spec) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!("Rejected create body: {}", rejection);
            return fail(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    info!("Create request for {}", spec.name);
    match state.orchestrator.create_storage(spec).await {
        Ok(record) => respond(StatusCode::CREATED, record),
        Err(e) => e.into_response(),
    }
}

async fn list_storage(State(state): State<AppState>) -> Response {
    match state.orchestrator.list_storage().await {
        Ok(records) => respond(StatusCode::OK, records),
        Err(e) => e.into_response(),
    }
}

async fn get_storage(
    State(state): State<AppState>,
    Path(release_name): Path<String>,
) -> Response {
    match state.orchestrator.get_storage(&release_name).await {
        Ok(record) => respond(StatusCode::OK, record),
        Err(e) => e.into_response(),
    }
}

async fn delete_storage(
    State(state): State<AppState>,
    Path(release_name): Path<String>,
) -> Response {
    match state.orchestrator.delete_storage(&release_name).await {
        Ok(()) => respond(StatusCode::OK, DeletedStorage { release_name }),
        Err(e) => e.into_response(),
    }
}

async fn storage_schema() -> Response {
    respond(StatusCode::OK, schemars::schema_for!(StorageSpec))
}

async fn status(State(state): State<AppState>) -> Response {
    respond(StatusCode::OK, state.orchestrator.status().await)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let components = state.orchestrator.components_health().await;
    let unhealthy: Vec<&str> = components
        .iter()
        .filter(|(_, healthy)| !**healthy)
        .map(|(name, _)| name.as_str())
        .collect();

    if unhealthy.is_empty() {
        (StatusCode::OK, "ready".to_string())
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("unhealthy: {}", unhealthy.join(", ")),
        )
    }
}
