//! Intelligent Executor HTTP surface
//!
//! ```text
//! POST /execute                          synchronous run
//! POST /hierarchical/execute             202 + {workflow_id}, runs detached
//! GET  /workflow/:id/details
//! GET  /workflow/:id/files
//! GET  /workflow/:id/files/:filename
//! GET  /capabilities
//! GET  /health
//! ```

use crate::executor::{ExecuteRequest, ExecuteResponse, IntelligentExecutor};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use noesis_core::artifact::FileArtifact;
use noesis_core::error::NoesisError;
use noesis_core::types::Timestamp;
use noesis_core::workflow::WorkflowRecord;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct ExecutorServiceState {
    pub executor: Arc<IntelligentExecutor>,
}

/// Build the Axum router.
pub fn build_router(state: ExecutorServiceState) -> Router {
    Router::new()
        .route("/execute", post(handle_execute))
        .route("/hierarchical/execute", post(handle_hierarchical))
        .route("/workflow/:id/details", get(handle_details))
        .route("/workflow/:id/files", get(handle_files))
        .route("/workflow/:id/files/:filename", get(handle_file_content))
        .route("/capabilities", get(handle_capabilities))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the executor until the listener fails.
pub async fn serve(state: ExecutorServiceState, addr: &str) -> anyhow::Result<()> {
    let router = build_router(state);
    tracing::info!(addr, "intelligent executor listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn handle_execute(
    State(state): State<ExecutorServiceState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    Ok(Json(state.executor.execute(request).await?))
}

#[derive(Debug, Serialize)]
struct AcceptedResponse {
    workflow_id: Uuid,
}

async fn handle_hierarchical(
    State(state): State<ExecutorServiceState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let record = state.executor.submit(&request).await?;
    let workflow_id = record.id;

    let executor = state.executor.clone();
    tokio::spawn(async move {
        if let Err(e) = executor.run(record, request).await {
            tracing::warn!(workflow_id = %workflow_id, error = %e, "detached workflow errored");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { workflow_id })))
}

#[derive(Debug, Serialize)]
struct WorkflowDetails {
    status: String,
    started_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    ended_at: Option<Timestamp>,
    artifact_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
}

impl From<&WorkflowRecord> for WorkflowDetails {
    fn from(record: &WorkflowRecord) -> Self {
        Self {
            status: record.status.to_string(),
            started_at: record.started_at,
            ended_at: record.ended_at,
            artifact_ids: record.generated_artifact_ids.clone(),
            failure_reason: record.failure_reason.clone(),
        }
    }
}

async fn handle_details(
    State(state): State<ExecutorServiceState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowDetails>, ApiError> {
    match state.executor.workflow(id).await? {
        Some(record) => Ok(Json(WorkflowDetails::from(&record))),
        None => Err(ApiError::not_found(format!("workflow {}", id))),
    }
}

async fn handle_files(
    State(state): State<ExecutorServiceState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<FileArtifact>>, ApiError> {
    Ok(Json(state.executor.artifacts().list_by_workflow(id).await?))
}

async fn handle_file_content(
    State(state): State<ExecutorServiceState>,
    Path((id, filename)): Path<(Uuid, String)>,
) -> Result<String, ApiError> {
    let artifacts = state.executor.artifacts();
    for meta in artifacts.list_by_workflow(id).await? {
        if meta.filename == filename {
            if let Some(content) = artifacts.content(meta.id).await? {
                return Ok(content);
            }
        }
    }
    Err(ApiError::not_found(format!(
        "file {} of workflow {}",
        filename, id
    )))
}

#[derive(Debug, Serialize)]
struct CapabilitiesResponse {
    stats: CapabilityStats,
    capabilities: Vec<noesis_core::capability::Capability>,
}

#[derive(Debug, Serialize)]
struct CapabilityStats {
    total_cached_capabilities: usize,
}

async fn handle_capabilities(
    State(state): State<ExecutorServiceState>,
) -> Result<Json<CapabilitiesResponse>, ApiError> {
    let capabilities = state.executor.capabilities().list().await?;
    Ok(Json(CapabilitiesResponse {
        stats: CapabilityStats {
            total_cached_capabilities: capabilities.len(),
        },
        capabilities,
    }))
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "noesis-executor",
        "version": noesis_core::VERSION,
    }))
}

/// Error wrapper mapping domain failures onto HTTP statuses
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(NoesisError),
}

impl ApiError {
    fn not_found(what: String) -> Self {
        Self::NotFound(what)
    }
}

impl From<NoesisError> for ApiError {
    fn from(error: NoesisError) -> Self {
        Self::Internal(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("not found: {}", what)),
            ApiError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
