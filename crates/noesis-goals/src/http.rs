//! Goal Manager HTTP surface
//!
//! ```text
//! POST /goal                      create; returns {id}
//! GET  /goals/:agent_id/active
//! GET  /goals/:agent_id/all
//! POST /goal/:id/achieve          body {result:{...}}
//! POST /goal/:id/fail             body {reason}
//! GET  /health
//! ```

use crate::manager::GoalManager;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use noesis_core::error::{GoalError, NoesisError};
use noesis_core::goal::{Goal, GoalContext};
use noesis_core::types::{GoalType, Priority};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct GoalServiceState {
    pub manager: Arc<GoalManager>,
}

/// Build the Axum router.
pub fn build_router(state: GoalServiceState) -> Router {
    Router::new()
        .route("/goal", post(handle_create))
        .route("/goals/:agent_id/active", get(handle_list_active))
        .route("/goals/:agent_id/all", get(handle_list_all))
        .route("/goal/:id/achieve", post(handle_achieve))
        .route("/goal/:id/fail", post(handle_fail))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the goal service until the listener fails.
pub async fn serve(state: GoalServiceState, addr: &str) -> anyhow::Result<()> {
    let router = build_router(state);
    tracing::info!(addr, "goal manager listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateGoalRequest {
    pub description: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, rename = "type")]
    pub goal_type: Option<GoalType>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub hypothesis_id: Option<Uuid>,
    #[serde(default)]
    pub inconsistency_id: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct CreateGoalResponse {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AchieveRequest {
    #[serde(default)]
    pub result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub reason: String,
}

async fn handle_create(
    State(state): State<GoalServiceState>,
    Json(request): Json<CreateGoalRequest>,
) -> Result<Json<CreateGoalResponse>, ApiError> {
    let mut context = GoalContext::for_domain(request.domain.unwrap_or_else(|| "general".into()));
    context.hypothesis_id = request.hypothesis_id;
    context.inconsistency_id = request.inconsistency_id;
    context.extra = request.context;

    let mut goal = Goal::new(
        request.description,
        request.goal_type.unwrap_or(GoalType::User),
        context,
        "http",
    );
    if let Some(priority) = request.priority {
        goal.priority = priority;
    }

    let id = state.manager.create(goal).await?;
    // HTTP-submitted goals go straight to work.
    state.manager.activate(id).await?;
    Ok(Json(CreateGoalResponse { id }))
}

async fn handle_list_active(
    State(state): State<GoalServiceState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Vec<Goal>>, ApiError> {
    Ok(Json(state.manager.list_active(&agent_id).await?))
}

async fn handle_list_all(
    State(state): State<GoalServiceState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Vec<Goal>>, ApiError> {
    Ok(Json(state.manager.list_all(&agent_id).await?))
}

async fn handle_achieve(
    State(state): State<GoalServiceState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AchieveRequest>,
) -> Result<Json<Goal>, ApiError> {
    Ok(Json(state.manager.achieve(id, request.result).await?))
}

async fn handle_fail(
    State(state): State<GoalServiceState>,
    Path(id): Path<Uuid>,
    Json(request): Json<FailRequest>,
) -> Result<Json<Goal>, ApiError> {
    Ok(Json(state.manager.fail(id, request.reason).await?))
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "noesis-goals",
        "version": noesis_core::VERSION,
    }))
}

/// Error wrapper mapping domain failures onto HTTP statuses
#[derive(Debug)]
pub struct ApiError(NoesisError);

impl From<NoesisError> for ApiError {
    fn from(error: NoesisError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NoesisError::Goal(GoalError::NotFound(_)) => StatusCode::NOT_FOUND,
            NoesisError::Goal(GoalError::InvalidStateTransition { .. })
            | NoesisError::Goal(GoalError::StaleUpdate { .. })
            | NoesisError::Goal(GoalError::WorkflowIdImmutable(_)) => StatusCode::CONFLICT,
            NoesisError::Goal(GoalError::MissingLink { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
