//! REST API Server for the financial planning pipeline
//!
//! Exposes workflow runs, direct engine invocation and memory search

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::error::OrchestrationError;
use crate::memory::InMemorySemanticStore;
use crate::models::{GoalItem, Profile, ToolInput};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkflowRequest {
    pub profile: Profile,
    #[serde(default)]
    pub goals: Vec<GoalItem>,
}

fn default_k() -> usize {
    3
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MemorySearchRequest {
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn error_response(e: &OrchestrationError) -> ApiResult {
    let status = match e {
        OrchestrationError::InvalidPlan(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OrchestrationError::ToolNotFound(_) => StatusCode::NOT_FOUND,
        OrchestrationError::InvalidToolInput(_) | OrchestrationError::Domain(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

/// =============================
/// API State
/// =============================

/// Semantic memory written back to disk after each workflow run
#[derive(Clone)]
pub struct MemorySnapshot {
    pub store: Arc<InMemorySemanticStore>,
    pub path: PathBuf,
}

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub snapshot: Option<MemorySnapshot>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Workflow Endpoint
/// =============================

async fn run_workflow(
    State(state): State<ApiState>,
    Json(req): Json<WorkflowRequest>,
) -> ApiResult {
    info!(
        profile_id = %req.profile.profile_id,
        goal_count = req.goals.len(),
        "Received workflow request"
    );

    match state.orchestrator.run(req.profile, req.goals).await {
        Ok(workflow) => {
            if let Some(snapshot) = &state.snapshot {
                if let Err(e) = snapshot.store.save(&snapshot.path).await {
                    warn!(error = %e, "Failed to write semantic memory snapshot");
                }
            }
            (StatusCode::OK, Json(ApiResponse::success(workflow)))
        }
        Err(e) => {
            warn!(error = %e, "Workflow failed");
            error_response(&e)
        }
    }
}

/// =============================
/// Direct Tool Endpoint
/// =============================

async fn invoke_tool(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(parameters): Json<serde_json::Value>,
) -> ApiResult {
    let registry = Arc::clone(state.orchestrator.execution_engine().registry());
    let input = ToolInput {
        tool_name: name.clone(),
        key: name,
        parameters,
    };

    let outcome = tokio::task::spawn_blocking(move || registry.invoke(&input)).await;

    match outcome {
        Ok(Ok(data)) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Ok(Err(e)) => error_response(&e),
        Err(join_error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("tool task failed: {}", join_error))),
        ),
    }
}

/// =============================
/// Memory Search Endpoint
/// =============================

async fn search_memory(
    State(state): State<ApiState>,
    Json(req): Json<MemorySearchRequest>,
) -> ApiResult {
    match state.orchestrator.reflector().recall(&req.query, req.k).await {
        Ok(hits) => (StatusCode::OK, Json(ApiResponse::success(hits))),
        Err(e) => error_response(&e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/workflow/run", post(run_workflow))
        .route("/api/v1/tools/:name", post(invoke_tool))
        .route("/api/v1/memory/search", post(search_memory))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
