//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::capability::CapabilitySet;
use crate::config::Config;
use crate::interpreter::{self, LlmInterpreter};
use crate::llm::OpenAiClient;
use crate::notify::ClientHub;
use crate::orchestrator::Orchestrator;
use crate::store::{create_store, ensure_seed_data, Activity, Integration, SharedStore, User};
use crate::task::TaskStatus;

use super::types::*;
use super::ws;

/// User id assumed when the caller sends no `x-user-id` header, so a
/// single-user deployment works unconfigured.
pub const DEFAULT_USER_ID: &str = "local";

/// Newest-first window sizes for list endpoints.
const TASK_LIST_LIMIT: usize = 50;
const ACTIVITY_LIST_LIMIT: usize = 20;

/// How far back the stats endpoint looks.
const STATS_WINDOW: usize = 1000;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: SharedStore,
    pub hub: Arc<ClientHub>,
    pub orchestrator: Arc<Orchestrator>,
}

/// Caller identity, taken from the `x-user-id` header.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_USER_ID);
        Ok(UserId(id.to_string()))
    }
}

/// Error response wrapper for handlers.
pub(crate) struct ApiError(StatusCode, String);

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self(StatusCode::NOT_FOUND, message.into())
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, message.into())
    }
}

impl From<String> for ApiError {
    fn from(message: String) -> Self {
        Self::internal(message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorResponse { message: self.1 })).into_response()
    }
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store = create_store(config.store, config.data_dir.clone())
        .await
        .map_err(|e| anyhow::anyhow!("failed to initialize store: {}", e))?;
    ensure_seed_data(&store)
        .await
        .map_err(|e| anyhow::anyhow!("failed to seed store: {}", e))?;

    let llm = Arc::new(OpenAiClient::new(config.api_key.clone()));
    let interpreter = Arc::new(LlmInterpreter::new(llm, config.interpreter_model.clone()));
    let capabilities = CapabilitySet::mock(&config.mock);

    let hub = Arc::new(ClientHub::new());
    Arc::clone(&hub).start_sweeper();

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        interpreter,
        capabilities,
        Arc::clone(&hub),
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        hub,
        orchestrator,
    });

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/agents", get(list_agents))
        .route("/api/tasks", post(create_task))
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/:id", get(get_task))
        .route("/api/activities", get(list_activities))
        .route("/api/integrations", get(list_integrations))
        .route("/api/examples", get(list_examples))
        .route("/api/stats", get(get_stats))
        .route("/ws", get(ws::dashboard_ws))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for SIGINT/SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_persistent: state.store.is_persistent(),
        interpreter_model: state.config.interpreter_model.clone(),
    })
}

/// List the agent roster.
async fn list_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<crate::agents::Agent>>, ApiError> {
    let agents = state.store.list_agents().await?;
    Ok(Json(agents))
}

/// Submit a natural-language instruction.
async fn create_task(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<CreateTaskResponse>, ApiError> {
    let instruction = request.instruction.trim();
    if instruction.is_empty() {
        return Err(ApiError::bad_request("Instruction must not be empty"));
    }

    state.store.upsert_user(User::bare(&user_id)).await?;

    let outcome = state
        .orchestrator
        .run_instruction(&user_id, instruction)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create task: {}", e)))?;

    Ok(Json(CreateTaskResponse {
        task_id: outcome.task.id,
        status: outcome.task.status,
        plan: outcome.task.plan.clone(),
        subtask_ids: outcome.subtask_ids,
    }))
}

/// List the caller's tasks, newest first.
async fn list_tasks(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<crate::task::Task>>, ApiError> {
    let tasks = state.store.list_tasks(&user_id, TASK_LIST_LIMIT).await?;
    Ok(Json(tasks))
}

/// Get one task with its sub-tasks.
async fn get_task(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskDetailResponse>, ApiError> {
    let task = state
        .store
        .get_task(id)
        .await?
        .filter(|t| t.user_id == user_id)
        .ok_or_else(|| ApiError::not_found(format!("Task {} not found", id)))?;

    let subtasks = state.store.list_subtasks_for_task(id).await?;
    Ok(Json(TaskDetailResponse { task, subtasks }))
}

/// Recent activity feed for the caller.
async fn list_activities(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Activity>>, ApiError> {
    let activities = state
        .store
        .list_activities(&user_id, ACTIVITY_LIST_LIMIT)
        .await?;
    Ok(Json(activities))
}

/// External service status rows.
async fn list_integrations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Integration>>, ApiError> {
    let integrations = state.store.list_integrations().await?;
    Ok(Json(integrations))
}

/// Quick example instructions for the dashboard.
async fn list_examples() -> Json<Vec<&'static str>> {
    Json(interpreter::quick_examples())
}

/// Task counters and success rate for the caller.
async fn get_stats(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<StatsResponse>, ApiError> {
    let tasks = state.store.list_tasks(&user_id, STATS_WINDOW).await?;

    let total_tasks = tasks.len();
    let active_tasks = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::InProgress)
        .count();
    let completed_tasks = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let failed_tasks = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .count();

    let finished = completed_tasks + failed_tasks;
    let success_rate = if finished > 0 {
        completed_tasks as f64 / finished as f64
    } else {
        1.0
    };

    Ok(Json(StatsResponse {
        total_tasks,
        active_tasks,
        completed_tasks,
        failed_tasks,
        success_rate,
    }))
}
