use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use server_api::ApiContext;
use shared::{
    domain::{Recipe, RecipeFields, RecipeId, TaskId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateSubtaskRequest, CreateTaskListRequest, LoginRequest, LoginResponse, RecipeCommand,
        RecipeCommandResult, RenameTaskRequest, ResetParentRequest, ResetSubtasksRequest,
        TaskInfo,
    },
};
use storage::Storage;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: i64,
}

impl UserQuery {
    fn user(&self) -> UserId {
        UserId(self.user_id)
    }
}

type HttpError = (StatusCode, Json<ApiError>);
type HttpResult<T> = Result<Json<T>, HttpError>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext::new(storage),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(login))
        .route("/api/recipe", get(http_list_recipes).post(http_create_recipe))
        .route(
            "/api/recipe/:recipe_id",
            get(http_get_recipe)
                .put(http_update_recipe)
                .delete(http_delete_recipe),
        )
        .route("/api/recipe/:recipe_id/_actions", post(http_recipe_command))
        .route(
            "/api/tasks",
            get(http_list_task_lists).post(http_create_task_list),
        )
        .route(
            "/api/tasks/:task_id",
            get(http_get_task).delete(http_delete_task),
        )
        .route(
            "/api/tasks/:task_id/subtasks",
            get(http_get_subtasks).post(http_create_subtask),
        )
        .route("/api/tasks/:task_id/name", put(http_rename_task))
        .route("/api/tasks/:task_id/parent", put(http_reset_parent))
        .route("/api/tasks/:task_id/subtask_ids", put(http_reset_subtasks))
        .route("/api/tasks/:task_id/complete", post(http_complete_task))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Transport => StatusCode::BAD_GATEWAY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> HttpError {
    let status = status_for(err.code);
    if status.is_server_error() {
        error!(code = ?err.code, message = %err.message, "request failed");
    } else {
        warn!(code = ?err.code, message = %err.message, "request rejected");
    }
    (status, Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| reject(ApiError::internal(e.to_string())))?;
    Ok("ok")
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> HttpResult<LoginResponse> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(reject(ApiError::validation("username cannot be blank")));
    }
    let user_id = state
        .api
        .storage
        .create_user(username)
        .await
        .map_err(|e| reject(ApiError::internal(e.to_string())))?;
    info!(%user_id, "user logged in");
    Ok(Json(LoginResponse { user_id }))
}

async fn http_list_recipes(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
) -> HttpResult<Vec<Recipe>> {
    server_api::list_recipes(&state.api, q.user())
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_recipe(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
    Json(fields): Json<RecipeFields>,
) -> HttpResult<Recipe> {
    server_api::create_recipe(&state.api, q.user(), fields)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_recipe(
    State(state): State<Arc<AppState>>,
    Path(recipe_id): Path<i64>,
    Query(q): Query<UserQuery>,
) -> HttpResult<Recipe> {
    server_api::get_recipe(&state.api, q.user(), RecipeId(recipe_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_recipe(
    State(state): State<Arc<AppState>>,
    Path(recipe_id): Path<i64>,
    Query(q): Query<UserQuery>,
    Json(fields): Json<RecipeFields>,
) -> HttpResult<Recipe> {
    server_api::update_recipe(&state.api, q.user(), RecipeId(recipe_id), fields)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_recipe(
    State(state): State<Arc<AppState>>,
    Path(recipe_id): Path<i64>,
    Query(q): Query<UserQuery>,
) -> Result<StatusCode, HttpError> {
    server_api::delete_recipe(&state.api, q.user(), RecipeId(recipe_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_recipe_command(
    State(state): State<Arc<AppState>>,
    Path(recipe_id): Path<i64>,
    Query(q): Query<UserQuery>,
    Json(command): Json<RecipeCommand>,
) -> HttpResult<RecipeCommandResult> {
    server_api::run_recipe_command(&state.api, q.user(), RecipeId(recipe_id), command)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_task_lists(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
) -> HttpResult<Vec<TaskInfo>> {
    server_api::list_task_lists(&state.api, q.user())
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_task_list(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
    Json(req): Json<CreateTaskListRequest>,
) -> HttpResult<TaskInfo> {
    server_api::create_task_list(&state.api, q.user(), &req.name)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Query(q): Query<UserQuery>,
) -> HttpResult<TaskInfo> {
    server_api::get_task(&state.api, q.user(), TaskId(task_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Query(q): Query<UserQuery>,
) -> Result<StatusCode, HttpError> {
    server_api::delete_task(&state.api, q.user(), TaskId(task_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_get_subtasks(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Query(q): Query<UserQuery>,
) -> HttpResult<Vec<TaskInfo>> {
    server_api::get_subtasks(&state.api, q.user(), TaskId(task_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_subtask(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Query(q): Query<UserQuery>,
    Json(req): Json<CreateSubtaskRequest>,
) -> HttpResult<TaskInfo> {
    let created = match req.after {
        Some(after) => {
            server_api::create_subtask_after(&state.api, q.user(), TaskId(task_id), &req.name, after)
                .await
        }
        None => server_api::create_subtask(&state.api, q.user(), TaskId(task_id), &req.name).await,
    };
    created.map(Json).map_err(reject)
}

async fn http_rename_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Query(q): Query<UserQuery>,
    Json(req): Json<RenameTaskRequest>,
) -> HttpResult<TaskInfo> {
    server_api::rename_task(&state.api, q.user(), TaskId(task_id), &req.name)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_reset_parent(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Query(q): Query<UserQuery>,
    Json(req): Json<ResetParentRequest>,
) -> HttpResult<TaskInfo> {
    server_api::reset_parent(&state.api, q.user(), TaskId(task_id), req.parent_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_reset_subtasks(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Query(q): Query<UserQuery>,
    Json(req): Json<ResetSubtasksRequest>,
) -> HttpResult<TaskInfo> {
    server_api::reset_subtasks(&state.api, q.user(), TaskId(task_id), &req.subtask_ids)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_complete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Query(q): Query<UserQuery>,
) -> Result<StatusCode, HttpError> {
    server_api::complete_task(&state.api, q.user(), TaskId(task_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
