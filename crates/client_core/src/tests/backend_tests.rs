use super::*;
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use shared::{error::ErrorCode, protocol::ShoppingListPreview};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    seen_user_ids: Arc<Mutex<Vec<i64>>>,
    created: Arc<Mutex<Vec<RecipeFields>>>,
    subtask_requests: Arc<Mutex<Vec<(i64, CreateSubtaskRequest)>>>,
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: i64,
}

fn recipe(id: i64, name: &str) -> Recipe {
    Recipe {
        id: RecipeId(id),
        owner_id: UserId(7),
        fields: RecipeFields {
            name: name.to_string(),
            ..RecipeFields::default()
        },
        updated_at: None,
    }
}

async fn handle_login(Json(req): Json<LoginRequest>) -> Json<LoginResponse> {
    assert_eq!(req.username, "alice");
    Json(LoginResponse { user_id: UserId(7) })
}

async fn handle_list(
    State(state): State<ServerState>,
    Query(q): Query<UserQuery>,
) -> Json<Vec<Recipe>> {
    state.seen_user_ids.lock().await.push(q.user_id);
    Json(vec![recipe(1, "Soup")])
}

async fn handle_create(
    State(state): State<ServerState>,
    Json(fields): Json<RecipeFields>,
) -> Json<Recipe> {
    state.created.lock().await.push(fields.clone());
    Json(Recipe {
        id: RecipeId(2),
        owner_id: UserId(7),
        fields,
        updated_at: None,
    })
}

async fn handle_get(Path(id): Path<i64>) -> Result<Json<Recipe>, (StatusCode, String)> {
    match id {
        1 => Ok(Json(recipe(1, "Soup"))),
        404 => Err((
            StatusCode::NOT_FOUND,
            serde_json::to_string(&ApiError::not_found("recipe 404 not found"))
                .unwrap_or_default(),
        )),
        _ => Err((StatusCode::SERVICE_UNAVAILABLE, "upstream down".into())),
    }
}

async fn handle_delete(Path(_id): Path<i64>) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn handle_command(
    Path(id): Path<i64>,
    Json(command): Json<RecipeCommand>,
) -> Json<RecipeCommandResult> {
    match command {
        RecipeCommand::PreviewShoppingList {
            additional_recipe_ids,
        } => Json(RecipeCommandResult::ShoppingListPreview {
            preview: ShoppingListPreview {
                name: format!("recipe {id} + {}", additional_recipe_ids.len()),
                items: vec!["2 carrots".into()],
            },
        }),
        RecipeCommand::AssembleShoppingList { list_id, .. } => {
            Json(RecipeCommandResult::ShoppingListAssembled {
                list_id,
                added: Vec::new(),
            })
        }
        RecipeCommand::DissectRawIngredient { .. } => {
            Json(RecipeCommandResult::DissectionRecorded { updated_refs: 3 })
        }
    }
}

async fn handle_create_subtask(
    State(state): State<ServerState>,
    Path(parent): Path<i64>,
    Json(req): Json<CreateSubtaskRequest>,
) -> Json<TaskInfo> {
    let info = TaskInfo {
        id: TaskId(50),
        name: req.name.clone(),
        parent_id: Some(TaskId(parent)),
        subtask_ids: Vec::new(),
    };
    state.subtask_requests.lock().await.push((parent, req));
    Json(info)
}

async fn handle_rename(Path(id): Path<i64>, Json(req): Json<RenameTaskRequest>) -> Json<TaskInfo> {
    Json(TaskInfo {
        id: TaskId(id),
        name: req.name,
        parent_id: Some(TaskId(1)),
        subtask_ids: Vec::new(),
    })
}

async fn spawn_cookbook_server() -> Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/login", post(handle_login))
        .route("/api/recipe", get(handle_list).post(handle_create))
        .route("/api/recipe/:id", get(handle_get).delete(handle_delete))
        .route("/api/recipe/:id/_actions", post(handle_command))
        .route("/api/tasks/:id/subtasks", post(handle_create_subtask))
        .route("/api/tasks/:id/name", put(handle_rename))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

#[tokio::test]
async fn login_then_requests_carry_the_user_id() {
    let (server_url, state) = spawn_cookbook_server().await.expect("spawn server");
    let backend = HttpBackend::login(&server_url, "alice").await.expect("login");
    assert_eq!(backend.user_id(), UserId(7));

    let recipes = backend.list_recipes().await.expect("list");
    assert_eq!(recipes, vec![recipe(1, "Soup")]);
    assert_eq!(*state.seen_user_ids.lock().await, vec![7]);
}

#[tokio::test]
async fn create_and_delete_round_trip() {
    let (server_url, state) = spawn_cookbook_server().await.expect("spawn server");
    let backend = HttpBackend::new(&format!("{server_url}/"), UserId(7)).expect("backend");

    let fields = RecipeFields {
        name: "Bread".into(),
        ..RecipeFields::default()
    };
    let created = backend.create_recipe(fields.clone()).await.expect("create");
    assert_eq!(created.id, RecipeId(2));
    assert_eq!(*state.created.lock().await, vec![fields]);

    backend.delete_recipe(RecipeId(2)).await.expect("delete");
}

#[tokio::test]
async fn error_bodies_become_api_errors() {
    let (server_url, _state) = spawn_cookbook_server().await.expect("spawn server");
    let backend = HttpBackend::new(&server_url, UserId(7)).expect("backend");

    let err = backend.get_recipe(RecipeId(404)).await.expect_err("missing");
    assert_eq!(err, ApiError::not_found("recipe 404 not found"));

    let err = backend.get_recipe(RecipeId(500)).await.expect_err("unavailable");
    assert_eq!(err.code, ErrorCode::Internal);
    assert!(err.message.contains("upstream down"));
}

#[tokio::test]
async fn recipe_commands_are_tagged_json() {
    let (server_url, _state) = spawn_cookbook_server().await.expect("spawn server");
    let backend = HttpBackend::new(&server_url, UserId(7)).expect("backend");

    let result = backend
        .recipe_command(
            RecipeId(3),
            RecipeCommand::PreviewShoppingList {
                additional_recipe_ids: vec![RecipeId(4)],
            },
        )
        .await
        .expect("preview");
    match result {
        RecipeCommandResult::ShoppingListPreview { preview } => {
            assert_eq!(preview.name, "recipe 3 + 1");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn task_requests_send_their_bodies() {
    let (server_url, state) = spawn_cookbook_server().await.expect("spawn server");
    let backend = HttpBackend::new(&server_url, UserId(7)).expect("backend");

    let task = backend
        .create_subtask(TaskId(1), "eggs", Some(TaskId(9)))
        .await
        .expect("create subtask");
    assert_eq!(task.parent_id, Some(TaskId(1)));
    let requests = state.subtask_requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, 1);
    assert_eq!(requests[0].1.after, Some(TaskId(9)));
    drop(requests);

    let renamed = backend.rename_task(TaskId(50), "brown eggs").await.expect("rename");
    assert_eq!(renamed.name, "brown eggs");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let backend = HttpBackend::new(&format!("http://{addr}"), UserId(1)).expect("backend");
    let err = backend.list_recipes().await.expect_err("no server");
    assert_eq!(err.code, ErrorCode::Transport);
}

#[test]
fn invalid_base_url_is_rejected() {
    let err = HttpBackend::new("not a url", UserId(1)).expect_err("invalid");
    assert!(matches!(err, ClientError::InvalidUrl { .. }));
}
