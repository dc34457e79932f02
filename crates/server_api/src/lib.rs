//! Backend services: recipe library and task lists on top of [`Storage`].
//!
//! Every operation takes the acting user explicitly and answers with an
//! [`ApiError`] the HTTP layer can hand straight to the client.

use shared::{domain::UserId, error::ApiError};
use storage::{Storage, StoredTask};

mod recipes;
mod tasks;

pub use recipes::{
    assemble_shopping_list, create_recipe, delete_recipe, get_recipe, list_recipes,
    preview_shopping_list, record_dissection, run_recipe_command, update_recipe,
};
pub use tasks::{
    complete_task, create_subtask, create_subtask_after, create_task_list, delete_task, get_subtasks,
    get_task, list_task_lists, rename_task, reset_parent, reset_subtasks,
};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

impl ApiContext {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::internal(err.to_string())
}

fn ensure_owner(task: &StoredTask, user_id: UserId) -> Result<(), ApiError> {
    if task.owner_id != user_id {
        return Err(ApiError::new(
            shared::error::ErrorCode::Forbidden,
            format!("task {} belongs to another user", task.id),
        ));
    }
    Ok(())
}

fn require_name(name: &str, what: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::validation(format!("{what} name cannot be blank")));
    }
    Ok(name.to_string())
}
