use serde::{Deserialize, Serialize};

use crate::domain::{RecipeId, TaskId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
}

/// Wire shape of a task. Empty fields are left off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtask_ids: Vec<TaskId>,
}

impl TaskInfo {
    pub fn is_list(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn has_subtasks(&self) -> bool {
        !self.subtask_ids.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskListRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubtaskRequest {
    pub name: String,
    /// Insert after this sibling; at the front of the list when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<TaskId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameTaskRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetParentRequest {
    pub parent_id: TaskId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetSubtasksRequest {
    pub subtask_ids: Vec<TaskId>,
}

/// A cook's breakdown of one raw ingredient line into its parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIngredientDissection {
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep: Option<String>,
}

/// Commands posted to `/api/recipe/:id/_actions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecipeCommand {
    AssembleShoppingList {
        #[serde(default)]
        additional_recipe_ids: Vec<RecipeId>,
        list_id: TaskId,
        #[serde(default)]
        with_heading: bool,
    },
    PreviewShoppingList {
        #[serde(default)]
        additional_recipe_ids: Vec<RecipeId>,
    },
    DissectRawIngredient {
        dissection: RawIngredientDissection,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingListPreview {
    pub name: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecipeCommandResult {
    ShoppingListAssembled { list_id: TaskId, added: Vec<TaskInfo> },
    ShoppingListPreview { preview: ShoppingListPreview },
    DissectionRecorded { updated_refs: u64 },
}
