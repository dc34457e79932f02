//! Typed actions, one enum per family.

use std::collections::HashMap;

use shared::{
    domain::{ClientId, Recipe, RecipeFields, RecipeId, TaskId},
    error::ApiError,
    protocol::{RawIngredientDissection, ShoppingListPreview, TaskInfo},
};

#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    Route(RouteAction),
    Library(LibraryAction),
    Recipe(RecipeAction),
    Draft(DraftAction),
    Task(TaskAction),
}

macro_rules! into_app_action {
    ($($family:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$family> for AppAction {
                fn from(action: $family) -> Self {
                    AppAction::$variant(action)
                }
            }
        )*
    };
}

into_app_action!(
    RouteAction => Route,
    LibraryAction => Library,
    RecipeAction => Recipe,
    DraftAction => Draft,
    TaskAction => Task,
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    /// A route pattern such as `/library/recipe/:id/edit` matched, with its
    /// path parameters.
    Matched {
        pattern: String,
        params: HashMap<String, String>,
    },
}

impl RouteAction {
    pub fn matched<'a>(
        pattern: impl Into<String>,
        params: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        RouteAction::Matched {
            pattern: pattern.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LibraryAction {
    LoadLibrary,
    LibraryLoaded { recipes: Vec<Recipe> },
    LibraryLoadFailed { error: ApiError },
    LoadRecipe { id: RecipeId },
    RecipeLoaded { recipe: Recipe },
    RecipeLoadFailed { id: RecipeId, error: ApiError },
    LoadPreview { recipe_ids: Vec<RecipeId> },
    PreviewLoaded {
        recipe_ids: Vec<RecipeId>,
        preview: ShoppingListPreview,
    },
    PreviewFailed {
        recipe_ids: Vec<RecipeId>,
        error: ApiError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecipeAction {
    CreateRecipe {
        client_id: ClientId,
        fields: RecipeFields,
    },
    Created {
        client_id: ClientId,
        recipe: Recipe,
    },
    CreateFailed {
        client_id: ClientId,
        error: ApiError,
    },
    UpdateRecipe {
        id: RecipeId,
        fields: RecipeFields,
    },
    Updated { recipe: Recipe },
    UpdateFailed { id: RecipeId, error: ApiError },
    DeleteRecipe { id: RecipeId },
    Deleted { id: RecipeId },
    DeleteFailed { id: RecipeId, error: ApiError },
    CancelAdd,
    CancelEdit { id: RecipeId },
    AssembleShoppingList {
        recipe_ids: Vec<RecipeId>,
        list_id: TaskId,
    },
    ShoppingListAssembled {
        recipe_ids: Vec<RecipeId>,
        list_id: TaskId,
        added: Vec<TaskInfo>,
    },
    ShoppingListFailed {
        recipe_ids: Vec<RecipeId>,
        list_id: TaskId,
        error: ApiError,
    },
    RecordDissection {
        recipe_id: RecipeId,
        dissection: RawIngredientDissection,
    },
    DissectionRecorded {
        recipe_id: RecipeId,
        raw: String,
        updated_refs: u64,
    },
    DissectionFailed {
        recipe_id: RecipeId,
        raw: String,
        error: ApiError,
    },
}

/// Edits to the draft recipe.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftAction {
    Update(DraftField),
    /// Blank ingredient line after `index`, or at the end.
    NewIngredient { index: Option<isize> },
    KillIngredient { index: Option<isize> },
    MultiLinePaste { index: isize, text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DraftField {
    Name(String),
    ExternalUrl(Option<String>),
    Directions(Option<String>),
    Yield(Option<u32>),
    TotalTime(Option<u32>),
    Labels(Vec<String>),
    IngredientRaw { index: usize, raw: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskAction {
    LoadLists,
    ListsLoaded { lists: Vec<TaskInfo> },
    ListsLoadFailed { error: ApiError },
    SelectList { id: TaskId },
    CreateList { name: String },
    ListCreated { list: TaskInfo },
    ListCreateFailed { name: String, error: ApiError },
    LoadSubtasks { parent: TaskId },
    SubtasksLoaded { parent: TaskId, subtasks: Vec<TaskInfo> },
    SubtasksLoadFailed { parent: TaskId, error: ApiError },
    SubtaskCreated {
        task: TaskInfo,
        after: Option<TaskId>,
    },
    SubtaskCreateFailed { parent: TaskId, error: ApiError },
    RenameTask { id: TaskId, name: String },
    TaskRenamed { task: TaskInfo },
    DeleteTask { id: TaskId },
    CompleteTask { id: TaskId },
    TaskDeleted { id: TaskId },
    /// A rename, delete or complete of `id` failed.
    TaskFailed { id: TaskId, error: ApiError },
    FocusTask { id: TaskId },
    FocusNext,
    FocusPrevious,
}
