//! Asynchronous work started by action creators.
//!
//! Every effect runs on the tokio runtime and feeds exactly one terminal
//! action back through the [`ActionSender`]. Results carry the identity of
//! the request (client id, recipe ids, list id) so stores can drop stale
//! answers.

use std::{future::Future, sync::Arc};

use shared::{
    domain::{ClientId, RecipeFields, RecipeId, TaskId},
    error::ApiError,
    protocol::{
        RawIngredientDissection, RecipeCommand, RecipeCommandResult, ShoppingListPreview, TaskInfo,
    },
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    action::{AppAction, LibraryAction, RecipeAction, TaskAction},
    backend::CookbookBackend,
    dispatch::ActionSender,
};

#[derive(Clone)]
pub struct Effects {
    backend: Arc<dyn CookbookBackend>,
    sender: ActionSender<AppAction>,
}

impl Effects {
    pub fn new(backend: Arc<dyn CookbookBackend>, sender: ActionSender<AppAction>) -> Self {
        Self { backend, sender }
    }

    /// Runs `work` and queues `ok(value)` or `err(error)`.
    fn spawn<T, F, OnOk, OnErr>(
        &self,
        effect: &'static str,
        work: F,
        ok: OnOk,
        err: OnErr,
    ) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, ApiError>> + Send + 'static,
        OnOk: FnOnce(T) -> AppAction + Send + 'static,
        OnErr: FnOnce(ApiError) -> AppAction + Send + 'static,
    {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let action = match work.await {
                Ok(value) => {
                    debug!(effect, "effect finished");
                    ok(value)
                }
                Err(error) => {
                    warn!(effect, code = ?error.code, message = %error.message, "effect failed");
                    err(error)
                }
            };
            sender.send(action);
        })
    }

    pub fn load_library(&self) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        self.spawn(
            "load_library",
            async move { backend.list_recipes().await },
            |recipes| LibraryAction::LibraryLoaded { recipes }.into(),
            |error| LibraryAction::LibraryLoadFailed { error }.into(),
        )
    }

    pub fn load_recipe(&self, id: RecipeId) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        self.spawn(
            "load_recipe",
            async move { backend.get_recipe(id).await },
            |recipe| LibraryAction::RecipeLoaded { recipe }.into(),
            move |error| LibraryAction::RecipeLoadFailed { id, error }.into(),
        )
    }

    pub fn create_recipe(&self, client_id: ClientId, fields: RecipeFields) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        self.spawn(
            "create_recipe",
            async move { backend.create_recipe(fields).await },
            move |recipe| RecipeAction::Created { client_id, recipe }.into(),
            move |error| RecipeAction::CreateFailed { client_id, error }.into(),
        )
    }

    pub fn update_recipe(&self, id: RecipeId, fields: RecipeFields) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        self.spawn(
            "update_recipe",
            async move { backend.update_recipe(id, fields).await },
            |recipe| RecipeAction::Updated { recipe }.into(),
            move |error| RecipeAction::UpdateFailed { id, error }.into(),
        )
    }

    pub fn delete_recipe(&self, id: RecipeId) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        self.spawn(
            "delete_recipe",
            async move { backend.delete_recipe(id).await },
            move |()| RecipeAction::Deleted { id }.into(),
            move |error| RecipeAction::DeleteFailed { id, error }.into(),
        )
    }

    /// Previews the combined shopping list for `recipe_ids`. The first id is
    /// the recipe the command is posted to.
    pub fn load_preview(&self, recipe_ids: Vec<RecipeId>) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let ids = recipe_ids.clone();
        let failed_ids = recipe_ids.clone();
        self.spawn(
            "load_preview",
            async move { fetch_preview(backend.as_ref(), &ids).await },
            move |preview| LibraryAction::PreviewLoaded { recipe_ids, preview }.into(),
            move |error| {
                LibraryAction::PreviewFailed {
                    recipe_ids: failed_ids,
                    error,
                }
                .into()
            },
        )
    }

    pub fn assemble_shopping_list(
        &self,
        recipe_ids: Vec<RecipeId>,
        list_id: TaskId,
        with_heading: bool,
    ) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let ids = recipe_ids.clone();
        let failed_ids = recipe_ids.clone();
        self.spawn(
            "assemble_shopping_list",
            async move { assemble(backend.as_ref(), &ids, list_id, with_heading).await },
            move |added| {
                RecipeAction::ShoppingListAssembled {
                    recipe_ids,
                    list_id,
                    added,
                }
                .into()
            },
            move |error| {
                RecipeAction::ShoppingListFailed {
                    recipe_ids: failed_ids,
                    list_id,
                    error,
                }
                .into()
            },
        )
    }

    pub fn record_dissection(
        &self,
        recipe_id: RecipeId,
        dissection: RawIngredientDissection,
    ) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let raw = dissection.raw.clone();
        let failed_raw = raw.clone();
        self.spawn(
            "record_dissection",
            async move { dissect(backend.as_ref(), recipe_id, dissection).await },
            move |updated_refs| {
                RecipeAction::DissectionRecorded {
                    recipe_id,
                    raw,
                    updated_refs,
                }
                .into()
            },
            move |error| {
                RecipeAction::DissectionFailed {
                    recipe_id,
                    raw: failed_raw,
                    error,
                }
                .into()
            },
        )
    }

    pub fn load_lists(&self) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        self.spawn(
            "load_lists",
            async move { backend.list_task_lists().await },
            |lists| TaskAction::ListsLoaded { lists }.into(),
            |error| TaskAction::ListsLoadFailed { error }.into(),
        )
    }

    pub fn create_list(&self, name: String) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let failed_name = name.clone();
        self.spawn(
            "create_list",
            async move { backend.create_task_list(&name).await },
            |list| TaskAction::ListCreated { list }.into(),
            move |error| {
                TaskAction::ListCreateFailed {
                    name: failed_name,
                    error,
                }
                .into()
            },
        )
    }

    pub fn load_subtasks(&self, parent: TaskId) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        self.spawn(
            "load_subtasks",
            async move { backend.get_subtasks(parent).await },
            move |subtasks| TaskAction::SubtasksLoaded { parent, subtasks }.into(),
            move |error| TaskAction::SubtasksLoadFailed { parent, error }.into(),
        )
    }

    pub fn create_subtask(&self, parent: TaskId, name: String, after: Option<TaskId>) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        self.spawn(
            "create_subtask",
            async move { backend.create_subtask(parent, &name, after).await },
            move |task| TaskAction::SubtaskCreated { task, after }.into(),
            move |error| TaskAction::SubtaskCreateFailed { parent, error }.into(),
        )
    }

    pub fn rename_task(&self, id: TaskId, name: String) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        self.spawn(
            "rename_task",
            async move { backend.rename_task(id, &name).await },
            |task| TaskAction::TaskRenamed { task }.into(),
            move |error| TaskAction::TaskFailed { id, error }.into(),
        )
    }

    pub fn delete_task(&self, id: TaskId) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        self.spawn(
            "delete_task",
            async move { backend.delete_task(id).await },
            move |()| TaskAction::TaskDeleted { id }.into(),
            move |error| TaskAction::TaskFailed { id, error }.into(),
        )
    }

    /// Completing a task removes it the same way deleting does.
    pub fn complete_task(&self, id: TaskId) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        self.spawn(
            "complete_task",
            async move { backend.complete_task(id).await },
            move |()| TaskAction::TaskDeleted { id }.into(),
            move |error| TaskAction::TaskFailed { id, error }.into(),
        )
    }
}

async fn fetch_preview(
    backend: &dyn CookbookBackend,
    ids: &[RecipeId],
) -> Result<ShoppingListPreview, ApiError> {
    let (first, rest) = split_recipe_ids(ids)?;
    let command = RecipeCommand::PreviewShoppingList {
        additional_recipe_ids: rest.to_vec(),
    };
    match backend.recipe_command(first, command).await? {
        RecipeCommandResult::ShoppingListPreview { preview } => Ok(preview),
        other => Err(unexpected_result(&other)),
    }
}

async fn assemble(
    backend: &dyn CookbookBackend,
    ids: &[RecipeId],
    list_id: TaskId,
    with_heading: bool,
) -> Result<Vec<TaskInfo>, ApiError> {
    let (first, rest) = split_recipe_ids(ids)?;
    let command = RecipeCommand::AssembleShoppingList {
        additional_recipe_ids: rest.to_vec(),
        list_id,
        with_heading,
    };
    match backend.recipe_command(first, command).await? {
        RecipeCommandResult::ShoppingListAssembled { added, .. } => Ok(added),
        other => Err(unexpected_result(&other)),
    }
}

async fn dissect(
    backend: &dyn CookbookBackend,
    recipe_id: RecipeId,
    dissection: RawIngredientDissection,
) -> Result<u64, ApiError> {
    let command = RecipeCommand::DissectRawIngredient { dissection };
    match backend.recipe_command(recipe_id, command).await? {
        RecipeCommandResult::DissectionRecorded { updated_refs } => Ok(updated_refs),
        other => Err(unexpected_result(&other)),
    }
}

fn split_recipe_ids(ids: &[RecipeId]) -> Result<(RecipeId, &[RecipeId]), ApiError> {
    match ids.split_first() {
        Some((first, rest)) => Ok((*first, rest)),
        None => Err(ApiError::validation("at least one recipe is required")),
    }
}

fn unexpected_result(result: &RecipeCommandResult) -> ApiError {
    ApiError::internal(format!("unexpected command result {result:?}"))
}

#[cfg(test)]
#[path = "tests/effects_tests.rs"]
mod tests;
