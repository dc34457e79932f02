//! Client core for the cookbook: stores reduce dispatched actions into
//! immutable snapshots, and effects turn server round trips back into
//! actions.
//!
//! [`CookbookClient`] wires the pieces together. Action creators dispatch the
//! request action synchronously, then start the matching effect; call
//! [`CookbookClient::settle`] (or [`CookbookClient::finish`]) to reduce the
//! results that came back.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use shared::{
    domain::{RecipeId, TaskId},
    protocol::RawIngredientDissection,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub mod action;
pub mod backend;
pub mod dispatch;
pub mod effects;
pub mod error;
pub mod ingredient_lines;
pub mod load_object;
pub mod stores;

use action::{AppAction, DraftAction, LibraryAction, RecipeAction, RouteAction, TaskAction};
use backend::CookbookBackend;
use dispatch::{action_queue, ActionQueue, ActionSender, DispatchOutcome, Dispatcher, StoreToken};
use effects::Effects;
use load_object::LoadState;
use stores::{
    DraftKey, DraftRecipe, DraftRecipeStore, LibraryState, LibraryStore, TaskState, TaskStore,
    DRAFT_RECIPE_STORE, EDIT_RECIPE_ROUTE, LIBRARY_STORE, TASK_STORE,
};

pub use load_object::LoadObject;

pub struct CookbookClient {
    dispatcher: Dispatcher<AppAction>,
    queue: ActionQueue<AppAction>,
    sender: ActionSender<AppAction>,
    effects: Effects,
    library: StoreToken,
    draft: StoreToken,
    tasks: StoreToken,
}

impl CookbookClient {
    pub fn new(backend: Arc<dyn CookbookBackend>) -> Result<Self> {
        let mut dispatcher = Dispatcher::new();
        let library = dispatcher.register(LIBRARY_STORE, LibraryStore)?;
        let draft = dispatcher.register(DRAFT_RECIPE_STORE, DraftRecipeStore::new(library))?;
        let tasks = dispatcher.register(TASK_STORE, TaskStore)?;
        let (sender, queue) = action_queue();
        let effects = Effects::new(backend, sender.clone());
        Ok(Self {
            dispatcher,
            queue,
            sender,
            effects,
            library,
            draft,
            tasks,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher<AppAction> {
        &self.dispatcher
    }

    /// Handle for feeding actions in from outside, e.g. a router.
    pub fn sender(&self) -> ActionSender<AppAction> {
        self.sender.clone()
    }

    pub fn dispatch(&self, action: impl Into<AppAction>) -> Result<DispatchOutcome> {
        Ok(self.dispatcher.dispatch(&action.into())?)
    }

    pub fn library(&self) -> Result<Arc<LibraryState>> {
        Ok(self.dispatcher.state(self.library)?)
    }

    pub fn draft(&self) -> Result<Arc<LoadObject<DraftRecipe>>> {
        Ok(self.dispatcher.state(self.draft)?)
    }

    pub fn tasks(&self) -> Result<Arc<TaskState>> {
        Ok(self.dispatcher.state(self.tasks)?)
    }

    pub fn library_token(&self) -> StoreToken {
        self.library
    }

    pub fn draft_token(&self) -> StoreToken {
        self.draft
    }

    pub fn task_token(&self) -> StoreToken {
        self.tasks
    }

    /// Reduces every action already queued by finished effects.
    pub fn settle(&mut self) -> Result<usize> {
        let count = self.queue.drain(&self.dispatcher)?;
        if count > 0 {
            debug!(count, "settled queued actions");
        }
        Ok(count)
    }

    /// Waits for one effect, then reduces what it queued.
    pub async fn finish(&mut self, effect: JoinHandle<()>) -> Result<usize> {
        effect.await.context("effect task panicked")?;
        self.settle()
    }

    /// Waits for the next queued action and reduces it.
    pub async fn pump(&mut self) -> Option<Result<DispatchOutcome>> {
        self.queue
            .pump(&self.dispatcher)
            .await
            .map(|res| res.map_err(Into::into))
    }

    /// Dispatches a matched route. Opening the edit page of a recipe the
    /// library has not loaded yet fetches it.
    pub fn route(&self, route: RouteAction) -> Result<Option<JoinHandle<()>>> {
        let fetch = match &route {
            RouteAction::Matched { pattern, params } if pattern == EDIT_RECIPE_ROUTE => params
                .get("id")
                .and_then(|id| id.parse::<i64>().ok())
                .map(RecipeId)
                .filter(|id| self.library().map_or(false, |l| l.recipe(*id).is_none())),
            RouteAction::Matched { .. } => None,
        };
        self.dispatch(route)?;
        fetch.map(|id| self.load_recipe(id)).transpose()
    }

    pub fn load_library(&self) -> Result<JoinHandle<()>> {
        self.dispatch(LibraryAction::LoadLibrary)?;
        Ok(self.effects.load_library())
    }

    pub fn load_recipe(&self, id: RecipeId) -> Result<JoinHandle<()>> {
        self.dispatch(LibraryAction::LoadRecipe { id })?;
        Ok(self.effects.load_recipe(id))
    }

    pub fn edit_draft(&self, action: DraftAction) -> Result<DispatchOutcome> {
        self.dispatch(action)
    }

    /// Creates or updates the recipe behind the draft.
    pub fn save_draft(&self) -> Result<JoinHandle<()>> {
        let draft = self.draft()?;
        if draft.state() != LoadState::Done {
            bail!("draft cannot be saved while {:?}", draft.state());
        }
        let Some(draft) = draft.value() else {
            bail!("draft has no value");
        };
        let fields = draft.fields.clone();
        match draft.key {
            DraftKey::Client(client_id) => {
                info!(%client_id, name = %fields.name, "creating recipe");
                self.dispatch(RecipeAction::CreateRecipe {
                    client_id,
                    fields: fields.clone(),
                })?;
                Ok(self.effects.create_recipe(client_id, fields))
            }
            DraftKey::Saved(id) => {
                info!(%id, "updating recipe");
                self.dispatch(RecipeAction::UpdateRecipe {
                    id,
                    fields: fields.clone(),
                })?;
                Ok(self.effects.update_recipe(id, fields))
            }
        }
    }

    pub fn cancel_draft(&self) -> Result<DispatchOutcome> {
        let draft = self.draft()?;
        match draft.value().and_then(DraftRecipe::recipe_id) {
            Some(id) => self.dispatch(RecipeAction::CancelEdit { id }),
            None => self.dispatch(RecipeAction::CancelAdd),
        }
    }

    pub fn delete_recipe(&self, id: RecipeId) -> Result<JoinHandle<()>> {
        self.dispatch(RecipeAction::DeleteRecipe { id })?;
        Ok(self.effects.delete_recipe(id))
    }

    pub fn load_preview(&self, recipe_ids: Vec<RecipeId>) -> Result<JoinHandle<()>> {
        self.dispatch(LibraryAction::LoadPreview {
            recipe_ids: recipe_ids.clone(),
        })?;
        Ok(self.effects.load_preview(recipe_ids))
    }

    pub fn assemble_shopping_list(
        &self,
        recipe_ids: Vec<RecipeId>,
        list_id: TaskId,
        with_heading: bool,
    ) -> Result<JoinHandle<()>> {
        self.dispatch(RecipeAction::AssembleShoppingList {
            recipe_ids: recipe_ids.clone(),
            list_id,
        })?;
        Ok(self
            .effects
            .assemble_shopping_list(recipe_ids, list_id, with_heading))
    }

    pub fn record_dissection(
        &self,
        recipe_id: RecipeId,
        dissection: RawIngredientDissection,
    ) -> Result<JoinHandle<()>> {
        self.dispatch(RecipeAction::RecordDissection {
            recipe_id,
            dissection: dissection.clone(),
        })?;
        Ok(self.effects.record_dissection(recipe_id, dissection))
    }

    pub fn load_lists(&self) -> Result<JoinHandle<()>> {
        self.dispatch(TaskAction::LoadLists)?;
        Ok(self.effects.load_lists())
    }

    pub fn create_list(&self, name: &str) -> Result<JoinHandle<()>> {
        self.dispatch(TaskAction::CreateList {
            name: name.to_string(),
        })?;
        Ok(self.effects.create_list(name.to_string()))
    }

    pub fn select_list(&self, id: TaskId) -> Result<DispatchOutcome> {
        self.dispatch(TaskAction::SelectList { id })
    }

    pub fn load_subtasks(&self, parent: TaskId) -> Result<JoinHandle<()>> {
        self.dispatch(TaskAction::LoadSubtasks { parent })?;
        Ok(self.effects.load_subtasks(parent))
    }

    pub fn create_subtask(
        &self,
        parent: TaskId,
        name: &str,
        after: Option<TaskId>,
    ) -> Result<JoinHandle<()>> {
        Ok(self
            .effects
            .create_subtask(parent, name.to_string(), after))
    }

    pub fn rename_task(&self, id: TaskId, name: &str) -> Result<JoinHandle<()>> {
        self.dispatch(TaskAction::RenameTask {
            id,
            name: name.to_string(),
        })?;
        Ok(self.effects.rename_task(id, name.to_string()))
    }

    pub fn delete_task(&self, id: TaskId) -> Result<JoinHandle<()>> {
        self.dispatch(TaskAction::DeleteTask { id })?;
        Ok(self.effects.delete_task(id))
    }

    pub fn complete_task(&self, id: TaskId) -> Result<JoinHandle<()>> {
        self.dispatch(TaskAction::CompleteTask { id })?;
        Ok(self.effects.complete_task(id))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
