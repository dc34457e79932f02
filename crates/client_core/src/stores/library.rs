use std::{collections::HashMap, sync::Arc};

use shared::{
    domain::{ClientId, Recipe, RecipeFields, RecipeId},
    protocol::ShoppingListPreview,
};

use crate::{
    action::{AppAction, LibraryAction, RecipeAction},
    dispatch::{ReduceContext, Store},
    load_object::LoadObject,
};

/// The user's recipes as last seen from the server, plus creates still in
/// flight keyed by their client id.
#[derive(Debug, Clone, Default)]
pub struct LibraryState {
    /// Recipe ids ordered by name.
    pub library: LoadObject<Vec<RecipeId>>,
    pub recipes: HashMap<RecipeId, LoadObject<Recipe>>,
    pub pending: HashMap<ClientId, LoadObject<RecipeFields>>,
    pub preview: LoadObject<ShoppingListPreview>,
}

impl LibraryState {
    pub fn recipe(&self, id: RecipeId) -> Option<&LoadObject<Recipe>> {
        self.recipes.get(&id)
    }

    /// The library in display order. Recipes without a value are skipped.
    pub fn library_recipes(&self) -> LoadObject<Vec<Recipe>> {
        self.library.clone().map(|ids| {
            ids.iter()
                .filter_map(|id| self.recipes.get(id).and_then(LoadObject::value))
                .cloned()
                .collect()
        })
    }

    fn sort_library(&mut self) {
        let recipes = &self.recipes;
        let library = std::mem::take(&mut self.library);
        self.library = library.map(|mut ids| {
            ids.sort_by_cached_key(|id| {
                let name = recipes
                    .get(id)
                    .and_then(LoadObject::value)
                    .map(|r| r.name().to_lowercase())
                    .unwrap_or_default();
                (name, *id)
            });
            ids
        });
    }

    fn add_to_library(&mut self, id: RecipeId) {
        let library = std::mem::take(&mut self.library);
        self.library = library.map(|mut ids| {
            if !ids.contains(&id) {
                ids.push(id);
            }
            ids
        });
        self.sort_library();
    }
}

#[derive(Debug, Default)]
pub struct LibraryStore;

impl Store<AppAction> for LibraryStore {
    type State = LibraryState;

    fn initial_state(&self) -> Arc<LibraryState> {
        Arc::new(LibraryState::default())
    }

    fn reduce(
        &self,
        state: &Arc<LibraryState>,
        action: &AppAction,
        _ctx: &ReduceContext<'_>,
    ) -> Arc<LibraryState> {
        match action {
            AppAction::Library(action) => reduce_library(state, action),
            AppAction::Recipe(action) => reduce_recipe(state, action),
            _ => Arc::clone(state),
        }
    }
}

fn reduce_library(state: &Arc<LibraryState>, action: &LibraryAction) -> Arc<LibraryState> {
    let mut next = LibraryState::clone(state);
    match action {
        LibraryAction::LoadLibrary => {
            next.library = next.library.loading();
        }
        LibraryAction::LibraryLoaded { recipes } => {
            let ids = recipes.iter().map(|r| r.id).collect();
            for recipe in recipes {
                next.recipes
                    .insert(recipe.id, LoadObject::with_value(recipe.clone()));
            }
            next.library = next.library.set_value(ids).done();
            next.sort_library();
        }
        LibraryAction::LibraryLoadFailed { error } => {
            next.library = next.library.error(error.clone());
        }
        LibraryAction::LoadRecipe { id } => {
            let entry = next.recipes.remove(id).unwrap_or_default().loading();
            next.recipes.insert(*id, entry);
        }
        LibraryAction::RecipeLoaded { recipe } => {
            next.recipes
                .insert(recipe.id, LoadObject::with_value(recipe.clone()));
            next.sort_library();
        }
        LibraryAction::RecipeLoadFailed { id, error } => {
            let entry = next.recipes.remove(id).unwrap_or_default();
            next.recipes.insert(*id, entry.error(error.clone()));
        }
        LibraryAction::LoadPreview { .. } => {
            next.preview = next.preview.loading();
        }
        LibraryAction::PreviewLoaded { preview, .. } => {
            next.preview = next.preview.set_value(preview.clone()).done();
        }
        LibraryAction::PreviewFailed { error, .. } => {
            next.preview = next.preview.error(error.clone());
        }
    }
    Arc::new(next)
}

fn reduce_recipe(state: &Arc<LibraryState>, action: &RecipeAction) -> Arc<LibraryState> {
    match action {
        RecipeAction::CreateRecipe { client_id, fields } => {
            let mut next = LibraryState::clone(state);
            next.pending.insert(
                *client_id,
                LoadObject::with_value(fields.clone()).creating(),
            );
            Arc::new(next)
        }
        RecipeAction::Created { client_id, recipe } => {
            let mut next = LibraryState::clone(state);
            next.pending.remove(client_id);
            next.recipes
                .insert(recipe.id, LoadObject::with_value(recipe.clone()));
            next.add_to_library(recipe.id);
            Arc::new(next)
        }
        RecipeAction::CreateFailed { client_id, .. } => {
            if !state.pending.contains_key(client_id) {
                return Arc::clone(state);
            }
            let mut next = LibraryState::clone(state);
            next.pending.remove(client_id);
            Arc::new(next)
        }
        RecipeAction::UpdateRecipe { id, .. } => {
            update_entry(state, *id, |lo| lo.has_value().then(|| lo.clone().updating()))
        }
        RecipeAction::Updated { recipe } => {
            let mut next = LibraryState::clone(state);
            next.recipes
                .insert(recipe.id, LoadObject::with_value(recipe.clone()));
            next.sort_library();
            Arc::new(next)
        }
        RecipeAction::UpdateFailed { id, error } | RecipeAction::DeleteFailed { id, error } => {
            update_entry(state, *id, |lo| Some(lo.clone().error(error.clone())))
        }
        RecipeAction::DeleteRecipe { id } => {
            update_entry(state, *id, |lo| Some(lo.clone().deleting()))
        }
        RecipeAction::Deleted { id } => {
            let mut next = LibraryState::clone(state);
            next.recipes.remove(id);
            next.library = next.library.map(|mut ids| {
                ids.retain(|r| r != id);
                ids
            });
            Arc::new(next)
        }
        _ => Arc::clone(state),
    }
}

/// Replaces one recipe entry; `f` returning `None` leaves the state as is.
fn update_entry(
    state: &Arc<LibraryState>,
    id: RecipeId,
    f: impl FnOnce(&LoadObject<Recipe>) -> Option<LoadObject<Recipe>>,
) -> Arc<LibraryState> {
    let Some(entry) = state.recipes.get(&id).and_then(f) else {
        return Arc::clone(state);
    };
    let mut next = LibraryState::clone(state);
    next.recipes.insert(id, entry);
    Arc::new(next)
}

#[cfg(test)]
#[path = "../tests/library_store_tests.rs"]
mod tests;
