use std::sync::Arc;

use shared::domain::{ClientId, IngredientRef, RecipeFields, RecipeId};
use tracing::warn;

use crate::{
    action::{AppAction, DraftAction, DraftField, LibraryAction, RecipeAction, RouteAction},
    dispatch::{ReduceContext, Store, StoreToken},
    ingredient_lines,
    load_object::{LoadObject, LoadState},
};

use super::LibraryState;

pub const EDIT_RECIPE_ROUTE: &str = "/library/recipe/:id/edit";
pub const NEW_RECIPE_ROUTE: &str = "/add";

/// Which recipe a draft belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DraftKey {
    /// Not saved yet.
    Client(ClientId),
    Saved(RecipeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftRecipe {
    pub key: DraftKey,
    pub fields: RecipeFields,
}

impl DraftRecipe {
    /// An unsaved recipe with one blank ingredient line.
    pub fn fresh() -> Self {
        Self {
            key: DraftKey::Client(ClientId::next()),
            fields: RecipeFields {
                ingredients: vec![IngredientRef::blank()],
                ..RecipeFields::default()
            },
        }
    }

    pub fn client_id(&self) -> Option<ClientId> {
        match self.key {
            DraftKey::Client(id) => Some(id),
            DraftKey::Saved(_) => None,
        }
    }

    pub fn recipe_id(&self) -> Option<RecipeId> {
        match self.key {
            DraftKey::Saved(id) => Some(id),
            DraftKey::Client(_) => None,
        }
    }

    fn apply(&self, field: &DraftField) -> Option<Self> {
        let mut next = self.clone();
        let fields = &mut next.fields;
        match field {
            DraftField::Name(name) => fields.name = name.clone(),
            DraftField::ExternalUrl(url) => fields.external_url = url.clone(),
            DraftField::Directions(directions) => fields.directions = directions.clone(),
            DraftField::Yield(yield_) => fields.yield_ = *yield_,
            DraftField::TotalTime(minutes) => fields.total_time = *minutes,
            DraftField::Labels(labels) => fields.labels = labels.clone(),
            DraftField::IngredientRaw { index, raw } => {
                let line = fields.ingredients.get_mut(*index)?;
                *line = IngredientRef::raw(raw.clone());
            }
        }
        Some(next)
    }

    fn with_ingredients(&self, ingredients: Vec<IngredientRef>) -> Self {
        let mut next = self.clone();
        next.fields.ingredients = ingredients;
        next
    }
}

/// The recipe being added or edited.
pub struct DraftRecipeStore {
    library: StoreToken,
}

impl DraftRecipeStore {
    pub fn new(library: StoreToken) -> Self {
        Self { library }
    }

    fn fresh() -> Arc<LoadObject<DraftRecipe>> {
        Arc::new(LoadObject::with_value(DraftRecipe::fresh()))
    }
}

type DraftState = LoadObject<DraftRecipe>;

impl Store<AppAction> for DraftRecipeStore {
    type State = DraftState;

    fn initial_state(&self) -> Arc<DraftState> {
        Self::fresh()
    }

    fn wait_for(&self, action: &AppAction) -> Vec<StoreToken> {
        match action {
            AppAction::Route(RouteAction::Matched { pattern, .. }) if pattern == EDIT_RECIPE_ROUTE => {
                vec![self.library]
            }
            AppAction::Library(
                LibraryAction::LibraryLoaded { .. } | LibraryAction::RecipeLoaded { .. },
            ) => vec![self.library],
            _ => Vec::new(),
        }
    }

    fn reduce(
        &self,
        state: &Arc<DraftState>,
        action: &AppAction,
        ctx: &ReduceContext<'_>,
    ) -> Arc<DraftState> {
        match action {
            AppAction::Route(RouteAction::Matched { pattern, params }) => match pattern.as_str() {
                EDIT_RECIPE_ROUTE => {
                    let Some(id) = params.get("id").and_then(|id| id.parse::<i64>().ok()) else {
                        warn!(?params, "edit route without a numeric recipe id");
                        return Arc::clone(state);
                    };
                    let loading = Arc::new(
                        LoadObject::with_value(DraftRecipe {
                            key: DraftKey::Saved(RecipeId(id)),
                            fields: RecipeFields::default(),
                        })
                        .loading(),
                    );
                    self.load_if_possible(&loading, ctx)
                }
                NEW_RECIPE_ROUTE => Self::fresh(),
                _ => Arc::clone(state),
            },
            AppAction::Library(
                LibraryAction::LibraryLoaded { .. } | LibraryAction::RecipeLoaded { .. },
            ) => self.load_if_possible(state, ctx),
            AppAction::Draft(action) => reduce_edit(state, action),
            AppAction::Recipe(action) => reduce_lifecycle(state, action),
            _ => Arc::clone(state),
        }
    }
}

impl DraftRecipeStore {
    /// Fills a loading draft for a saved recipe from the library, once the
    /// library has it. Every loaded draft has at least one ingredient line.
    fn load_if_possible(&self, state: &Arc<DraftState>, ctx: &ReduceContext<'_>) -> Arc<DraftState> {
        if state.state() != LoadState::Loading {
            return Arc::clone(state);
        }
        let Some(DraftKey::Saved(id)) = state.value().map(|d| d.key) else {
            return Arc::clone(state);
        };
        let Some(library) = ctx.settled::<LibraryState>(self.library) else {
            return Arc::clone(state);
        };
        let Some(recipe) = library.recipe(id).and_then(LoadObject::value) else {
            return Arc::clone(state);
        };

        let mut fields = recipe.fields.clone();
        if fields.ingredients.is_empty() {
            fields.ingredients.push(IngredientRef::blank());
        }
        Arc::new(
            LoadObject::clone(state)
                .set_value(DraftRecipe {
                    key: DraftKey::Saved(id),
                    fields,
                })
                .done(),
        )
    }
}

fn reduce_edit(state: &Arc<DraftState>, action: &DraftAction) -> Arc<DraftState> {
    let Some(draft) = state.value() else {
        return Arc::clone(state);
    };
    let lines = &draft.fields.ingredients;
    let edited = match action {
        DraftAction::Update(field) => draft.apply(field),
        DraftAction::NewIngredient { index } => {
            Some(draft.with_ingredients(ingredient_lines::insert_after(lines, *index)))
        }
        DraftAction::KillIngredient { index } => {
            ingredient_lines::delete_at(lines, *index).map(|l| draft.with_ingredients(l))
        }
        DraftAction::MultiLinePaste { index, text } => {
            ingredient_lines::paste_at(lines, *index, text).map(|l| draft.with_ingredients(l))
        }
    };
    match edited {
        Some(draft) => Arc::new(LoadObject::clone(state).set_value(draft)),
        None => Arc::clone(state),
    }
}

/// Correlates create/update results with the draft they came from. Results
/// for another draft are ignored.
fn reduce_lifecycle(state: &Arc<DraftState>, action: &RecipeAction) -> Arc<DraftState> {
    let key = state.value().map(|d| d.key);
    let is_client = |id: &ClientId| key == Some(DraftKey::Client(*id));
    let is_saved = |id: &RecipeId| key == Some(DraftKey::Saved(*id));

    match action {
        RecipeAction::CreateRecipe { client_id, .. } if is_client(client_id) => {
            Arc::new(LoadObject::clone(state).creating())
        }
        RecipeAction::Created { client_id, .. } if is_client(client_id) => {
            DraftRecipeStore::fresh()
        }
        RecipeAction::CreateFailed { client_id, .. } if is_client(client_id) => {
            Arc::new(LoadObject::clone(state).done())
        }
        RecipeAction::UpdateRecipe { id, .. } if is_saved(id) => {
            Arc::new(LoadObject::clone(state).updating())
        }
        RecipeAction::Updated { recipe } if is_saved(&recipe.id) => {
            Arc::new(LoadObject::clone(state).done())
        }
        RecipeAction::UpdateFailed { id, .. } if is_saved(id) => {
            Arc::new(LoadObject::clone(state).done())
        }
        RecipeAction::CancelAdd | RecipeAction::CancelEdit { .. } => DraftRecipeStore::fresh(),
        _ => Arc::clone(state),
    }
}

#[cfg(test)]
#[path = "../tests/draft_recipe_tests.rs"]
mod tests;
