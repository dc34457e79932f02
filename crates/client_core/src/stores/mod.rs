//! The client's stores. Each one reduces [`AppAction`]s into an immutable
//! snapshot.
//!
//! [`AppAction`]: crate::action::AppAction

mod draft_recipe;
mod library;
mod task;

pub use draft_recipe::{DraftKey, DraftRecipe, DraftRecipeStore, EDIT_RECIPE_ROUTE, NEW_RECIPE_ROUTE};
pub use library::{LibraryState, LibraryStore};
pub use task::{TaskState, TaskStore};

pub const LIBRARY_STORE: &str = "library";
pub const DRAFT_RECIPE_STORE: &str = "draft_recipe";
pub const TASK_STORE: &str = "tasks";
