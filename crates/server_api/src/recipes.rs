use shared::{
    domain::{Ingredient, Quantity, Recipe, RecipeFields, RecipeId, TaskId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        RawIngredientDissection, RecipeCommand, RecipeCommandResult, ShoppingListPreview, TaskInfo,
    },
    text::{parse_number, unpluralize},
};
use storage::{IngredientRefUpdate, NewTask};
use tracing::{debug, info};

use crate::{internal, require_name, tasks::load_owned, ApiContext};

const AGGREGATE_LIST_NAME: &str = "Shopping List";

pub async fn list_recipes(ctx: &ApiContext, user_id: UserId) -> Result<Vec<Recipe>, ApiError> {
    ctx.storage
        .list_recipes_for_owner(user_id)
        .await
        .map_err(internal)
}

pub async fn get_recipe(
    ctx: &ApiContext,
    user_id: UserId,
    recipe_id: RecipeId,
) -> Result<Recipe, ApiError> {
    let recipe = ctx
        .storage
        .load_recipe(recipe_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(format!("recipe {recipe_id} not found")))?;
    if recipe.owner_id != user_id {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            format!("recipe {recipe_id} belongs to another user"),
        ));
    }
    Ok(recipe)
}

pub async fn create_recipe(
    ctx: &ApiContext,
    user_id: UserId,
    fields: RecipeFields,
) -> Result<Recipe, ApiError> {
    let fields = normalize(fields)?;
    let recipe = ctx
        .storage
        .insert_recipe(user_id, &fields)
        .await
        .map_err(internal)?;
    info!(recipe_id = %recipe.id, %user_id, "recipe created");
    Ok(recipe)
}

pub async fn update_recipe(
    ctx: &ApiContext,
    user_id: UserId,
    recipe_id: RecipeId,
    fields: RecipeFields,
) -> Result<Recipe, ApiError> {
    get_recipe(ctx, user_id, recipe_id).await?;
    let fields = normalize(fields)?;
    ctx.storage
        .update_recipe(recipe_id, &fields)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(format!("recipe {recipe_id} not found")))
}

pub async fn delete_recipe(
    ctx: &ApiContext,
    user_id: UserId,
    recipe_id: RecipeId,
) -> Result<(), ApiError> {
    get_recipe(ctx, user_id, recipe_id).await?;
    ctx.storage
        .delete_recipe(recipe_id)
        .await
        .map_err(internal)?;
    info!(%recipe_id, %user_id, "recipe deleted");
    Ok(())
}

pub async fn run_recipe_command(
    ctx: &ApiContext,
    user_id: UserId,
    recipe_id: RecipeId,
    command: RecipeCommand,
) -> Result<RecipeCommandResult, ApiError> {
    match command {
        RecipeCommand::AssembleShoppingList {
            additional_recipe_ids,
            list_id,
            with_heading,
        } => {
            let added = assemble_shopping_list(
                ctx,
                user_id,
                recipe_id,
                &additional_recipe_ids,
                list_id,
                with_heading,
            )
            .await?;
            Ok(RecipeCommandResult::ShoppingListAssembled { list_id, added })
        }
        RecipeCommand::PreviewShoppingList {
            additional_recipe_ids,
        } => {
            let preview =
                preview_shopping_list(ctx, user_id, recipe_id, &additional_recipe_ids).await?;
            Ok(RecipeCommandResult::ShoppingListPreview { preview })
        }
        RecipeCommand::DissectRawIngredient { dissection } => {
            let updated_refs = record_dissection(ctx, user_id, &dissection).await?;
            Ok(RecipeCommandResult::DissectionRecorded { updated_refs })
        }
    }
}

/// Adds the ingredients of one or more recipes to a task list, merging
/// quantities of the same dissected ingredient and unit. Either every item is
/// written or none is.
pub async fn assemble_shopping_list(
    ctx: &ApiContext,
    user_id: UserId,
    recipe_id: RecipeId,
    additional_recipe_ids: &[RecipeId],
    list_id: TaskId,
    with_heading: bool,
) -> Result<Vec<TaskInfo>, ApiError> {
    load_owned(ctx, user_id, list_id).await?;
    let recipes = load_recipes(ctx, user_id, recipe_id, additional_recipe_ids).await?;
    let items = aggregate(&recipes);

    let heading = with_heading.then(|| list_name(&recipes));
    let new_tasks: Vec<NewTask<'_>> = items
        .iter()
        .map(|item| NewTask {
            name: &item.text,
            quantity: item.amount,
        })
        .collect();
    let position = next_position(ctx, list_id).await?;
    let batch = ctx
        .storage
        .insert_task_batch(user_id, list_id, heading, &new_tasks, position)
        .await
        .map_err(internal)?;

    let parent = batch.heading.unwrap_or(list_id);
    let mut added = Vec::with_capacity(items.len() + 1);
    if let (Some(id), Some(name)) = (batch.heading, heading) {
        added.push(TaskInfo {
            id,
            name: name.to_string(),
            parent_id: Some(list_id),
            subtask_ids: batch.items.clone(),
        });
    }
    for (id, item) in batch.items.into_iter().zip(items) {
        added.push(TaskInfo {
            id,
            name: item.text,
            parent_id: Some(parent),
            subtask_ids: Vec::new(),
        });
    }
    info!(%list_id, %recipe_id, items = added.len(), "shopping list assembled");
    Ok(added)
}

pub async fn preview_shopping_list(
    ctx: &ApiContext,
    user_id: UserId,
    recipe_id: RecipeId,
    additional_recipe_ids: &[RecipeId],
) -> Result<ShoppingListPreview, ApiError> {
    let recipes = load_recipes(ctx, user_id, recipe_id, additional_recipe_ids).await?;
    Ok(ShoppingListPreview {
        name: list_name(&recipes).to_string(),
        items: aggregate(&recipes).into_iter().map(|item| item.text).collect(),
    })
}

/// Records a cook's breakdown of a raw ingredient line and applies it to
/// every ingredient ref with the same raw text.
pub async fn record_dissection(
    ctx: &ApiContext,
    user_id: UserId,
    dissection: &RawIngredientDissection,
) -> Result<u64, ApiError> {
    let quantity = match dissection.quantity.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(text) => Some(parse_number(text).ok_or_else(|| {
            ApiError::validation(format!("Quantity '{text}' cannot be parsed."))
        })?),
    };
    let name = require_name(&dissection.name, "ingredient")?;
    let ingredient = ensure_ingredient_by_name(ctx, user_id, &name).await?;
    let units = dissection
        .units
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    let preparation = dissection
        .prep
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let updated = ctx
        .storage
        .update_ingredient_refs_by_raw(&IngredientRefUpdate {
            raw: &dissection.raw,
            quantity,
            units,
            ingredient: &ingredient,
            preparation,
        })
        .await
        .map_err(internal)?;
    debug!(raw = %dissection.raw, ingredient = ingredient.name(), updated, "dissection recorded");
    Ok(updated)
}

/// Pantry item by singular name, then one of the user's recipes by exact or
/// singular name, else a new pantry item.
async fn ensure_ingredient_by_name(
    ctx: &ApiContext,
    user_id: UserId,
    name: &str,
) -> Result<Ingredient, ApiError> {
    let singular = unpluralize(name);
    if let Some((id, name)) = ctx
        .storage
        .find_pantry_item_by_name(&singular)
        .await
        .map_err(internal)?
    {
        return Ok(Ingredient::PantryItem { id, name });
    }
    for candidate in [name, singular.as_str()] {
        if let Some((id, name)) = ctx
            .storage
            .find_recipe_by_owner_and_name(user_id, candidate)
            .await
            .map_err(internal)?
        {
            return Ok(Ingredient::Recipe { id, name });
        }
    }
    let id = ctx
        .storage
        .create_pantry_item(&singular)
        .await
        .map_err(internal)?;
    Ok(Ingredient::PantryItem { id, name: singular })
}

async fn load_recipes(
    ctx: &ApiContext,
    user_id: UserId,
    recipe_id: RecipeId,
    additional_recipe_ids: &[RecipeId],
) -> Result<Vec<Recipe>, ApiError> {
    let mut recipes = Vec::with_capacity(1 + additional_recipe_ids.len());
    for id in std::iter::once(&recipe_id).chain(additional_recipe_ids) {
        recipes.push(get_recipe(ctx, user_id, *id).await?);
    }
    Ok(recipes)
}

fn list_name(recipes: &[Recipe]) -> &str {
    match recipes {
        [only] => only.name(),
        _ => AGGREGATE_LIST_NAME,
    }
}

async fn next_position(ctx: &ApiContext, parent: TaskId) -> Result<i64, ApiError> {
    let count = ctx
        .storage
        .list_subtasks(parent)
        .await
        .map_err(internal)?
        .len();
    Ok(i64::try_from(count).unwrap_or(i64::MAX))
}

fn normalize(mut fields: RecipeFields) -> Result<RecipeFields, ApiError> {
    fields.name = require_name(&fields.name, "recipe")?;
    fields.ingredients.retain(|ing| !ing.is_blank());
    for ing in &mut fields.ingredients {
        ing.raw = ing.raw.trim().to_string();
    }
    Ok(fields)
}

#[derive(Debug, Clone, PartialEq)]
struct ShoppingItem {
    text: String,
    amount: Option<f64>,
}

#[derive(Debug)]
struct Merged {
    name: String,
    units: Option<String>,
    amount: Option<f64>,
}

enum Line {
    Merged(usize),
    Raw(String),
}

fn aggregate(recipes: &[Recipe]) -> Vec<ShoppingItem> {
    let mut merged: Vec<Merged> = Vec::new();
    let mut lines = Vec::new();
    for ing in recipes.iter().flat_map(|r| r.fields.ingredients.iter()) {
        if ing.is_blank() {
            continue;
        }
        let Some(ingredient) = &ing.ingredient else {
            lines.push(Line::Raw(ing.raw.trim().to_string()));
            continue;
        };
        let units = ing.quantity.as_ref().and_then(|q| q.units.clone());
        let amount = ing.quantity.as_ref().map(|q| q.amount);
        // lines without an amount stay apart from measured ones
        let existing = merged.iter().position(|m| {
            m.name.eq_ignore_ascii_case(ingredient.name())
                && m.units.as_deref().map(str::to_lowercase)
                    == units.as_deref().map(str::to_lowercase)
                && m.amount.is_some() == amount.is_some()
        });
        match existing {
            Some(idx) => {
                let entry = &mut merged[idx];
                if let (Some(total), Some(more)) = (&mut entry.amount, amount) {
                    *total += more;
                }
            }
            None => {
                merged.push(Merged {
                    name: ingredient.name().to_string(),
                    units,
                    amount,
                });
                lines.push(Line::Merged(merged.len() - 1));
            }
        }
    }

    lines
        .into_iter()
        .map(|line| match line {
            Line::Raw(text) => ShoppingItem { text, amount: None },
            Line::Merged(idx) => {
                let entry = &merged[idx];
                match entry.amount {
                    Some(amount) => ShoppingItem {
                        text: format!(
                            "{} {}",
                            Quantity {
                                amount,
                                units: entry.units.clone()
                            },
                            entry.name
                        ),
                        amount: Some(amount),
                    },
                    None => ShoppingItem {
                        text: entry.name.clone(),
                        amount: None,
                    },
                }
            }
        })
        .collect()
}
