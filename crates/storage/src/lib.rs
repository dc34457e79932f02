use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{
        Ingredient, IngredientRef, PantryItemId, Quantity, Recipe, RecipeFields, RecipeId, TaskId,
        UserId,
    },
    task::TaskNode,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredTask {
    pub id: TaskId,
    pub owner_id: UserId,
    pub parent_id: Option<TaskId>,
    pub name: String,
    pub position: i64,
    pub quantity: Option<f64>,
}

impl StoredTask {
    pub fn to_node(&self) -> TaskNode {
        TaskNode {
            id: self.id,
            name: self.name.clone(),
            quantity: self.quantity,
            parent_id: self.parent_id,
            position: usize::try_from(self.position).unwrap_or_default(),
        }
    }
}

/// New values for every ingredient ref sharing one raw line.
#[derive(Debug, Clone)]
pub struct IngredientRefUpdate<'a> {
    pub raw: &'a str,
    pub quantity: Option<f64>,
    pub units: Option<&'a str>,
    pub ingredient: &'a Ingredient,
    pub preparation: Option<&'a str>,
}

/// One task of a batch written by [`Storage::insert_task_batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask<'a> {
    pub name: &'a str,
    pub quantity: Option<f64>,
}

/// Ids written by [`Storage::insert_task_batch`], items in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskBatch {
    pub heading: Option<TaskId>,
    pub items: Vec<TaskId>,
}

const TASK_COLUMNS: &str = "id, owner_id, parent_id, name, position, quantity";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if database_url.contains(":memory:") {
            // every connection to sqlite::memory: is a separate database
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, username: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (username) VALUES (?)
             ON CONFLICT(username) DO UPDATE SET username=excluded.username
             RETURNING id",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn username_for_user(&self, user_id: UserId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT username FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn insert_recipe(&self, owner_id: UserId, fields: &RecipeFields) -> Result<Recipe> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO recipes (owner_id, name, external_url, directions, yield, total_time, labels, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(owner_id.0)
        .bind(&fields.name)
        .bind(fields.external_url.as_deref())
        .bind(fields.directions.as_deref())
        .bind(fields.yield_)
        .bind(fields.total_time)
        .bind(serde_json::to_string(&fields.labels)?)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert recipe")?;
        let recipe_id = RecipeId(rec.get::<i64, _>(0));
        replace_ingredients(&mut tx, recipe_id, &fields.ingredients).await?;
        tx.commit().await?;

        self.load_recipe(recipe_id)
            .await?
            .with_context(|| format!("recipe {recipe_id} vanished after insert"))
    }

    /// Overwrites every field of an existing recipe. `None` when it does not
    /// exist.
    pub async fn update_recipe(
        &self,
        recipe_id: RecipeId,
        fields: &RecipeFields,
    ) -> Result<Option<Recipe>> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE recipes
             SET name = ?, external_url = ?, directions = ?, yield = ?, total_time = ?, labels = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&fields.name)
        .bind(fields.external_url.as_deref())
        .bind(fields.directions.as_deref())
        .bind(fields.yield_)
        .bind(fields.total_time)
        .bind(serde_json::to_string(&fields.labels)?)
        .bind(Utc::now())
        .bind(recipe_id.0)
        .execute(&mut *tx)
        .await
        .context("failed to update recipe")?
        .rows_affected();
        if updated == 0 {
            return Ok(None);
        }
        replace_ingredients(&mut tx, recipe_id, &fields.ingredients).await?;
        tx.commit().await?;
        self.load_recipe(recipe_id).await
    }

    pub async fn load_recipe(&self, recipe_id: RecipeId) -> Result<Option<Recipe>> {
        let row = sqlx::query(
            "SELECT id, owner_id, name, external_url, directions, yield, total_time, labels, updated_at
             FROM recipes WHERE id = ?",
        )
        .bind(recipe_id.0)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut recipe = recipe_from_row(&row)?;
        recipe.fields.ingredients = self.load_ingredients(recipe.id).await?;
        Ok(Some(recipe))
    }

    pub async fn list_recipes_for_owner(&self, owner_id: UserId) -> Result<Vec<Recipe>> {
        let rows = sqlx::query(
            "SELECT id, owner_id, name, external_url, directions, yield, total_time, labels, updated_at
             FROM recipes WHERE owner_id = ?
             ORDER BY lower(name) ASC, id ASC",
        )
        .bind(owner_id.0)
        .fetch_all(&self.pool)
        .await?;
        let mut recipes = Vec::with_capacity(rows.len());
        for row in rows {
            let mut recipe = recipe_from_row(&row)?;
            recipe.fields.ingredients = self.load_ingredients(recipe.id).await?;
            recipes.push(recipe);
        }
        Ok(recipes)
    }

    pub async fn delete_recipe(&self, recipe_id: RecipeId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = ?")
            .bind(recipe_id.0)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM recipes WHERE id = ?")
            .bind(recipe_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }

    pub async fn find_recipe_by_owner_and_name(
        &self,
        owner_id: UserId,
        name: &str,
    ) -> Result<Option<(RecipeId, String)>> {
        let row = sqlx::query(
            "SELECT id, name FROM recipes
             WHERE owner_id = ? AND name = ? COLLATE NOCASE
             ORDER BY id ASC LIMIT 1",
        )
        .bind(owner_id.0)
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| (RecipeId(r.get::<i64, _>(0)), r.get::<String, _>(1))))
    }

    pub async fn find_pantry_item_by_name(
        &self,
        name: &str,
    ) -> Result<Option<(PantryItemId, String)>> {
        let row = sqlx::query("SELECT id, name FROM pantry_items WHERE name = ? COLLATE NOCASE")
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| (PantryItemId(r.get::<i64, _>(0)), r.get::<String, _>(1))))
    }

    pub async fn create_pantry_item(&self, name: &str) -> Result<PantryItemId> {
        let rec = sqlx::query(
            "INSERT INTO pantry_items (name) VALUES (?)
             ON CONFLICT(name) DO UPDATE SET name=pantry_items.name
             RETURNING id",
        )
        .bind(name.trim())
        .fetch_one(&self.pool)
        .await
        .context("failed to create pantry item")?;
        Ok(PantryItemId(rec.get::<i64, _>(0)))
    }

    /// Applies a dissection to every ingredient ref with exactly this raw
    /// text, across all recipes. Returns the number of refs touched.
    pub async fn update_ingredient_refs_by_raw(&self, update: &IngredientRefUpdate<'_>) -> Result<u64> {
        let (kind, id) = ingredient_columns(update.ingredient);
        let affected = sqlx::query(
            "UPDATE recipe_ingredients
             SET quantity = ?, units = ?, ingredient_kind = ?, ingredient_id = ?, preparation = ?
             WHERE raw = ?",
        )
        .bind(update.quantity)
        .bind(update.units)
        .bind(kind)
        .bind(id)
        .bind(update.preparation)
        .bind(update.raw)
        .execute(&self.pool)
        .await
        .context("failed to update ingredient refs")?
        .rows_affected();
        Ok(affected)
    }

    pub async fn create_task(
        &self,
        owner_id: UserId,
        parent_id: Option<TaskId>,
        name: &str,
        position: i64,
    ) -> Result<TaskId> {
        let rec = sqlx::query(
            "INSERT INTO tasks (owner_id, parent_id, name, position) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(owner_id.0)
        .bind(parent_id.map(|p| p.0))
        .bind(name)
        .bind(position)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert task")?;
        Ok(TaskId(rec.get::<i64, _>(0)))
    }

    pub async fn set_task_quantity(&self, task_id: TaskId, quantity: Option<f64>) -> Result<()> {
        sqlx::query("UPDATE tasks SET quantity = ? WHERE id = ?")
            .bind(quantity)
            .bind(task_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Appends `items` under `list_id` starting at `position`, or under a new
    /// heading task placed there when `heading` is given. All rows are written
    /// in one transaction.
    pub async fn insert_task_batch(
        &self,
        owner_id: UserId,
        list_id: TaskId,
        heading: Option<&str>,
        items: &[NewTask<'_>],
        position: i64,
    ) -> Result<TaskBatch> {
        let mut tx = self.pool.begin().await?;
        let mut parent = list_id;
        let mut next = position;
        let mut heading_id = None;
        if let Some(name) = heading {
            let id = insert_task_row(&mut tx, owner_id, list_id, name, position, None)
                .await
                .with_context(|| format!("failed to insert heading {name:?}"))?;
            heading_id = Some(id);
            parent = id;
            next = 0;
        }

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = insert_task_row(&mut tx, owner_id, parent, item.name, next, item.quantity)
                .await
                .with_context(|| format!("failed to insert task {:?}", item.name))?;
            ids.push(id);
            next += 1;
        }
        tx.commit().await?;
        Ok(TaskBatch {
            heading: heading_id,
            items: ids,
        })
    }

    pub async fn load_task(&self, task_id: TaskId) -> Result<Option<StoredTask>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(task_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| task_from_row(&r)))
    }

    pub async fn list_task_lists(&self, owner_id: UserId) -> Result<Vec<StoredTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE owner_id = ? AND parent_id IS NULL
             ORDER BY position ASC, id ASC"
        ))
        .bind(owner_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    pub async fn list_subtasks(&self, parent_id: TaskId) -> Result<Vec<StoredTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE parent_id = ?
             ORDER BY position ASC, id ASC"
        ))
        .bind(parent_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    pub async fn max_list_position(&self, owner_id: UserId) -> Result<Option<i64>> {
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(position) FROM tasks WHERE owner_id = ? AND parent_id IS NULL",
        )
        .bind(owner_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(max)
    }

    /// The list (root task) a task belongs to.
    pub async fn root_of(&self, task_id: TaskId) -> Result<Option<TaskId>> {
        let row = sqlx::query(
            "WITH RECURSIVE up(id, parent_id) AS (
                 SELECT id, parent_id FROM tasks WHERE id = ?
                 UNION ALL
                 SELECT t.id, t.parent_id FROM tasks t INNER JOIN up ON t.id = up.parent_id
             )
             SELECT id FROM up WHERE parent_id IS NULL",
        )
        .bind(task_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| TaskId(r.get::<i64, _>(0))))
    }

    /// A root task and all of its descendants.
    pub async fn load_task_tree(&self, root_id: TaskId) -> Result<Vec<StoredTask>> {
        let rows = sqlx::query(
            "WITH RECURSIVE down(id) AS (
                 SELECT id FROM tasks WHERE id = ?
                 UNION ALL
                 SELECT t.id FROM tasks t INNER JOIN down ON t.parent_id = down.id
             )
             SELECT t.id, t.owner_id, t.parent_id, t.name, t.position, t.quantity
             FROM tasks t INNER JOIN down ON down.id = t.id",
        )
        .bind(root_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    pub async fn rename_task(&self, task_id: TaskId, name: &str) -> Result<bool> {
        let affected = sqlx::query("UPDATE tasks SET name = ? WHERE id = ?")
            .bind(name)
            .bind(task_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    /// Writes `(task, parent, position)` triples in one transaction.
    pub async fn save_placements(&self, placements: &[(TaskId, TaskId, usize)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (task_id, parent_id, position) in placements {
            sqlx::query("UPDATE tasks SET parent_id = ?, position = ? WHERE id = ?")
                .bind(parent_id.0)
                .bind(i64::try_from(*position).unwrap_or(i64::MAX))
                .bind(task_id.0)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to place task {task_id}"))?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_tasks(&self, task_ids: &[TaskId]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        // children first so the parent foreign key never dangles
        for task_id in task_ids.iter().rev() {
            deleted += sqlx::query("DELETE FROM tasks WHERE id = ?")
                .bind(task_id.0)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn load_ingredients(&self, recipe_id: RecipeId) -> Result<Vec<IngredientRef>> {
        let rows = sqlx::query(
            "SELECT ri.raw, ri.quantity, ri.units, ri.preparation, ri.ingredient_kind, ri.ingredient_id,
                    COALESCE(p.name, r.name)
             FROM recipe_ingredients ri
             LEFT JOIN pantry_items p ON ri.ingredient_kind = 'pantry_item' AND p.id = ri.ingredient_id
             LEFT JOIN recipes r ON ri.ingredient_kind = 'recipe' AND r.id = ri.ingredient_id
             WHERE ri.recipe_id = ?
             ORDER BY ri.idx ASC",
        )
        .bind(recipe_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let quantity = r.get::<Option<f64>, _>(1).map(|amount| Quantity {
                    amount,
                    units: r.get::<Option<String>, _>(2),
                });
                let ingredient = match (
                    r.get::<Option<String>, _>(4).as_deref(),
                    r.get::<Option<i64>, _>(5),
                    r.get::<Option<String>, _>(6),
                ) {
                    (Some("pantry_item"), Some(id), Some(name)) => Some(Ingredient::PantryItem {
                        id: PantryItemId(id),
                        name,
                    }),
                    (Some("recipe"), Some(id), Some(name)) => Some(Ingredient::Recipe {
                        id: RecipeId(id),
                        name,
                    }),
                    _ => None,
                };
                IngredientRef {
                    raw: r.get::<String, _>(0),
                    quantity,
                    preparation: r.get::<Option<String>, _>(3),
                    ingredient,
                }
            })
            .collect())
    }
}

async fn replace_ingredients(
    tx: &mut Transaction<'_, Sqlite>,
    recipe_id: RecipeId,
    ingredients: &[IngredientRef],
) -> Result<()> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = ?")
        .bind(recipe_id.0)
        .execute(&mut **tx)
        .await?;
    for (idx, ing) in ingredients.iter().enumerate() {
        let (kind, id) = match &ing.ingredient {
            Some(ingredient) => {
                let (kind, id) = ingredient_columns(ingredient);
                (Some(kind), Some(id))
            }
            None => (None, None),
        };
        sqlx::query(
            "INSERT INTO recipe_ingredients
                 (recipe_id, idx, raw, quantity, units, preparation, ingredient_kind, ingredient_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(recipe_id.0)
        .bind(i64::try_from(idx).unwrap_or(i64::MAX))
        .bind(&ing.raw)
        .bind(ing.quantity.as_ref().map(|q| q.amount))
        .bind(ing.quantity.as_ref().and_then(|q| q.units.as_deref()))
        .bind(ing.preparation.as_deref())
        .bind(kind)
        .bind(id)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("failed to store ingredient {idx} of recipe {recipe_id}"))?;
    }
    Ok(())
}

fn ingredient_columns(ingredient: &Ingredient) -> (&'static str, i64) {
    match ingredient {
        Ingredient::PantryItem { id, .. } => ("pantry_item", id.0),
        Ingredient::Recipe { id, .. } => ("recipe", id.0),
    }
}

fn recipe_from_row(r: &SqliteRow) -> Result<Recipe> {
    let labels: Vec<String> = serde_json::from_str(&r.get::<String, _>(7))
        .context("recipe labels are not a json array")?;
    Ok(Recipe {
        id: RecipeId(r.get::<i64, _>(0)),
        owner_id: UserId(r.get::<i64, _>(1)),
        fields: RecipeFields {
            name: r.get::<String, _>(2),
            external_url: r.get::<Option<String>, _>(3),
            directions: r.get::<Option<String>, _>(4),
            yield_: r.get::<Option<u32>, _>(5),
            total_time: r.get::<Option<u32>, _>(6),
            labels,
            ingredients: Vec::new(),
        },
        updated_at: Some(r.get::<DateTime<Utc>, _>(8)),
    })
}

async fn insert_task_row(
    tx: &mut Transaction<'_, Sqlite>,
    owner_id: UserId,
    parent_id: TaskId,
    name: &str,
    position: i64,
    quantity: Option<f64>,
) -> Result<TaskId> {
    let rec = sqlx::query(
        "INSERT INTO tasks (owner_id, parent_id, name, position, quantity)
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(owner_id.0)
    .bind(parent_id.0)
    .bind(name)
    .bind(position)
    .bind(quantity)
    .fetch_one(&mut **tx)
    .await?;
    Ok(TaskId(rec.get::<i64, _>(0)))
}

fn task_from_row(r: &SqliteRow) -> StoredTask {
    StoredTask {
        id: TaskId(r.get::<i64, _>(0)),
        owner_id: UserId(r.get::<i64, _>(1)),
        parent_id: r.get::<Option<i64>, _>(2).map(TaskId),
        name: r.get::<String, _>(3),
        position: r.get::<i64, _>(4),
        quantity: r.get::<Option<f64>, _>(5),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
