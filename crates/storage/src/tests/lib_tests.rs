use super::*;

fn pizza() -> RecipeFields {
    RecipeFields {
        name: "Pizza".into(),
        directions: Some("Bake hot.".into()),
        yield_: Some(2),
        labels: vec!["dinner".into()],
        ingredients: vec![
            IngredientRef::raw("1 each pizza dough, thawed"),
            IngredientRef::raw("3 oz parmesan, shredded"),
        ],
        ..RecipeFields::default()
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn create_user_is_idempotent_by_username() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = storage.create_user("alice").await.expect("user");
    let again = storage.create_user("alice").await.expect("user");
    assert_eq!(first, again);
    assert_eq!(
        storage.username_for_user(first).await.expect("name").as_deref(),
        Some("alice")
    );
}

#[tokio::test]
async fn stores_and_reloads_recipe_with_ordered_ingredients() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.create_user("alice").await.expect("user");
    let recipe = storage.insert_recipe(user, &pizza()).await.expect("insert");

    assert_eq!(recipe.owner_id, user);
    assert_eq!(recipe.fields, pizza());
    assert!(recipe.updated_at.is_some());

    let loaded = storage
        .load_recipe(recipe.id)
        .await
        .expect("load")
        .expect("exists");
    assert_eq!(loaded.fields.ingredients[1].raw, "3 oz parmesan, shredded");
}

#[tokio::test]
async fn update_replaces_ingredients_and_reports_missing() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.create_user("alice").await.expect("user");
    let recipe = storage.insert_recipe(user, &pizza()).await.expect("insert");

    let mut fields = pizza();
    fields.name = "Thin Pizza".into();
    fields.ingredients.truncate(1);
    let updated = storage
        .update_recipe(recipe.id, &fields)
        .await
        .expect("update")
        .expect("exists");
    assert_eq!(updated.fields.name, "Thin Pizza");
    assert_eq!(updated.fields.ingredients.len(), 1);

    let missing = storage
        .update_recipe(RecipeId(9999), &fields)
        .await
        .expect("update");
    assert!(missing.is_none());
}

#[tokio::test]
async fn lists_only_owned_recipes_by_name() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let alice = storage.create_user("alice").await.expect("user");
    let bob = storage.create_user("bob").await.expect("user");
    let mut tacos = pizza();
    tacos.name = "tacos".into();
    storage.insert_recipe(alice, &tacos).await.expect("tacos");
    storage.insert_recipe(alice, &pizza()).await.expect("pizza");
    storage.insert_recipe(bob, &pizza()).await.expect("bob pizza");

    let names: Vec<_> = storage
        .list_recipes_for_owner(alice)
        .await
        .expect("list")
        .into_iter()
        .map(|r| r.fields.name)
        .collect();
    assert_eq!(names, vec!["Pizza".to_string(), "tacos".to_string()]);
}

#[tokio::test]
async fn delete_recipe_removes_it() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.create_user("alice").await.expect("user");
    let recipe = storage.insert_recipe(user, &pizza()).await.expect("insert");
    assert!(storage.delete_recipe(recipe.id).await.expect("delete"));
    assert!(!storage.delete_recipe(recipe.id).await.expect("delete again"));
    assert!(storage.load_recipe(recipe.id).await.expect("load").is_none());
}

#[tokio::test]
async fn dissection_update_touches_every_matching_raw_line() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.create_user("alice").await.expect("user");
    let first = storage.insert_recipe(user, &pizza()).await.expect("first");
    let second = storage.insert_recipe(user, &pizza()).await.expect("second");

    let pantry_id = storage.create_pantry_item("parmesan").await.expect("pantry");
    let found = storage
        .find_pantry_item_by_name("PARMESAN")
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(found.0, pantry_id);

    let ingredient = Ingredient::PantryItem {
        id: pantry_id,
        name: "parmesan".into(),
    };
    let touched = storage
        .update_ingredient_refs_by_raw(&IngredientRefUpdate {
            raw: "3 oz parmesan, shredded",
            quantity: Some(3.0),
            units: Some("oz"),
            ingredient: &ingredient,
            preparation: Some("shredded"),
        })
        .await
        .expect("update");
    assert_eq!(touched, 2);

    for id in [first.id, second.id] {
        let recipe = storage.load_recipe(id).await.expect("load").expect("exists");
        let parm = &recipe.fields.ingredients[1];
        assert_eq!(parm.ingredient, Some(ingredient.clone()));
        assert_eq!(
            parm.quantity,
            Some(Quantity {
                amount: 3.0,
                units: Some("oz".into())
            })
        );
        assert_eq!(parm.preparation.as_deref(), Some("shredded"));
        assert!(recipe.fields.ingredients[0].ingredient.is_none());
    }
}

#[tokio::test]
async fn task_tree_round_trips_through_placements() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.create_user("alice").await.expect("user");
    let list = storage
        .create_task(user, None, "Groceries", 1)
        .await
        .expect("list");
    let apples = storage
        .create_task(user, Some(list), "Apples", 0)
        .await
        .expect("apples");
    let oj = storage
        .create_task(user, Some(list), "OJ", 1)
        .await
        .expect("oj");
    let pulp = storage
        .create_task(user, Some(oj), "pulp free", 0)
        .await
        .expect("pulp");

    assert_eq!(storage.root_of(pulp).await.expect("root"), Some(list));
    let tree = storage.load_task_tree(list).await.expect("tree");
    assert_eq!(tree.len(), 4);

    storage
        .save_placements(&[(oj, list, 0), (apples, list, 1)])
        .await
        .expect("placements");
    let ordered: Vec<_> = storage
        .list_subtasks(list)
        .await
        .expect("subtasks")
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ordered, vec![oj, apples]);

    let deleted = storage.delete_tasks(&[oj, pulp]).await.expect("delete");
    assert_eq!(deleted, 2);
    assert!(storage.load_task(pulp).await.expect("load").is_none());
}

#[tokio::test]
async fn task_lists_report_max_position() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.create_user("alice").await.expect("user");
    assert_eq!(storage.max_list_position(user).await.expect("max"), None);
    storage
        .create_task(user, None, "Groceries", 1)
        .await
        .expect("list");
    storage.create_task(user, None, "Costco", 2).await.expect("list");
    assert_eq!(storage.max_list_position(user).await.expect("max"), Some(2));
    let lists = storage.list_task_lists(user).await.expect("lists");
    assert_eq!(lists.len(), 2);
    assert_eq!(lists[0].name, "Groceries");
}

#[tokio::test]
async fn task_batch_nests_items_under_a_heading() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.create_user("alice").await.expect("user");
    let list = storage
        .create_task(user, None, "Groceries", 1)
        .await
        .expect("list");

    let batch = storage
        .insert_task_batch(
            user,
            list,
            Some("Pizza"),
            &[
                NewTask {
                    name: "6 oz cheddar",
                    quantity: Some(6.0),
                },
                NewTask {
                    name: "salt",
                    quantity: None,
                },
            ],
            3,
        )
        .await
        .expect("batch");

    let heading = batch.heading.expect("heading");
    let top = storage.list_subtasks(list).await.expect("subtasks");
    assert_eq!(top.len(), 1);
    assert_eq!((top[0].id, top[0].position), (heading, 3));
    let items = storage.list_subtasks(heading).await.expect("items");
    assert_eq!(items.iter().map(|t| t.id).collect::<Vec<_>>(), batch.items);
    assert_eq!(items[0].quantity, Some(6.0));
    assert_eq!(items[1].position, 1);
}

#[tokio::test]
async fn failed_task_batch_writes_nothing() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.create_user("alice").await.expect("user");
    let list = storage
        .create_task(user, None, "Groceries", 1)
        .await
        .expect("list");
    sqlx::query(
        "CREATE TRIGGER reject_spoiled BEFORE INSERT ON tasks
         WHEN NEW.name = 'spoiled milk'
         BEGIN SELECT RAISE(ABORT, 'spoiled'); END",
    )
    .execute(storage.pool())
    .await
    .expect("trigger");

    let err = storage
        .insert_task_batch(
            user,
            list,
            Some("Breakfast"),
            &[
                NewTask {
                    name: "eggs",
                    quantity: None,
                },
                NewTask {
                    name: "spoiled milk",
                    quantity: None,
                },
            ],
            1,
        )
        .await
        .expect_err("rejected item");

    assert!(format!("{err:#}").contains("spoiled milk"));
    assert!(storage.list_subtasks(list).await.expect("subtasks").is_empty());
}
