use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    action::{DraftAction, DraftField, RouteAction},
    backend::HttpBackend,
    stores::EDIT_RECIPE_ROUTE,
    CookbookClient, LoadObject,
};
use shared::{
    domain::{RecipeId, TaskId},
    protocol::RawIngredientDissection,
};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Cookbook command-line client")]
struct Args {
    #[arg(long, env = "COOKBOOK_SERVER_URL", default_value = "http://127.0.0.1:8080")]
    server_url: String,
    #[arg(long, env = "COOKBOOK_USERNAME")]
    username: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the recipe library.
    Recipes,
    /// Show one recipe with its ingredient lines.
    Show { id: i64 },
    /// Add a recipe; ingredients are one per line.
    Add {
        name: String,
        #[arg(long, default_value = "")]
        ingredients: String,
        #[arg(long)]
        directions: Option<String>,
    },
    /// Rename a recipe and/or paste more ingredient lines at the end.
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        paste: Option<String>,
    },
    Delete { id: i64 },
    /// Print the combined shopping list for some recipes.
    Preview {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Add the combined shopping list for some recipes to a task list.
    Shop {
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(long)]
        list: i64,
        #[arg(long)]
        heading: bool,
    },
    /// Record what a raw ingredient line means.
    Dissect {
        recipe_id: i64,
        raw: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        quantity: Option<String>,
        #[arg(long)]
        units: Option<String>,
        #[arg(long)]
        prep: Option<String>,
    },
    /// List task lists.
    Lists,
    NewList { name: String },
    /// Show the items of a task list.
    Items { list_id: i64 },
    AddItem {
        list_id: i64,
        name: String,
        #[arg(long)]
        after: Option<i64>,
    },
    Done { task_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    debug!(command = ?args.command, server = %args.server_url, "starting");

    let backend = HttpBackend::login(&args.server_url, &args.username)
        .await
        .with_context(|| format!("failed to log in to {}", args.server_url))?;
    let mut client = CookbookClient::new(Arc::new(backend))?;
    run(&mut client, args.command).await
}

fn error_of<T>(lo: &LoadObject<T>) -> Option<String> {
    lo.last_error().map(|e| e.message.clone())
}

async fn run(client: &mut CookbookClient, command: Command) -> Result<()> {
    match command {
        Command::Recipes => {
            client.finish(client.load_library()?).await?;
            let library = client.library()?;
            if let Some(err) = error_of(&library.library) {
                bail!("could not load recipes: {err}");
            }
            for recipe in library.library_recipes().into_value().unwrap_or_default() {
                println!("{:>5}  {}", recipe.id, recipe.name());
            }
        }
        Command::Show { id } => {
            let id = RecipeId(id);
            client.finish(client.load_recipe(id)?).await?;
            let library = client.library()?;
            let entry = library.recipe(id).context("recipe was not loaded")?;
            if let Some(err) = error_of(entry) {
                bail!("could not load recipe {id}: {err}");
            }
            let recipe = entry.value_enforcing()?;
            println!("{}", recipe.name());
            for line in recipe.raw_ingredient_lines() {
                println!("  - {line}");
            }
            if let Some(directions) = &recipe.fields.directions {
                println!("\n{directions}");
            }
        }
        Command::Add {
            name,
            ingredients,
            directions,
        } => {
            client.edit_draft(DraftAction::Update(DraftField::Name(name)))?;
            client.edit_draft(DraftAction::Update(DraftField::Directions(directions)))?;
            client.edit_draft(DraftAction::MultiLinePaste {
                index: 0,
                text: ingredients,
            })?;
            let client_id = client
                .draft()?
                .value()
                .and_then(|d| d.client_id())
                .context("draft is not a new recipe")?;
            client.finish(client.save_draft()?).await?;
            if client.draft()?.value().and_then(|d| d.client_id()) == Some(client_id) {
                bail!("recipe was not saved");
            }
            println!("saved");
        }
        Command::Edit { id, name, paste } => {
            client.finish(client.load_library()?).await?;
            let id_text = id.to_string();
            if let Some(fetch) = client.route(RouteAction::matched(
                EDIT_RECIPE_ROUTE,
                [("id", id_text.as_str())],
            ))? {
                client.finish(fetch).await?;
            }
            let lines = client
                .draft()?
                .value_enforcing()?
                .fields
                .ingredients
                .len();
            if let Some(name) = name {
                client.edit_draft(DraftAction::Update(DraftField::Name(name)))?;
            }
            if let Some(text) = paste {
                client.edit_draft(DraftAction::MultiLinePaste {
                    index: lines as isize - 1,
                    text,
                })?;
            }
            client.finish(client.save_draft()?).await?;
            let library = client.library()?;
            if let Some(err) = library.recipe(RecipeId(id)).and_then(error_of) {
                bail!("could not update recipe {id}: {err}");
            }
            println!("updated");
        }
        Command::Delete { id } => {
            let id = RecipeId(id);
            client.finish(client.delete_recipe(id)?).await?;
            if let Some(err) = client.library()?.recipe(id).and_then(error_of) {
                bail!("could not delete recipe {id}: {err}");
            }
            println!("deleted");
        }
        Command::Preview { ids } => {
            let ids = ids.into_iter().map(RecipeId).collect();
            client.finish(client.load_preview(ids)?).await?;
            let library = client.library()?;
            if let Some(err) = error_of(&library.preview) {
                bail!("could not build the shopping list: {err}");
            }
            let preview = library.preview.value_enforcing()?;
            println!("{}", preview.name);
            for item in &preview.items {
                println!("  - {item}");
            }
        }
        Command::Shop { ids, list, heading } => {
            let list = TaskId(list);
            client.finish(client.load_lists()?).await?;
            let ids = ids.into_iter().map(RecipeId).collect();
            client
                .finish(client.assemble_shopping_list(ids, list, heading)?)
                .await?;
            print_items(client, list).await?;
        }
        Command::Dissect {
            recipe_id,
            raw,
            name,
            quantity,
            units,
            prep,
        } => {
            let dissection = RawIngredientDissection {
                raw,
                quantity,
                units,
                name,
                prep,
            };
            client
                .finish(client.record_dissection(RecipeId(recipe_id), dissection)?)
                .await?;
            println!("recorded");
        }
        Command::Lists => {
            client.finish(client.load_lists()?).await?;
            let tasks = client.tasks()?;
            if let Some(err) = error_of(&tasks.lists) {
                bail!("could not load lists: {err}");
            }
            for list in tasks.lists().into_value().unwrap_or_default() {
                println!("{:>5}  {}", list.id, list.name);
            }
        }
        Command::NewList { name } => {
            client.finish(client.create_list(&name)?).await?;
            let tasks = client.tasks()?;
            if let Some(err) = error_of(&tasks.lists) {
                bail!("could not create list: {err}");
            }
            let list = tasks.active_list().context("no list was created")?;
            println!("created list {} ({})", list.id, list.name);
        }
        Command::Items { list_id } => {
            client.finish(client.load_lists()?).await?;
            print_items(client, TaskId(list_id)).await?;
        }
        Command::AddItem {
            list_id,
            name,
            after,
        } => {
            let list = TaskId(list_id);
            client.finish(client.load_lists()?).await?;
            client
                .finish(client.create_subtask(list, &name, after.map(TaskId))?)
                .await?;
            print_items(client, list).await?;
        }
        Command::Done { task_id } => {
            let id = TaskId(task_id);
            client.finish(client.complete_task(id)?).await?;
            if let Some(err) = client.tasks()?.tasks.get(&id).and_then(error_of) {
                bail!("could not complete task {id}: {err}");
            }
            println!("done");
        }
    }
    Ok(())
}

async fn print_items(client: &mut CookbookClient, list: TaskId) -> Result<()> {
    client.finish(client.load_subtasks(list)?).await?;
    let tasks = client.tasks()?;
    if let Some(err) = tasks.tasks.get(&list).and_then(error_of) {
        bail!("could not load list {list}: {err}");
    }
    let name = tasks.task(list).map(|t| t.name.as_str()).unwrap_or("?");
    println!("{name}");
    for item in tasks.subtasks(list) {
        println!("{:>5}  {}", item.id, item.name);
    }
    Ok(())
}
