use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use server_api::ApiContext;
use shared::domain::{TaskId, UserId};
use storage::Storage;

#[derive(Parser, Debug)]
#[command(about = "Cookbook database administration")]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/cookbook.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateUser {
        username: String,
    },
    CreateList {
        owner_user_id: i64,
        name: String,
    },
    ListRecipes {
        owner_user_id: i64,
    },
    /// Print every task list of a user with its items.
    ListTasks {
        owner_user_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;
    let ctx = ApiContext::new(storage);

    match cli.command {
        Command::CreateUser { username } => {
            let user_id = ctx.storage.create_user(&username).await?;
            println!("created user_id={user_id}");
        }
        Command::CreateList {
            owner_user_id,
            name,
        } => {
            let list = server_api::create_task_list(&ctx, UserId(owner_user_id), &name).await?;
            println!("created list_id={}", list.id);
        }
        Command::ListRecipes { owner_user_id } => {
            for recipe in ctx
                .storage
                .list_recipes_for_owner(UserId(owner_user_id))
                .await?
            {
                println!(
                    "{:>5}  {} ({} ingredients)",
                    recipe.id,
                    recipe.name(),
                    recipe.fields.ingredients.len()
                );
            }
        }
        Command::ListTasks { owner_user_id } => {
            let user_id = UserId(owner_user_id);
            for list in server_api::list_task_lists(&ctx, user_id).await? {
                println!("{:>5}  {}", list.id, list.name);
                print_subtasks(&ctx, user_id, list.id, 1).await?;
            }
        }
    }

    Ok(())
}

async fn print_subtasks(ctx: &ApiContext, user_id: UserId, parent: TaskId, depth: usize) -> Result<()> {
    for task in server_api::get_subtasks(ctx, user_id, parent).await? {
        println!("{:>5}  {}{}", task.id, "  ".repeat(depth), task.name);
        if task.has_subtasks() {
            Box::pin(print_subtasks(ctx, user_id, task.id, depth + 1)).await?;
        }
    }
    Ok(())
}
