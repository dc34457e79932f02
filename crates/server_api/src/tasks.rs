use std::collections::BTreeSet;

use shared::{
    domain::{TaskId, UserId},
    error::ApiError,
    protocol::TaskInfo,
    task::{TaskTree, TaskTreeError},
};
use storage::StoredTask;
use tracing::info;

use crate::{ensure_owner, internal, require_name, ApiContext};

pub async fn list_task_lists(ctx: &ApiContext, user_id: UserId) -> Result<Vec<TaskInfo>, ApiError> {
    let lists = ctx
        .storage
        .list_task_lists(user_id)
        .await
        .map_err(internal)?;
    let mut infos = Vec::with_capacity(lists.len());
    for list in &lists {
        infos.push(info_for(ctx, list).await?);
    }
    Ok(infos)
}

pub async fn create_task_list(
    ctx: &ApiContext,
    user_id: UserId,
    name: &str,
) -> Result<TaskInfo, ApiError> {
    let name = require_name(name, "list")?;
    let position = ctx
        .storage
        .max_list_position(user_id)
        .await
        .map_err(internal)?
        .unwrap_or(0)
        + 1;
    let id = ctx
        .storage
        .create_task(user_id, None, &name, position)
        .await
        .map_err(internal)?;
    info!(list_id = %id, %user_id, "task list created");
    Ok(TaskInfo {
        id,
        name,
        parent_id: None,
        subtask_ids: Vec::new(),
    })
}

pub async fn get_task(ctx: &ApiContext, user_id: UserId, task_id: TaskId) -> Result<TaskInfo, ApiError> {
    let task = load_owned(ctx, user_id, task_id).await?;
    info_for(ctx, &task).await
}

pub async fn get_subtasks(
    ctx: &ApiContext,
    user_id: UserId,
    task_id: TaskId,
) -> Result<Vec<TaskInfo>, ApiError> {
    load_owned(ctx, user_id, task_id).await?;
    let children = ctx
        .storage
        .list_subtasks(task_id)
        .await
        .map_err(internal)?;
    let mut infos = Vec::with_capacity(children.len());
    for child in &children {
        infos.push(info_for(ctx, child).await?);
    }
    Ok(infos)
}

/// Creates a subtask at the front of `parent_id`'s subtasks.
pub async fn create_subtask(
    ctx: &ApiContext,
    user_id: UserId,
    parent_id: TaskId,
    name: &str,
) -> Result<TaskInfo, ApiError> {
    place_new_subtask(ctx, user_id, parent_id, name, None).await
}

pub async fn create_subtask_after(
    ctx: &ApiContext,
    user_id: UserId,
    parent_id: TaskId,
    name: &str,
    after_id: TaskId,
) -> Result<TaskInfo, ApiError> {
    let after = load_owned(ctx, user_id, after_id).await?;
    if after.parent_id != Some(parent_id) {
        return Err(ApiError::validation(format!(
            "task {after_id} is not a subtask of {parent_id}"
        )));
    }
    place_new_subtask(ctx, user_id, parent_id, name, Some(after_id)).await
}

pub async fn rename_task(
    ctx: &ApiContext,
    user_id: UserId,
    task_id: TaskId,
    name: &str,
) -> Result<TaskInfo, ApiError> {
    let name = require_name(name, "task")?;
    let mut task = load_owned(ctx, user_id, task_id).await?;
    ctx.storage
        .rename_task(task_id, &name)
        .await
        .map_err(internal)?;
    task.name = name;
    info_for(ctx, &task).await
}

/// Moves a task under a new parent. Moving a task up to its grandparent
/// places it right after its old parent; anywhere else it goes last.
pub async fn reset_parent(
    ctx: &ApiContext,
    user_id: UserId,
    task_id: TaskId,
    parent_id: TaskId,
) -> Result<TaskInfo, ApiError> {
    let task = load_owned(ctx, user_id, task_id).await?;
    let Some(old_parent) = task.parent_id else {
        return Err(ApiError::validation("task lists cannot be moved"));
    };
    let mut tree = load_tree(ctx, user_id, &[task_id, parent_id]).await?;
    let moved = if tree.parent(old_parent) == Some(parent_id) {
        tree.add_subtask_after(parent_id, task_id, Some(old_parent))
    } else {
        tree.add_subtask(parent_id, task_id)
    };
    moved.map_err(tree_error)?;
    persist(ctx, &tree, [old_parent, parent_id]).await?;
    tree_info(&tree, task_id)
}

/// Makes `subtask_ids` the leading subtasks of `task_id`, in that order.
pub async fn reset_subtasks(
    ctx: &ApiContext,
    user_id: UserId,
    task_id: TaskId,
    subtask_ids: &[TaskId],
) -> Result<TaskInfo, ApiError> {
    load_owned(ctx, user_id, task_id).await?;
    let mut ids = vec![task_id];
    ids.extend_from_slice(subtask_ids);
    let mut tree = load_tree(ctx, user_id, &ids).await?;

    let mut touched: Vec<TaskId> = subtask_ids
        .iter()
        .filter_map(|id| tree.parent(*id))
        .collect();
    touched.push(task_id);

    let mut prev = None;
    for sid in subtask_ids {
        tree.add_subtask_after(task_id, *sid, prev)
            .map_err(tree_error)?;
        prev = Some(*sid);
    }
    persist(ctx, &tree, touched).await?;
    tree_info(&tree, task_id)
}

/// Deletes a task together with all of its subtasks.
pub async fn delete_task(ctx: &ApiContext, user_id: UserId, task_id: TaskId) -> Result<(), ApiError> {
    load_owned(ctx, user_id, task_id).await?;
    let mut tree = load_tree(ctx, user_id, &[task_id]).await?;
    let old_parent = tree.parent(task_id);
    let removed = tree.remove_subtree(task_id).map_err(tree_error)?;
    ctx.storage
        .delete_tasks(&removed)
        .await
        .map_err(internal)?;
    if let Some(parent) = old_parent {
        persist(ctx, &tree, [parent]).await?;
    }
    Ok(())
}

pub async fn complete_task(ctx: &ApiContext, user_id: UserId, task_id: TaskId) -> Result<(), ApiError> {
    let task = load_owned(ctx, user_id, task_id).await?;
    info!(task_id = %task.id, name = %task.name, "task completed");
    delete_task(ctx, user_id, task_id).await
}

async fn place_new_subtask(
    ctx: &ApiContext,
    user_id: UserId,
    parent_id: TaskId,
    name: &str,
    after: Option<TaskId>,
) -> Result<TaskInfo, ApiError> {
    let name = require_name(name, "task")?;
    load_owned(ctx, user_id, parent_id).await?;
    let id = ctx
        .storage
        .create_task(user_id, Some(parent_id), &name, 0)
        .await
        .map_err(internal)?;
    let mut tree = load_tree(ctx, user_id, &[parent_id]).await?;
    tree.add_subtask_after(parent_id, id, after)
        .map_err(tree_error)?;
    persist(ctx, &tree, [parent_id]).await?;
    tree_info(&tree, id)
}

pub(crate) async fn load_owned(
    ctx: &ApiContext,
    user_id: UserId,
    task_id: TaskId,
) -> Result<StoredTask, ApiError> {
    let task = ctx
        .storage
        .load_task(task_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(format!("task {task_id} not found")))?;
    ensure_owner(&task, user_id)?;
    Ok(task)
}

/// Loads every list touched by `task_ids` into one tree.
async fn load_tree(ctx: &ApiContext, user_id: UserId, task_ids: &[TaskId]) -> Result<TaskTree, ApiError> {
    let mut roots = BTreeSet::new();
    for id in task_ids {
        load_owned(ctx, user_id, *id).await?;
        let root = ctx
            .storage
            .root_of(*id)
            .await
            .map_err(internal)?
            .ok_or_else(|| ApiError::not_found(format!("task {id} has no list")))?;
        roots.insert(root);
    }
    let mut nodes = Vec::new();
    for root in roots {
        let rows = ctx
            .storage
            .load_task_tree(root)
            .await
            .map_err(internal)?;
        nodes.extend(rows.iter().map(StoredTask::to_node));
    }
    Ok(TaskTree::from_nodes(nodes))
}

async fn persist(
    ctx: &ApiContext,
    tree: &TaskTree,
    parents: impl IntoIterator<Item = TaskId>,
) -> Result<(), ApiError> {
    let parents: BTreeSet<TaskId> = parents.into_iter().collect();
    let placements: Vec<_> = parents
        .into_iter()
        .flat_map(|parent| tree.placements(parent))
        .collect();
    ctx.storage
        .save_placements(&placements)
        .await
        .map_err(internal)
}

async fn info_for(ctx: &ApiContext, task: &StoredTask) -> Result<TaskInfo, ApiError> {
    let subtask_ids = ctx
        .storage
        .list_subtasks(task.id)
        .await
        .map_err(internal)?
        .into_iter()
        .map(|t| t.id)
        .collect();
    Ok(TaskInfo {
        id: task.id,
        name: task.name.clone(),
        parent_id: task.parent_id,
        subtask_ids,
    })
}

fn tree_info(tree: &TaskTree, task_id: TaskId) -> Result<TaskInfo, ApiError> {
    tree.info(task_id)
        .ok_or_else(|| ApiError::not_found(format!("task {task_id} not found")))
}

fn tree_error(err: TaskTreeError) -> ApiError {
    match err {
        TaskTreeError::Unknown(id) => ApiError::not_found(format!("task {id} not found")),
        other => ApiError::validation(other.to_string()),
    }
}
