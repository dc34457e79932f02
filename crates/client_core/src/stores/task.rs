use std::{collections::HashMap, sync::Arc};

use shared::{domain::TaskId, protocol::TaskInfo};

use crate::{
    action::{AppAction, RecipeAction, TaskAction},
    dispatch::{ReduceContext, Store},
    load_object::LoadObject,
};

/// Task lists, the tasks loaded so far, and which list and task have focus.
#[derive(Debug, Clone, Default)]
pub struct TaskState {
    pub lists: LoadObject<Vec<TaskId>>,
    pub tasks: HashMap<TaskId, LoadObject<TaskInfo>>,
    pub active_list: Option<TaskId>,
    pub active_task: Option<TaskId>,
}

impl TaskState {
    pub fn task(&self, id: TaskId) -> Option<&TaskInfo> {
        self.tasks.get(&id).and_then(LoadObject::value)
    }

    pub fn lists(&self) -> LoadObject<Vec<TaskInfo>> {
        self.lists
            .clone()
            .map(|ids| ids.iter().filter_map(|id| self.task(*id)).cloned().collect())
    }

    pub fn active_list(&self) -> Option<&TaskInfo> {
        self.active_list.and_then(|id| self.task(id))
    }

    pub fn active_task(&self) -> Option<&TaskInfo> {
        self.active_task.and_then(|id| self.task(id))
    }

    /// Loaded subtasks of `parent`, in order.
    pub fn subtasks(&self, parent: TaskId) -> Vec<&TaskInfo> {
        self.task(parent)
            .map(|p| p.subtask_ids.iter().filter_map(|id| self.task(*id)).collect())
            .unwrap_or_default()
    }

    fn siblings(&self, id: TaskId) -> Option<&[TaskId]> {
        let parent = self.task(id)?.parent_id?;
        Some(&self.task(parent)?.subtask_ids)
    }

    fn edit_task(&mut self, id: TaskId, f: impl FnOnce(&mut TaskInfo)) {
        if let Some(entry) = self.tasks.remove(&id) {
            self.tasks.insert(
                id,
                entry.map(|mut task| {
                    f(&mut task);
                    task
                }),
            );
        }
    }

    fn descendants_inclusive(&self, id: TaskId) -> Vec<TaskId> {
        let mut out = vec![id];
        let mut i = 0;
        while i < out.len() {
            if let Some(task) = self.task(out[i]) {
                out.extend(task.subtask_ids.iter().copied());
            }
            i += 1;
        }
        out
    }

    fn neighbour(&self, id: TaskId, step: isize) -> Option<TaskId> {
        let siblings = self.siblings(id)?;
        let pos = siblings.iter().position(|s| *s == id)?;
        let target = pos.checked_add_signed(step)?;
        siblings.get(target).copied()
    }
}

#[derive(Debug, Default)]
pub struct TaskStore;

impl Store<AppAction> for TaskStore {
    type State = TaskState;

    fn initial_state(&self) -> Arc<TaskState> {
        Arc::new(TaskState::default())
    }

    fn reduce(
        &self,
        state: &Arc<TaskState>,
        action: &AppAction,
        _ctx: &ReduceContext<'_>,
    ) -> Arc<TaskState> {
        match action {
            AppAction::Task(action) => reduce_task(state, action),
            AppAction::Recipe(RecipeAction::ShoppingListAssembled { list_id, added, .. }) => {
                let mut next = TaskState::clone(state);
                for task in added {
                    next.tasks
                        .insert(task.id, LoadObject::with_value(task.clone()));
                    if task.parent_id == Some(*list_id) {
                        next.edit_task(*list_id, |list| list.subtask_ids.push(task.id));
                    }
                }
                Arc::new(next)
            }
            _ => Arc::clone(state),
        }
    }
}

fn reduce_task(state: &Arc<TaskState>, action: &TaskAction) -> Arc<TaskState> {
    let mut next = TaskState::clone(state);
    match action {
        TaskAction::LoadLists => {
            next.lists = next.lists.loading();
        }
        TaskAction::ListsLoaded { lists } => {
            let ids: Vec<TaskId> = lists.iter().map(|l| l.id).collect();
            for list in lists {
                next.tasks.insert(list.id, LoadObject::with_value(list.clone()));
            }
            if !next.active_list.is_some_and(|id| ids.contains(&id)) {
                next.active_list = ids.first().copied();
            }
            next.lists = next.lists.set_value(ids).done();
        }
        TaskAction::ListsLoadFailed { error } | TaskAction::ListCreateFailed { error, .. } => {
            next.lists = next.lists.error(error.clone());
        }
        TaskAction::SelectList { id } => {
            if state.active_list == Some(*id) || state.task(*id).is_none() {
                return Arc::clone(state);
            }
            next.active_list = Some(*id);
            next.active_task = None;
        }
        TaskAction::CreateList { .. } => {
            next.lists = next.lists.creating();
        }
        TaskAction::ListCreated { list } => {
            let mut ids = next.lists.value().cloned().unwrap_or_default();
            ids.push(list.id);
            next.lists = next.lists.set_value(ids).done();
            next.tasks.insert(list.id, LoadObject::with_value(list.clone()));
            next.active_list = Some(list.id);
            next.active_task = None;
        }
        TaskAction::LoadSubtasks { parent } => {
            let entry = next.tasks.remove(parent).unwrap_or_default().loading();
            next.tasks.insert(*parent, entry);
        }
        TaskAction::SubtasksLoaded { parent, subtasks } => {
            for task in subtasks {
                next.tasks.insert(task.id, LoadObject::with_value(task.clone()));
            }
            let ids = subtasks.iter().map(|t| t.id).collect();
            let entry = next.tasks.remove(parent).unwrap_or_default();
            let entry = if entry.has_value() {
                entry
                    .map(|mut p| {
                        p.subtask_ids = ids;
                        p
                    })
                    .done()
            } else {
                LoadObject::not_loaded()
            };
            next.tasks.insert(*parent, entry);
        }
        TaskAction::SubtasksLoadFailed { parent: id, error }
        | TaskAction::SubtaskCreateFailed { parent: id, error }
        | TaskAction::TaskFailed { id, error } => {
            let Some(entry) = state.tasks.get(id) else {
                return Arc::clone(state);
            };
            next.tasks.insert(*id, entry.clone().error(error.clone()));
        }
        TaskAction::SubtaskCreated { task, after } => {
            next.tasks.insert(task.id, LoadObject::with_value(task.clone()));
            if let Some(parent) = task.parent_id {
                next.edit_task(parent, |p| {
                    let at = after
                        .and_then(|a| p.subtask_ids.iter().position(|s| *s == a))
                        .map_or(0, |pos| pos + 1);
                    p.subtask_ids.insert(at, task.id);
                });
            }
            next.active_task = Some(task.id);
        }
        TaskAction::RenameTask { id, name } => {
            let Some(entry) = state.tasks.get(id).filter(|e| e.has_value()) else {
                return Arc::clone(state);
            };
            let renamed = entry
                .clone()
                .map(|mut t| {
                    t.name = name.clone();
                    t
                })
                .updating();
            next.tasks.insert(*id, renamed);
        }
        TaskAction::TaskRenamed { task } => {
            next.tasks.insert(task.id, LoadObject::with_value(task.clone()));
        }
        TaskAction::DeleteTask { id } | TaskAction::CompleteTask { id } => {
            let Some(entry) = state.tasks.get(id) else {
                return Arc::clone(state);
            };
            next.tasks.insert(*id, entry.clone().deleting());
        }
        TaskAction::TaskDeleted { id } => {
            let removed = state.descendants_inclusive(*id);
            if next
                .active_task
                .is_some_and(|active| removed.contains(&active))
            {
                next.active_task = state
                    .neighbour(*id, 1)
                    .or_else(|| state.neighbour(*id, -1));
            }
            if let Some(parent) = state.task(*id).and_then(|t| t.parent_id) {
                next.edit_task(parent, |p| p.subtask_ids.retain(|s| s != id));
            }
            for gone in &removed {
                next.tasks.remove(gone);
            }
            next.lists = next.lists.map(|mut ids| {
                ids.retain(|l| l != id);
                ids
            });
            if next.active_list == Some(*id) {
                next.active_list = next.lists.value().and_then(|ids| ids.first().copied());
            }
        }
        TaskAction::FocusTask { id } => {
            if state.active_task == Some(*id) || state.task(*id).is_none() {
                return Arc::clone(state);
            }
            next.active_task = Some(*id);
        }
        TaskAction::FocusNext | TaskAction::FocusPrevious => {
            let step = if matches!(action, TaskAction::FocusNext) { 1 } else { -1 };
            let Some(target) = state.active_task.and_then(|id| state.neighbour(id, step)) else {
                return Arc::clone(state);
            };
            next.active_task = Some(target);
        }
    }
    Arc::new(next)
}

#[cfg(test)]
#[path = "../tests/task_store_tests.rs"]
mod tests;
