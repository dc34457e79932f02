use super::*;
use crate::{
    dispatch::{Dispatcher, StoreToken},
    load_object::LoadState,
};
use shared::{domain::RecipeId, error::ApiError};

fn task(id: i64, name: &str, parent: Option<i64>, subtasks: &[i64]) -> TaskInfo {
    TaskInfo {
        id: TaskId(id),
        name: name.to_string(),
        parent_id: parent.map(TaskId),
        subtask_ids: subtasks.iter().copied().map(TaskId).collect(),
    }
}

struct Harness {
    dispatcher: Dispatcher<AppAction>,
    token: StoreToken,
}

impl Harness {
    /// Lists 1 ("Groceries", subtasks 10, 11, 12) and 2 ("Hardware"), with the
    /// grocery subtasks loaded.
    fn loaded() -> Self {
        let mut dispatcher = Dispatcher::new();
        let token = dispatcher.register("tasks", TaskStore).expect("register");
        let h = Self { dispatcher, token };
        h.send(TaskAction::ListsLoaded {
            lists: vec![task(1, "Groceries", None, &[]), task(2, "Hardware", None, &[])],
        });
        h.send(TaskAction::SubtasksLoaded {
            parent: TaskId(1),
            subtasks: vec![
                task(10, "eggs", Some(1), &[]),
                task(11, "milk", Some(1), &[20]),
                task(12, "bread", Some(1), &[]),
            ],
        });
        h.send(TaskAction::SubtasksLoaded {
            parent: TaskId(11),
            subtasks: vec![task(20, "oat", Some(11), &[])],
        });
        h
    }

    fn send(&self, action: impl Into<AppAction>) -> bool {
        self.dispatcher
            .dispatch(&action.into())
            .expect("dispatch")
            .changed(self.token)
    }

    fn state(&self) -> Arc<TaskState> {
        self.dispatcher.state(self.token).expect("state")
    }

    fn subtask_names(&self, parent: i64) -> Vec<String> {
        self.state()
            .subtasks(TaskId(parent))
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }
}

#[test]
fn loading_lists_selects_the_first() {
    let h = Harness::loaded();
    let state = h.state();
    assert_eq!(state.lists.state(), LoadState::Done);
    assert_eq!(state.active_list().map(|l| l.name.as_str()), Some("Groceries"));
    let names: Vec<String> = state
        .lists()
        .into_value()
        .unwrap_or_default()
        .into_iter()
        .map(|l| l.name)
        .collect();
    assert_eq!(names, vec!["Groceries", "Hardware"]);
    assert_eq!(h.subtask_names(1), vec!["eggs", "milk", "bread"]);
}

#[test]
fn selecting_lists() {
    let h = Harness::loaded();
    assert!(!h.send(TaskAction::SelectList { id: TaskId(1) }));
    assert!(!h.send(TaskAction::SelectList { id: TaskId(99) }));
    assert!(h.send(TaskAction::SelectList { id: TaskId(2) }));
    assert_eq!(h.state().active_list, Some(TaskId(2)));
}

#[test]
fn created_list_becomes_active() {
    let h = Harness::loaded();
    h.send(TaskAction::CreateList {
        name: "Party".into(),
    });
    assert_eq!(h.state().lists.state(), LoadState::Creating);

    h.send(TaskAction::ListCreated {
        list: task(3, "Party", None, &[]),
    });
    let state = h.state();
    assert_eq!(state.lists.state(), LoadState::Done);
    assert_eq!(state.active_list, Some(TaskId(3)));
    assert_eq!(state.lists.value().map(Vec::len), Some(3));
}

#[test]
fn subtask_created_after_a_sibling_takes_focus() {
    let h = Harness::loaded();
    h.send(TaskAction::SubtaskCreated {
        task: task(13, "jam", Some(1), &[]),
        after: Some(TaskId(10)),
    });
    assert_eq!(h.subtask_names(1), vec!["eggs", "jam", "milk", "bread"]);
    assert_eq!(h.state().active_task, Some(TaskId(13)));

    h.send(TaskAction::SubtaskCreated {
        task: task(14, "salt", Some(1), &[]),
        after: None,
    });
    assert_eq!(h.subtask_names(1)[0], "salt");
}

#[test]
fn rename_is_optimistic_until_confirmed() {
    let h = Harness::loaded();
    h.send(TaskAction::RenameTask {
        id: TaskId(10),
        name: "brown eggs".into(),
    });
    let state = h.state();
    assert_eq!(state.task(TaskId(10)).map(|t| t.name.as_str()), Some("brown eggs"));
    assert_eq!(
        state.tasks.get(&TaskId(10)).map(LoadObject::state),
        Some(LoadState::Updating)
    );

    h.send(TaskAction::TaskRenamed {
        task: task(10, "brown eggs", Some(1), &[]),
    });
    assert_eq!(
        h.state().tasks.get(&TaskId(10)).map(LoadObject::state),
        Some(LoadState::Done)
    );

    assert!(!h.send(TaskAction::RenameTask {
        id: TaskId(99),
        name: "ghost".into(),
    }));
}

#[test]
fn deleting_a_focused_task_moves_focus_to_a_neighbour() {
    let h = Harness::loaded();
    h.send(TaskAction::FocusTask { id: TaskId(11) });
    h.send(TaskAction::CompleteTask { id: TaskId(11) });
    assert_eq!(
        h.state().tasks.get(&TaskId(11)).map(LoadObject::state),
        Some(LoadState::Deleting)
    );

    h.send(TaskAction::TaskDeleted { id: TaskId(11) });
    let state = h.state();
    assert_eq!(h.subtask_names(1), vec!["eggs", "bread"]);
    assert!(state.task(TaskId(20)).is_none());
    assert_eq!(state.active_task, Some(TaskId(12)));

    h.send(TaskAction::TaskDeleted { id: TaskId(12) });
    assert_eq!(h.state().active_task, Some(TaskId(10)));
}

#[test]
fn failed_delete_keeps_the_task() {
    let h = Harness::loaded();
    h.send(TaskAction::DeleteTask { id: TaskId(12) });
    h.send(TaskAction::TaskFailed {
        id: TaskId(12),
        error: ApiError::internal("nope"),
    });
    let state = h.state();
    assert_eq!(state.task(TaskId(12)).map(|t| t.name.as_str()), Some("bread"));
    assert_eq!(
        state.tasks.get(&TaskId(12)).map(LoadObject::state),
        Some(LoadState::Error)
    );
}

#[test]
fn failures_for_unknown_tasks_are_ignored() {
    let h = Harness::loaded();
    let before = h.state();

    assert!(!h.send(TaskAction::TaskFailed {
        id: TaskId(99),
        error: ApiError::internal("nope"),
    }));
    assert!(!h.send(TaskAction::SubtasksLoadFailed {
        parent: TaskId(98),
        error: ApiError::not_found("task 98 not found"),
    }));
    assert!(!h.send(TaskAction::SubtaskCreateFailed {
        parent: TaskId(97),
        error: ApiError::internal("nope"),
    }));

    assert!(Arc::ptr_eq(&before, &h.state()));
    assert!(!h.state().tasks.contains_key(&TaskId(99)));
}

#[test]
fn deleting_the_active_list_selects_another() {
    let h = Harness::loaded();
    h.send(TaskAction::TaskDeleted { id: TaskId(1) });
    let state = h.state();
    assert_eq!(state.active_list, Some(TaskId(2)));
    assert!(state.task(TaskId(10)).is_none());
    assert_eq!(state.lists.value(), Some(&vec![TaskId(2)]));
}

#[test]
fn focus_moves_among_siblings_and_stops_at_the_ends() {
    let h = Harness::loaded();
    assert!(!h.send(TaskAction::FocusNext));

    h.send(TaskAction::FocusTask { id: TaskId(10) });
    assert!(!h.send(TaskAction::FocusPrevious));
    assert!(h.send(TaskAction::FocusNext));
    assert_eq!(h.state().active_task, Some(TaskId(11)));
    assert!(h.send(TaskAction::FocusNext));
    assert!(!h.send(TaskAction::FocusNext));
    assert_eq!(h.state().active_task, Some(TaskId(12)));
    assert!(h.send(TaskAction::FocusPrevious));
    assert_eq!(h.state().active_task, Some(TaskId(11)));
}

#[test]
fn assembled_shopping_items_join_the_list() {
    let h = Harness::loaded();
    h.send(RecipeAction::ShoppingListAssembled {
        recipe_ids: vec![RecipeId(5)],
        list_id: TaskId(1),
        added: vec![
            task(30, "Chili", Some(1), &[31]),
            task(31, "2 onions", Some(30), &[]),
        ],
    });
    assert_eq!(h.subtask_names(1), vec!["eggs", "milk", "bread", "Chili"]);
    assert_eq!(h.subtask_names(30), vec!["2 onions"]);
}

#[test]
fn load_failures_are_recorded_per_task() {
    let h = Harness::loaded();
    h.send(TaskAction::LoadSubtasks { parent: TaskId(2) });
    assert_eq!(
        h.state().tasks.get(&TaskId(2)).map(LoadObject::state),
        Some(LoadState::Loading)
    );
    h.send(TaskAction::SubtasksLoadFailed {
        parent: TaskId(2),
        error: ApiError::not_found("task 2 not found"),
    });
    let state = h.state();
    assert_eq!(
        state.tasks.get(&TaskId(2)).map(LoadObject::state),
        Some(LoadState::Error)
    );
    assert_eq!(state.task(TaskId(2)).map(|t| t.name.as_str()), Some("Hardware"));
}
