//! Ordering rules for task trees.
//!
//! A task list is a root task; everything under it is an ordered tree of
//! subtasks. [`TaskTree`] is an arena holding one such tree (or several) and
//! keeps every node's `position` equal to its index among its siblings.

use std::{cmp::Ordering, collections::HashMap};

use thiserror::Error;

use crate::{domain::TaskId, protocol::TaskInfo};

#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    pub id: TaskId,
    pub name: String,
    pub quantity: Option<f64>,
    pub parent_id: Option<TaskId>,
    pub position: usize,
}

impl TaskNode {
    pub fn new(id: TaskId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            quantity: None,
            parent_id: None,
            position: 0,
        }
    }

    pub fn with_parent(mut self, parent_id: TaskId, position: usize) -> Self {
        self.parent_id = Some(parent_id);
        self.position = position;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskTreeError {
    #[error("unknown task {0}")]
    Unknown(TaskId),
    #[error("task {child} is not a subtask of {parent}")]
    NotASubtask { parent: TaskId, child: TaskId },
    #[error("task {0} cannot be nested under itself or one of its subtasks")]
    Cycle(TaskId),
}

#[derive(Debug, Clone, Default)]
pub struct TaskTree {
    nodes: HashMap<TaskId, TaskNode>,
    children: HashMap<TaskId, Vec<TaskId>>,
    next_id: i64,
}

impl TaskTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from stored rows. Siblings are ordered by their stored
    /// position (ties broken by id) and then renumbered densely.
    pub fn from_nodes(nodes: impl IntoIterator<Item = TaskNode>) -> Self {
        let mut tree = Self::new();
        for node in nodes {
            tree.next_id = tree.next_id.max(node.id.0 + 1);
            tree.nodes.insert(node.id, node);
        }
        let mut grouped: HashMap<TaskId, Vec<(usize, TaskId)>> = HashMap::new();
        for node in tree.nodes.values() {
            if let Some(parent) = node.parent_id {
                grouped
                    .entry(parent)
                    .or_default()
                    .push((node.position, node.id));
            }
        }
        for (parent, mut kids) in grouped {
            kids.sort();
            tree.children
                .insert(parent, kids.into_iter().map(|(_, id)| id).collect());
            tree.renumber(parent);
        }
        tree
    }

    /// Adds a detached task with a locally assigned id.
    pub fn create(&mut self, name: impl Into<String>) -> TaskId {
        self.next_id = self.next_id.max(1);
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, TaskNode::new(id, name));
        id
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn set_quantity(&mut self, id: TaskId, quantity: Option<f64>) -> Result<(), TaskTreeError> {
        self.node_mut(id)?.quantity = quantity;
        Ok(())
    }

    pub fn rename(&mut self, id: TaskId, name: impl Into<String>) -> Result<(), TaskTreeError> {
        self.node_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn parent(&self, id: TaskId) -> Option<TaskId> {
        self.nodes.get(&id).and_then(|node| node.parent_id)
    }

    pub fn subtasks(&self, id: TaskId) -> &[TaskId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn subtask_count(&self, id: TaskId) -> usize {
        self.subtasks(id).len()
    }

    pub fn has_subtasks(&self, id: TaskId) -> bool {
        !self.subtasks(id).is_empty()
    }

    pub fn is_subtask(&self, id: TaskId) -> bool {
        self.parent(id).is_some()
    }

    pub fn position(&self, id: TaskId) -> Option<usize> {
        self.nodes.get(&id).map(|node| node.position)
    }

    /// Appends `child` to the end of `parent`'s subtasks.
    pub fn add_subtask(&mut self, parent: TaskId, child: TaskId) -> Result<(), TaskTreeError> {
        let index = self.subtask_count(parent);
        self.insert_subtask(parent, index, child)
    }

    /// Inserts `child` right after `after`, or first when `after` is `None`.
    pub fn add_subtask_after(
        &mut self,
        parent: TaskId,
        child: TaskId,
        after: Option<TaskId>,
    ) -> Result<(), TaskTreeError> {
        self.check_attach(parent, child)?;
        self.detach(child);
        let index = match after {
            None => 0,
            Some(after) => {
                let idx = self
                    .subtasks(parent)
                    .iter()
                    .position(|id| *id == after)
                    .ok_or(TaskTreeError::NotASubtask {
                        parent,
                        child: after,
                    })?;
                idx + 1
            }
        };
        self.attach(parent, index, child);
        Ok(())
    }

    /// Inserts `child` at `index` among `parent`'s subtasks, clamped to the
    /// end of the list.
    pub fn insert_subtask(
        &mut self,
        parent: TaskId,
        index: usize,
        child: TaskId,
    ) -> Result<(), TaskTreeError> {
        self.check_attach(parent, child)?;
        self.detach(child);
        self.attach(parent, index, child);
        Ok(())
    }

    pub fn remove_subtask(&mut self, parent: TaskId, child: TaskId) -> Result<(), TaskTreeError> {
        if self.parent(child) != Some(parent) {
            return Err(TaskTreeError::NotASubtask { parent, child });
        }
        self.detach(child);
        Ok(())
    }

    /// Moves a subtask among its siblings. `position` names the slot before
    /// which it lands, counted before the task is taken out.
    pub fn set_position(&mut self, id: TaskId, position: usize) -> Result<(), TaskTreeError> {
        let (parent, current) = {
            let node = self.nodes.get(&id).ok_or(TaskTreeError::Unknown(id))?;
            (node.parent_id, node.position)
        };
        let Some(parent) = parent else {
            self.node_mut(id)?.position = position;
            return Ok(());
        };
        let target = if position > current {
            position - 1
        } else {
            position
        };
        self.detach(id);
        self.attach(parent, target, id);
        Ok(())
    }

    /// Removes a task and everything under it, returning the removed ids with
    /// the task itself first.
    pub fn remove_subtree(&mut self, id: TaskId) -> Result<Vec<TaskId>, TaskTreeError> {
        if !self.contains(id) {
            return Err(TaskTreeError::Unknown(id));
        }
        self.detach(id);
        let removed = self.descendants_inclusive(id);
        for task in &removed {
            self.nodes.remove(task);
            self.children.remove(task);
        }
        Ok(removed)
    }

    pub fn descendants_inclusive(&self, id: TaskId) -> Vec<TaskId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.subtasks(next).iter().rev().copied());
        }
        out
    }

    /// `(id, parent, position)` for every subtask of `parent`, in order.
    pub fn placements(&self, parent: TaskId) -> Vec<(TaskId, TaskId, usize)> {
        self.subtasks(parent)
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, parent, idx))
            .collect()
    }

    /// Human readable label: name, quantity in parens, parent name in
    /// brackets. `"Orange (5) [OJ]"`.
    pub fn label(&self, id: TaskId) -> Option<String> {
        let node = self.nodes.get(&id)?;
        let mut label = node.name.clone();
        if let Some(q) = node.quantity {
            if q.fract() == 0.0 {
                label.push_str(&format!(" ({})", q as i64));
            } else {
                label.push_str(&format!(" ({q})"));
            }
        }
        if let Some(parent) = node.parent_id.and_then(|p| self.nodes.get(&p)) {
            label.push_str(&format!(" [{}]", parent.name));
        }
        Some(label)
    }

    pub fn info(&self, id: TaskId) -> Option<TaskInfo> {
        let node = self.nodes.get(&id)?;
        Some(TaskInfo {
            id,
            name: node.name.clone(),
            parent_id: node.parent_id,
            subtask_ids: self.subtasks(id).to_vec(),
        })
    }

    fn node_mut(&mut self, id: TaskId) -> Result<&mut TaskNode, TaskTreeError> {
        self.nodes.get_mut(&id).ok_or(TaskTreeError::Unknown(id))
    }

    fn check_attach(&self, parent: TaskId, child: TaskId) -> Result<(), TaskTreeError> {
        if !self.contains(parent) {
            return Err(TaskTreeError::Unknown(parent));
        }
        if !self.contains(child) {
            return Err(TaskTreeError::Unknown(child));
        }
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(TaskTreeError::Cycle(child));
            }
            cursor = self.parent(id);
        }
        Ok(())
    }

    fn detach(&mut self, child: TaskId) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        if let Some(kids) = self.children.get_mut(&parent) {
            kids.retain(|id| *id != child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent_id = None;
            node.position = 0;
        }
        self.renumber(parent);
    }

    fn attach(&mut self, parent: TaskId, index: usize, child: TaskId) {
        let kids = self.children.entry(parent).or_default();
        let index = index.min(kids.len());
        kids.insert(index, child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent_id = Some(parent);
        }
        self.renumber(parent);
    }

    fn renumber(&mut self, parent: TaskId) {
        let Some(kids) = self.children.get(&parent) else {
            return;
        };
        for (idx, id) in kids.iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(id) {
                node.position = idx;
            }
        }
    }
}

fn nulls_last<'a>(
    a: Option<&'a TaskNode>,
    b: Option<&'a TaskNode>,
    cmp: impl FnOnce(&TaskNode, &TaskNode) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Orders by name, uppercase before lowercase; missing tasks sort last.
pub fn by_name(a: Option<&TaskNode>, b: Option<&TaskNode>) -> Ordering {
    nulls_last(a, b, |a, b| a.name.cmp(&b.name))
}

pub fn by_name_ignore_case(a: Option<&TaskNode>, b: Option<&TaskNode>) -> Ordering {
    nulls_last(a, b, |a, b| {
        a.name
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(b.name.chars().flat_map(char::to_lowercase))
    })
}

pub fn by_order(a: Option<&TaskNode>, b: Option<&TaskNode>) -> Ordering {
    nulls_last(a, b, |a, b| a.position.cmp(&b.position))
}
