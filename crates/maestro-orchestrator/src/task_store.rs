use crate::types::{NewTask, Task, TaskStatus};
use maestro_core::{MaestroError, MaestroResult, ResourceKind, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counts of tasks by state, plus every record in creation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub tasks: Vec<Task>,
}

/// Owns every task record. Ids are allocated sequentially and never reused.
pub struct TaskStore {
    tasks: BTreeMap<TaskId, Task>,
    next_seq: u64,
    default_priority: i32,
}

impl TaskStore {
    pub fn new(default_priority: i32) -> Self {
        Self {
            tasks: BTreeMap::new(),
            next_seq: 1,
            default_priority,
        }
    }

    /// Allocate an id and store a new pending task.
    pub fn create(&mut self, spec: NewTask) -> &Task {
        let id = TaskId::new(self.next_seq);
        self.next_seq += 1;
        let task = Task::new(id, spec, self.default_priority);
        self.tasks.entry(id).or_insert(task)
    }

    pub fn get(&self, id: TaskId) -> MaestroResult<&Task> {
        self.tasks
            .get(&id)
            .ok_or_else(|| MaestroError::not_found(ResourceKind::Task, id))
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> MaestroResult<&mut Task> {
        self.tasks
            .get_mut(&id)
            .ok_or_else(|| MaestroError::not_found(ResourceKind::Task, id))
    }

    /// Dependencies of `task` that are missing or not completed, in declared order.
    pub fn unmet_dependencies(&self, task: &Task) -> Vec<TaskId> {
        task.dependencies
            .iter()
            .copied()
            .filter(|dep| {
                self.tasks
                    .get(dep)
                    .map_or(true, |t| t.status != TaskStatus::Completed)
            })
            .collect()
    }

    pub fn dependencies_satisfied(&self, task: &Task) -> bool {
        self.unmet_dependencies(task).is_empty()
    }

    /// Pending tasks whose dependencies are all completed, most urgent first.
    /// Ties keep creation order.
    pub fn ready_by_priority(&self) -> Vec<TaskId> {
        let mut ready: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && self.dependencies_satisfied(t))
            .collect();
        ready.sort_by_key(|t| (t.priority, t.id));
        ready.into_iter().map(|t| t.id).collect()
    }

    pub fn summary(&self) -> TaskSummary {
        let mut summary = TaskSummary {
            total: self.tasks.len(),
            ..TaskSummary::default()
        };
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Running => summary.running += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::TimedOut => summary.timed_out += 1,
                TaskStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary.tasks = self.tasks.values().cloned().collect();
        summary
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
