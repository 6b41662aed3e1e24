//! To-do task use-case service.
//!
//! # Responsibility
//! - Provide the task list use cases: list open, add, complete, get.
//! - Translate between `Task` and the generic `Item` stored by the repository.
//!
//! # Invariants
//! - New tasks always start with `completed = false` and a creation `date`.
//! - Completing a task keeps every other stored field unchanged.

use crate::client::{DocumentClient, QuerySpec};
use crate::model::item::Item;
use crate::model::task::Task;
use crate::repo::item_repo::{ItemRepository, RepoError};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

const ALL_TASKS_QUERY: &str = "SELECT * FROM root r";
const TASKS_BY_STATE_QUERY: &str = "SELECT * FROM root r WHERE r.completed = @completed";

pub type TaskResult<T> = Result<T, TaskServiceError>;

/// Service error for task use-cases.
#[derive(Debug)]
pub enum TaskServiceError {
    /// Task name is empty after trimming.
    InvalidName,
    TaskNotFound(String),
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Stored item does not have the task shape.
    InvalidTask(String),
}

impl Display for TaskServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "task name cannot be empty"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InvalidTask(message) => write!(f, "{message}"),
        }
    }
}

impl Error for TaskServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::InvalidName | Self::TaskNotFound(_) | Self::InvalidTask(_) => None,
        }
    }
}

impl From<RepoError> for TaskServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::TaskNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Task list use cases over an initialized item repository.
pub struct TaskService<C: DocumentClient> {
    repo: ItemRepository<C>,
}

impl<C: DocumentClient> TaskService<C> {
    /// Wraps a repository. Calls fail with `RepoError::NotInitialized` until
    /// the repository has been initialized.
    pub fn new(repo: ItemRepository<C>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &ItemRepository<C> {
        &self.repo
    }

    /// Lists tasks not yet completed, in insertion order.
    pub fn list_open_tasks(&self) -> TaskResult<Vec<Task>> {
        let query = QuerySpec::new(TASKS_BY_STATE_QUERY).bind("completed", false);
        self.find_tasks(&query)
    }

    pub fn list_tasks(&self) -> TaskResult<Vec<Task>> {
        self.find_tasks(&QuerySpec::new(ALL_TASKS_QUERY))
    }

    /// Adds an open task stamped with the current time.
    pub fn add_task(&self, name: &str, category: &str) -> TaskResult<Task> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TaskServiceError::InvalidName);
        }

        let task = Task::new(name, category.trim());
        let stored = self.repo.add_item(&task.to_item())?;
        info!("event=task_add module=service status=ok task_id={}", stored.id);
        to_task(&stored)
    }

    pub fn get_task(&self, task_id: &str) -> TaskResult<Option<Task>> {
        self.repo
            .get_item(task_id)?
            .map(|item| to_task(&item))
            .transpose()
    }

    /// Marks one task completed.
    ///
    /// # Errors
    /// - `TaskServiceError::TaskNotFound` when the id does not exist.
    pub fn complete_task(&self, task_id: &str) -> TaskResult<Task> {
        let mut item = self
            .repo
            .get_item(task_id)?
            .ok_or_else(|| TaskServiceError::TaskNotFound(task_id.to_string()))?
            .without_system_fields();
        item.set("completed", true);

        let stored = self.repo.update_item(task_id, &item)?;
        info!("event=task_complete module=service status=ok task_id={task_id}");
        to_task(&stored)
    }

    /// Completes each task in order, stopping at the first failure.
    pub fn complete_tasks<S: AsRef<str>>(&self, task_ids: &[S]) -> TaskResult<Vec<Task>> {
        task_ids
            .iter()
            .map(|task_id| self.complete_task(task_id.as_ref()))
            .collect()
    }

    fn find_tasks(&self, query: &QuerySpec) -> TaskResult<Vec<Task>> {
        self.repo
            .find(query)?
            .iter()
            .map(to_task)
            .collect()
    }
}

fn to_task(item: &Item) -> TaskResult<Task> {
    Task::from_item(item).map_err(TaskServiceError::InvalidTask)
}
