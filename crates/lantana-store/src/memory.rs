//! In-memory store for tests and development.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::types::{Task, TaskStep};
use crate::{Error, Store};

fn poison_err<T>(_: PoisonError<T>) -> Error {
  Error::Storage("store lock poisoned".into())
}

/// Thread-safe in-memory store. Not durable; single process only.
#[derive(Debug, Default)]
pub struct MemoryStore {
  tasks: RwLock<HashMap<String, Task>>,
  steps: RwLock<HashMap<String, Vec<TaskStep>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn create_task(&self, task: &Task) -> Result<(), Error> {
    let mut tasks = self.tasks.write().map_err(poison_err)?;
    tasks.insert(task.task_id.clone(), task.clone());
    Ok(())
  }

  async fn get_task(&self, task_id: &str) -> Result<Task, Error> {
    let tasks = self.tasks.read().map_err(poison_err)?;
    tasks
      .get(task_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("task {task_id}")))
  }

  async fn update_task(&self, task: &Task) -> Result<(), Error> {
    let mut tasks = self.tasks.write().map_err(poison_err)?;
    if !tasks.contains_key(&task.task_id) {
      return Err(Error::NotFound(format!("task {}", task.task_id)));
    }
    tasks.insert(task.task_id.clone(), task.clone());
    Ok(())
  }

  async fn list_tasks(&self, account_id: &str) -> Result<Vec<Task>, Error> {
    let tasks = self.tasks.read().map_err(poison_err)?;
    let mut owned: Vec<Task> = tasks
      .values()
      .filter(|t| t.account_id == account_id)
      .cloned()
      .collect();
    owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(owned)
  }

  async fn create_steps(&self, new_steps: &[TaskStep]) -> Result<(), Error> {
    let mut steps = self.steps.write().map_err(poison_err)?;
    for step in new_steps {
      steps
        .entry(step.task_id.clone())
        .or_default()
        .push(step.clone());
    }
    Ok(())
  }

  async fn get_step(&self, task_id: &str, step_index: i32) -> Result<TaskStep, Error> {
    let steps = self.steps.read().map_err(poison_err)?;
    steps
      .get(task_id)
      .and_then(|rows| rows.iter().find(|s| s.step_index == step_index))
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("task {task_id} step {step_index}")))
  }

  async fn update_step(&self, step: &TaskStep) -> Result<(), Error> {
    let mut steps = self.steps.write().map_err(poison_err)?;
    let rows = steps
      .get_mut(&step.task_id)
      .ok_or_else(|| Error::NotFound(format!("task {}", step.task_id)))?;
    let row = rows
      .iter_mut()
      .find(|s| s.step_index == step.step_index)
      .ok_or_else(|| {
        Error::NotFound(format!("task {} step {}", step.task_id, step.step_index))
      })?;
    *row = step.clone();
    Ok(())
  }

  async fn list_steps(&self, task_id: &str) -> Result<Vec<TaskStep>, Error> {
    let steps = self.steps.read().map_err(poison_err)?;
    let mut rows = steps.get(task_id).cloned().unwrap_or_default();
    rows.sort_by_key(|s| s.step_index);
    Ok(rows)
  }
}
