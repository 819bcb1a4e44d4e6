//! Lantana Store
//!
//! This crate provides the storage trait and implementations for tasks and
//! their per-step execution records. Durable state lives in SQLite via sqlx;
//! [`MemoryStore`] backs tests and development.
//!
//! The [`Store`] trait defines operations for:
//! - Creating and updating task rows
//! - Bulk-creating and updating step rows
//! - Querying task/step state (the poll surface for status endpoints)
//!
//! The engine persists every transition through this trait before moving on,
//! so readers always observe monotonically advancing state.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{StepStatus, Task, TaskStatus, TaskStep};

/// Re-exported payload wrapper so callers build rows without a direct sqlx
/// dependency.
pub use sqlx::types::Json;

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// A non-database storage failure (lock poisoning and the like).
  #[error("storage error: {0}")]
  Storage(String),
}

/// Storage trait for tasks and their steps.
#[async_trait]
pub trait Store: Send + Sync {
  /// Create a new task row.
  async fn create_task(&self, task: &Task) -> Result<(), Error>;

  /// Get a task by id.
  async fn get_task(&self, task_id: &str) -> Result<Task, Error>;

  /// Update a task row in place.
  async fn update_task(&self, task: &Task) -> Result<(), Error>;

  /// List tasks owned by an account, newest first.
  async fn list_tasks(&self, account_id: &str) -> Result<Vec<Task>, Error>;

  /// Bulk-create step rows. Called once when a task starts processing.
  async fn create_steps(&self, steps: &[TaskStep]) -> Result<(), Error>;

  /// Get one step by task id and index.
  async fn get_step(&self, task_id: &str, step_index: i32) -> Result<TaskStep, Error>;

  /// Update a step row in place. Retries mutate the same row.
  async fn update_step(&self, step: &TaskStep) -> Result<(), Error>;

  /// List a task's steps in index order.
  async fn list_steps(&self, task_id: &str) -> Result<Vec<TaskStep>, Error>;
}
