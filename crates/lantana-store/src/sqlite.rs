//! SQLite-backed store.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::types::{Task, TaskStep};
use crate::{Error, Store};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
  task_id     TEXT PRIMARY KEY,
  account_id  TEXT NOT NULL,
  feature_id  TEXT NOT NULL,
  status      TEXT NOT NULL,
  input       TEXT NOT NULL,
  output      TEXT,
  error       TEXT,
  created_at  TEXT NOT NULL,
  updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_account ON tasks (account_id, created_at);

CREATE TABLE IF NOT EXISTS task_steps (
  task_id      TEXT NOT NULL,
  step_index   INTEGER NOT NULL,
  step_type    TEXT NOT NULL,
  provider_ref TEXT NOT NULL,
  status       TEXT NOT NULL,
  input        TEXT,
  output       TEXT,
  error        TEXT,
  attempts     INTEGER NOT NULL DEFAULT 0,
  started_at   TEXT,
  completed_at TEXT,
  PRIMARY KEY (task_id, step_index)
);
";

/// Store implementation backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Open (creating if missing) a database file and ensure the schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Self::with_pool(pool).await
  }

  /// An in-memory database, for tests. Pinned to a single connection so
  /// every query sees the same database.
  pub async fn in_memory() -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect_with(options)
      .await?;
    Self::with_pool(pool).await
  }

  async fn with_pool(pool: SqlitePool) -> Result<Self, Error> {
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;
    Ok(Self { pool })
  }

  /// The underlying pool, for collaborators sharing the same database file.
  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn create_task(&self, task: &Task) -> Result<(), Error> {
    sqlx::query(
      "INSERT INTO tasks
         (task_id, account_id, feature_id, status, input, output, error, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .bind(&task.task_id)
    .bind(&task.account_id)
    .bind(&task.feature_id)
    .bind(task.status)
    .bind(&task.input)
    .bind(&task.output)
    .bind(&task.error)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn get_task(&self, task_id: &str) -> Result<Task, Error> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE task_id = ?1")
      .bind(task_id)
      .fetch_optional(&self.pool)
      .await?
      .ok_or_else(|| Error::NotFound(format!("task {task_id}")))
  }

  async fn update_task(&self, task: &Task) -> Result<(), Error> {
    let result = sqlx::query(
      "UPDATE tasks
       SET status = ?2, input = ?3, output = ?4, error = ?5, updated_at = ?6
       WHERE task_id = ?1",
    )
    .bind(&task.task_id)
    .bind(task.status)
    .bind(&task.input)
    .bind(&task.output)
    .bind(&task.error)
    .bind(task.updated_at)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("task {}", task.task_id)));
    }
    Ok(())
  }

  async fn list_tasks(&self, account_id: &str) -> Result<Vec<Task>, Error> {
    let tasks = sqlx::query_as::<_, Task>(
      "SELECT * FROM tasks WHERE account_id = ?1 ORDER BY created_at DESC",
    )
    .bind(account_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(tasks)
  }

  async fn create_steps(&self, steps: &[TaskStep]) -> Result<(), Error> {
    let mut tx = self.pool.begin().await?;
    for step in steps {
      sqlx::query(
        "INSERT INTO task_steps
           (task_id, step_index, step_type, provider_ref, status, input, output, error,
            attempts, started_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
      )
      .bind(&step.task_id)
      .bind(step.step_index)
      .bind(&step.step_type)
      .bind(&step.provider_ref)
      .bind(step.status)
      .bind(&step.input)
      .bind(&step.output)
      .bind(&step.error)
      .bind(step.attempts)
      .bind(step.started_at)
      .bind(step.completed_at)
      .execute(&mut *tx)
      .await?;
    }
    tx.commit().await?;
    Ok(())
  }

  async fn get_step(&self, task_id: &str, step_index: i32) -> Result<TaskStep, Error> {
    sqlx::query_as::<_, TaskStep>(
      "SELECT * FROM task_steps WHERE task_id = ?1 AND step_index = ?2",
    )
    .bind(task_id)
    .bind(step_index)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("task {task_id} step {step_index}")))
  }

  async fn update_step(&self, step: &TaskStep) -> Result<(), Error> {
    let result = sqlx::query(
      "UPDATE task_steps
       SET status = ?3, input = ?4, output = ?5, error = ?6, attempts = ?7,
           started_at = ?8, completed_at = ?9
       WHERE task_id = ?1 AND step_index = ?2",
    )
    .bind(&step.task_id)
    .bind(step.step_index)
    .bind(step.status)
    .bind(&step.input)
    .bind(&step.output)
    .bind(&step.error)
    .bind(step.attempts)
    .bind(step.started_at)
    .bind(step.completed_at)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!(
        "task {} step {}",
        step.task_id, step.step_index
      )));
    }
    Ok(())
  }

  async fn list_steps(&self, task_id: &str) -> Result<Vec<TaskStep>, Error> {
    let steps = sqlx::query_as::<_, TaskStep>(
      "SELECT * FROM task_steps WHERE task_id = ?1 ORDER BY step_index",
    )
    .bind(task_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(steps)
  }
}
