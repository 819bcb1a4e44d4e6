use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Status of a task (one pipeline execution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TaskStatus {
  Pending,
  Processing,
  Success,
  Failed,
}

impl TaskStatus {
  /// Terminal states never change again.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Success | Self::Failed)
  }
}

/// Status of a single step within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StepStatus {
  Pending,
  Processing,
  Completed,
  Failed,
}

/// A task as stored in the database: one execution of a feature's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Task {
  pub task_id: String,
  pub account_id: String,
  pub feature_id: String,
  pub status: TaskStatus,
  pub input: Json<serde_json::Value>,
  pub output: Option<Json<serde_json::Value>>,
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Task {
  /// A fresh `pending` task, as the triggering collaborator creates it.
  pub fn pending(
    task_id: impl Into<String>,
    account_id: impl Into<String>,
    feature_id: impl Into<String>,
    input: serde_json::Value,
  ) -> Self {
    let now = Utc::now();
    Self {
      task_id: task_id.into(),
      account_id: account_id.into(),
      feature_id: feature_id.into(),
      status: TaskStatus::Pending,
      input: Json(input),
      output: None,
      error: None,
      created_at: now,
      updated_at: now,
    }
  }
}

/// One step row per pipeline step per task. Bulk-created when the task starts
/// processing; mutated in place across retry attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskStep {
  pub task_id: String,
  pub step_index: i32,
  pub step_type: String,
  pub provider_ref: String,
  pub status: StepStatus,
  pub input: Option<Json<serde_json::Value>>,
  pub output: Option<Json<serde_json::Value>>,
  pub error: Option<String>,
  /// Attempts made so far, counting the first execution.
  pub attempts: i32,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
}

impl TaskStep {
  /// A fresh `pending` step row.
  pub fn pending(
    task_id: impl Into<String>,
    step_index: i32,
    step_type: impl Into<String>,
    provider_ref: impl Into<String>,
  ) -> Self {
    Self {
      task_id: task_id.into(),
      step_index,
      step_type: step_type.into(),
      provider_ref: provider_ref.into(),
      status: StepStatus::Pending,
      input: None,
      output: None,
      error: None,
      attempts: 0,
      started_at: None,
      completed_at: None,
    }
  }
}
