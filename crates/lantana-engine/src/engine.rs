//! The pipeline execution engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lantana_pipeline::{FeatureCatalog, Step};
use lantana_provider::{ProviderContext, ProviderRegistry};
use lantana_quota::QuotaCoordinator;
use lantana_store::{Json, StepStatus, Store, TaskStatus, TaskStep};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::error::EngineError;

/// Executes locked pipelines against registered providers.
///
/// All collaborators are constructor-injected and shared: the engine holds no
/// process-wide mutable state of its own and is cheap to clone behind an
/// `Arc` for fire-and-forget spawning.
pub struct PipelineEngine {
  store: Arc<dyn Store>,
  registry: Arc<ProviderRegistry>,
  quota: Arc<dyn QuotaCoordinator>,
  catalog: Arc<dyn FeatureCatalog>,
}

impl PipelineEngine {
  pub fn new(
    store: Arc<dyn Store>,
    registry: Arc<ProviderRegistry>,
    quota: Arc<dyn QuotaCoordinator>,
    catalog: Arc<dyn FeatureCatalog>,
  ) -> Self {
    Self {
      store,
      registry,
      quota,
      catalog,
    }
  }

  /// Spawn a task execution on the runtime and return immediately.
  ///
  /// The caller (the task-creation collaborator) has already created the
  /// `pending` task row and reserved quota for it.
  pub fn spawn_task(
    self: &Arc<Self>,
    task_id: String,
    feature_id: String,
    input: Value,
  ) -> tokio::task::JoinHandle<()> {
    let engine = Arc::clone(self);
    tokio::spawn(async move { engine.execute_task(&task_id, &feature_id, input).await })
  }

  /// Execute one task to a terminal state.
  ///
  /// Returns nothing: the result is observed through the persisted
  /// Task/TaskStep rows. Every error is caught here and converted into a
  /// `failed` task plus a quota refund.
  #[instrument(name = "task_execute", skip(self, input))]
  pub async fn execute_task(&self, task_id: &str, feature_id: &str, input: Value) {
    info!(task_id, feature_id, "task_started");

    match self.run(task_id, feature_id, input).await {
      Ok(()) => {
        info!(task_id, "task_completed");
        // Success settles the saga. Idempotent, so a collaborator that
        // already confirmed is harmless.
        if let Err(err) = self.quota.confirm(task_id).await {
          warn!(task_id, error = %err, "quota confirm failed after success");
        }
      }
      Err(err) => {
        error!(task_id, error = %err, "task_failed");
        self.settle_failure(task_id, &err).await;
      }
    }
  }

  /// The happy path. Any `Err` falls through to `settle_failure`.
  async fn run(&self, task_id: &str, feature_id: &str, input: Value) -> Result<(), EngineError> {
    let feature = self
      .catalog
      .get(feature_id)
      .await
      .map_err(|e| EngineError::config(e.to_string()))?
      .ok_or_else(|| EngineError::config(format!("unknown feature '{feature_id}'")))?;

    let steps = &feature.pipeline.steps;
    if steps.is_empty() {
      return Err(EngineError::config(format!(
        "feature '{feature_id}' has no pipeline steps"
      )));
    }

    let mut task = self.store.get_task(task_id).await?;
    task.status = TaskStatus::Processing;
    task.updated_at = Utc::now();
    self.store.update_task(&task).await?;

    let rows: Vec<TaskStep> = steps
      .iter()
      .enumerate()
      .map(|(index, step)| {
        TaskStep::pending(task_id, index as i32, &step.step_type, &step.provider_ref)
      })
      .collect();
    self.store.create_steps(&rows).await?;

    // The first step consumes the trigger input; each step's output feeds
    // the next step.
    let mut current = input;
    for (index, step) in steps.iter().enumerate() {
      current = self.run_step(task_id, index, step, current).await?;
    }

    task.status = TaskStatus::Success;
    task.output = Some(Json(current));
    task.updated_at = Utc::now();
    self.store.update_task(&task).await?;
    Ok(())
  }

  /// Execute one step: mark it processing, resolve the provider, then race
  /// attempts against the step timeout until success or the retry budget is
  /// exhausted. The step row is mutated in place across attempts.
  async fn run_step(
    &self,
    task_id: &str,
    index: usize,
    step: &Step,
    input: Value,
  ) -> Result<Value, EngineError> {
    let mut row = self.store.get_step(task_id, index as i32).await?;
    row.status = StepStatus::Processing;
    row.input = Some(Json(input.clone()));
    row.started_at = Some(Utc::now());
    self.store.update_step(&row).await?;

    info!(task_id, step_index = index, step_type = %step.step_type, "step_started");

    let Some(provider) = self.registry.get(&step.step_type) else {
      let err = EngineError::ProviderMissing {
        step_type: step.step_type.clone(),
      };
      row.status = StepStatus::Failed;
      row.error = Some(err.to_string());
      row.completed_at = Some(Utc::now());
      self.store.update_step(&row).await?;
      return Err(err);
    };

    let ctx = ProviderContext {
      task_id: task_id.to_string(),
      step_index: index,
      provider_ref: step.provider_ref.clone(),
    };
    let timeout = Duration::from_millis(step.timeout_ms);
    let mut last_error = String::new();

    for attempt in 0..=step.retry.max_retries {
      if attempt > 0 {
        tokio::time::sleep(Duration::from_millis(step.retry.retry_delay_ms)).await;
      }

      row.attempts += 1;
      self.store.update_step(&row).await?;

      // A timed-out provider future is dropped here; if its result ever
      // materializes elsewhere it is simply never observed.
      let outcome = tokio::time::timeout(timeout, provider.execute(input.clone(), &ctx)).await;

      match outcome {
        Ok(Ok(output)) => {
          row.status = StepStatus::Completed;
          row.output = Some(Json(output.clone()));
          row.error = None;
          row.completed_at = Some(Utc::now());
          self.store.update_step(&row).await?;

          info!(
            task_id,
            step_index = index,
            attempts = row.attempts,
            "step_completed"
          );
          return Ok(output);
        }
        Ok(Err(err)) => {
          last_error = err.to_string();
          warn!(
            task_id,
            step_index = index,
            attempt = attempt + 1,
            error = %last_error,
            "step_attempt_failed"
          );
        }
        Err(_) => {
          last_error = format!("step timed out after {}ms", step.timeout_ms);
          warn!(
            task_id,
            step_index = index,
            attempt = attempt + 1,
            "step_attempt_timed_out"
          );
        }
      }
    }

    row.status = StepStatus::Failed;
    row.error = Some(last_error.clone());
    row.completed_at = Some(Utc::now());
    self.store.update_step(&row).await?;

    Err(EngineError::StepFailed {
      step_index: index,
      message: last_error,
    })
  }

  /// Persist the failure and refund the reservation. Both are best-effort:
  /// a storage outage here is logged, and the reconciliation sweep can
  /// re-issue the cancel later.
  async fn settle_failure(&self, task_id: &str, cause: &EngineError) {
    match self.store.get_task(task_id).await {
      Ok(mut task) => {
        task.status = TaskStatus::Failed;
        task.error = Some(cause.to_string());
        task.updated_at = Utc::now();
        if let Err(err) = self.store.update_task(&task).await {
          error!(task_id, error = %err, "failed to persist task failure");
        }
      }
      Err(err) => {
        error!(task_id, error = %err, "failed to load task while persisting failure");
      }
    }

    // The refund for undelivered work. Unconditional on every failure
    // branch; a no-op when nothing was reserved.
    if let Err(err) = self.quota.cancel(task_id).await {
      error!(task_id, error = %err, "quota cancel failed; reservation needs reconciliation");
    }
  }
}
