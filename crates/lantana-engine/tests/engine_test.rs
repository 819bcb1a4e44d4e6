//! End-to-end engine tests against in-memory collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use lantana_engine::{PipelineEngine, reconcile_reservations};
use lantana_pipeline::{Feature, MemoryCatalog, Pipeline, RetryPolicy, Step};
use lantana_provider::{Provider, ProviderContext, ProviderError, ProviderRegistry};
use lantana_quota::{MemoryQuota, QuotaCoordinator, QuotaPhase};
use lantana_store::{MemoryStore, StepStatus, Store, Task, TaskStatus};

/// Echoes its input back, tagged with the executing step index.
struct Echo;

#[async_trait]
impl Provider for Echo {
  async fn execute(&self, input: Value, ctx: &ProviderContext) -> Result<Value, ProviderError> {
    Ok(json!({"from_step": ctx.step_index, "received": input}))
  }
}

/// Fails the first `failures` calls, then succeeds reporting the attempt.
struct Flaky {
  failures: u32,
  calls: AtomicU32,
}

impl Flaky {
  fn new(failures: u32) -> Self {
    Self {
      failures,
      calls: AtomicU32::new(0),
    }
  }
}

#[async_trait]
impl Provider for Flaky {
  async fn execute(&self, _input: Value, _ctx: &ProviderContext) -> Result<Value, ProviderError> {
    let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
    if call <= self.failures {
      Err(ProviderError::execution(format!("transient failure {call}")))
    } else {
      Ok(json!({"attempt": call}))
    }
  }
}

/// Never returns within any reasonable step timeout.
struct Stuck;

#[async_trait]
impl Provider for Stuck {
  async fn execute(&self, _input: Value, _ctx: &ProviderContext) -> Result<Value, ProviderError> {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    Ok(Value::Null)
  }
}

fn step(step_type: &str, max_retries: u32) -> Step {
  Step {
    step_type: step_type.into(),
    provider_ref: step_type.into(),
    timeout_ms: 5_000,
    retry: RetryPolicy {
      max_retries,
      retry_delay_ms: 10,
    },
  }
}

fn feature(feature_id: &str, steps: Vec<Step>) -> Feature {
  Feature {
    feature_id: feature_id.into(),
    name: feature_id.into(),
    pipeline: Pipeline { steps },
    quota_cost: 3,
  }
}

struct Bed {
  engine: Arc<PipelineEngine>,
  store: Arc<MemoryStore>,
  quota: Arc<MemoryQuota>,
}

impl Bed {
  fn new(features: Vec<Feature>, providers: Vec<(&str, Arc<dyn Provider>)>) -> Self {
    let store = Arc::new(MemoryStore::new());
    let quota = Arc::new(MemoryQuota::new());
    let catalog = Arc::new(MemoryCatalog::new(features));

    let mut registry = ProviderRegistry::new();
    for (step_type, provider) in providers {
      registry.register(step_type, provider);
    }

    let engine = Arc::new(PipelineEngine::new(
      Arc::clone(&store) as Arc<dyn Store>,
      Arc::new(registry),
      Arc::clone(&quota) as Arc<dyn QuotaCoordinator>,
      catalog,
    ));

    Self {
      engine,
      store,
      quota,
    }
  }

  /// Simulate the task-creation collaborator: pending row plus reservation.
  async fn trigger(&self, task_id: &str, feature_id: &str, input: Value) {
    self.quota.upsert_account("acct", 10, true).await.unwrap();
    self
      .store
      .create_task(&Task::pending(task_id, "acct", feature_id, input.clone()))
      .await
      .unwrap();
    self.quota.reserve("acct", task_id, 3).await.unwrap();
    self.engine.execute_task(task_id, feature_id, input).await;
  }
}

#[tokio::test]
async fn successful_pipeline_chains_outputs_and_confirms_quota() {
  let bed = Bed::new(
    vec![feature("f", vec![step("first", 0), step("second", 0)])],
    vec![("first", Arc::new(Echo)), ("second", Arc::new(Echo))],
  );

  bed.trigger("t1", "f", json!({"text": "hello"})).await;

  let task = bed.store.get_task("t1").await.unwrap();
  assert_eq!(task.status, TaskStatus::Success);
  assert!(task.error.is_none());

  let steps = bed.store.list_steps("t1").await.unwrap();
  assert_eq!(steps.len(), 2);
  assert!(steps.iter().all(|s| s.status == StepStatus::Completed));

  // First step consumed the trigger input; second consumed the first's output.
  assert_eq!(
    steps[0].input.as_ref().unwrap().0,
    json!({"text": "hello"})
  );
  assert_eq!(
    steps[1].input.as_ref().unwrap().0,
    steps[0].output.as_ref().unwrap().0
  );
  // The task's result is the last step's output.
  assert_eq!(
    task.output.as_ref().unwrap().0,
    steps[1].output.as_ref().unwrap().0
  );

  let txn = bed.quota.get_transaction("t1").await.unwrap().unwrap();
  assert_eq!(txn.phase, QuotaPhase::Confirmed);
  assert_eq!(bed.quota.get_quota("acct").await.unwrap().balance, 7);
}

#[tokio::test]
async fn retries_then_succeeds_and_feeds_next_step() {
  // Step 2 fails attempts 1-2 and succeeds on attempt 3; the task still
  // completes and step 3 sees attempt 3's output.
  let bed = Bed::new(
    vec![feature(
      "f",
      vec![step("first", 0), step("flaky", 2), step("third", 0)],
    )],
    vec![
      ("first", Arc::new(Echo)),
      ("flaky", Arc::new(Flaky::new(2))),
      ("third", Arc::new(Echo)),
    ],
  );

  bed.trigger("t1", "f", json!({})).await;

  let task = bed.store.get_task("t1").await.unwrap();
  assert_eq!(task.status, TaskStatus::Success);

  let steps = bed.store.list_steps("t1").await.unwrap();
  assert_eq!(steps[1].status, StepStatus::Completed);
  assert_eq!(steps[1].attempts, 3);
  assert_eq!(steps[1].output.as_ref().unwrap().0, json!({"attempt": 3}));
  assert!(steps[1].error.is_none());

  assert_eq!(
    steps[2].input.as_ref().unwrap().0,
    json!({"attempt": 3})
  );
  assert_eq!(steps[2].status, StepStatus::Completed);
}

#[tokio::test]
async fn exhausted_retries_fail_the_task_and_refund_quota() {
  // Step 2 fails all three attempts: the task fails, step 3 never starts,
  // and the reservation is cancelled.
  let bed = Bed::new(
    vec![feature(
      "f",
      vec![step("first", 0), step("flaky", 2), step("third", 0)],
    )],
    vec![
      ("first", Arc::new(Echo)),
      ("flaky", Arc::new(Flaky::new(99))),
      ("third", Arc::new(Echo)),
    ],
  );

  bed.trigger("t1", "f", json!({})).await;

  let task = bed.store.get_task("t1").await.unwrap();
  assert_eq!(task.status, TaskStatus::Failed);
  assert!(task.error.as_deref().unwrap().contains("step 1"));

  let steps = bed.store.list_steps("t1").await.unwrap();
  assert_eq!(steps[0].status, StepStatus::Completed);
  assert_eq!(steps[1].status, StepStatus::Failed);
  assert_eq!(steps[1].attempts, 3);
  assert_eq!(
    steps[1].error.as_deref(),
    Some("transient failure 3")
  );
  // Never started.
  assert_eq!(steps[2].status, StepStatus::Pending);
  assert_eq!(steps[2].attempts, 0);

  let txn = bed.quota.get_transaction("t1").await.unwrap().unwrap();
  assert_eq!(txn.phase, QuotaPhase::Cancelled);
  assert_eq!(bed.quota.get_quota("acct").await.unwrap().balance, 10);
}

#[tokio::test]
async fn timeout_counts_as_a_failed_attempt() {
  let mut slow = step("stuck", 1);
  slow.timeout_ms = 50;

  let bed = Bed::new(
    vec![feature("f", vec![slow])],
    vec![("stuck", Arc::new(Stuck))],
  );

  bed.trigger("t1", "f", json!({})).await;

  let task = bed.store.get_task("t1").await.unwrap();
  assert_eq!(task.status, TaskStatus::Failed);

  let steps = bed.store.list_steps("t1").await.unwrap();
  assert_eq!(steps[0].status, StepStatus::Failed);
  assert_eq!(steps[0].attempts, 2);
  assert!(steps[0].error.as_deref().unwrap().contains("timed out"));

  let txn = bed.quota.get_transaction("t1").await.unwrap().unwrap();
  assert_eq!(txn.phase, QuotaPhase::Cancelled);
}

#[tokio::test]
async fn unregistered_provider_is_fatal_without_retry() {
  let bed = Bed::new(
    vec![feature("f", vec![step("ghost", 5)])],
    vec![("first", Arc::new(Echo))],
  );

  bed.trigger("t1", "f", json!({})).await;

  let task = bed.store.get_task("t1").await.unwrap();
  assert_eq!(task.status, TaskStatus::Failed);
  assert!(task.error.as_deref().unwrap().contains("ghost"));

  let steps = bed.store.list_steps("t1").await.unwrap();
  assert_eq!(steps[0].status, StepStatus::Failed);
  // No retry: the provider was never invoked.
  assert_eq!(steps[0].attempts, 0);

  assert_eq!(bed.quota.get_quota("acct").await.unwrap().balance, 10);
}

#[tokio::test]
async fn empty_pipeline_is_fatal_and_refunds() {
  let bed = Bed::new(vec![feature("f", vec![])], vec![]);

  bed.trigger("t1", "f", json!({})).await;

  let task = bed.store.get_task("t1").await.unwrap();
  assert_eq!(task.status, TaskStatus::Failed);
  assert!(task.error.as_deref().unwrap().contains("no pipeline steps"));
  assert!(bed.store.list_steps("t1").await.unwrap().is_empty());
  assert_eq!(bed.quota.get_quota("acct").await.unwrap().balance, 10);
}

#[tokio::test]
async fn unknown_feature_is_fatal_and_refunds() {
  let bed = Bed::new(vec![], vec![]);

  bed.trigger("t1", "missing", json!({})).await;

  let task = bed.store.get_task("t1").await.unwrap();
  assert_eq!(task.status, TaskStatus::Failed);
  assert!(task.error.as_deref().unwrap().contains("unknown feature"));
  assert_eq!(bed.quota.get_quota("acct").await.unwrap().balance, 10);
}

#[tokio::test]
async fn spawned_tasks_run_concurrently_and_independently() {
  let bed = Bed::new(
    vec![feature("f", vec![step("first", 0)])],
    vec![("first", Arc::new(Echo))],
  );
  bed.quota.upsert_account("acct", 10, true).await.unwrap();

  for task_id in ["t1", "t2"] {
    bed
      .store
      .create_task(&Task::pending(task_id, "acct", "f", json!({})))
      .await
      .unwrap();
    bed.quota.reserve("acct", task_id, 3).await.unwrap();
  }

  let handles = vec![
    bed.engine.spawn_task("t1".into(), "f".into(), json!({})),
    bed.engine.spawn_task("t2".into(), "f".into(), json!({})),
  ];
  futures::future::join_all(handles).await;

  for task_id in ["t1", "t2"] {
    assert_eq!(
      bed.store.get_task(task_id).await.unwrap().status,
      TaskStatus::Success
    );
  }
  assert_eq!(bed.quota.get_quota("acct").await.unwrap().balance, 4);
}

#[tokio::test]
async fn reconcile_cancels_reservations_of_failed_tasks() {
  let bed = Bed::new(vec![], vec![]);
  bed.quota.upsert_account("acct", 10, true).await.unwrap();

  // A failed task whose cancel was lost (simulated by never running it).
  let mut orphaned = Task::pending("lost", "acct", "f", json!({}));
  orphaned.status = TaskStatus::Failed;
  bed.store.create_task(&orphaned).await.unwrap();
  bed.quota.reserve("acct", "lost", 3).await.unwrap();

  // A healthy in-flight task: its reservation must be left alone.
  bed
    .store
    .create_task(&Task::pending("inflight", "acct", "f", json!({})))
    .await
    .unwrap();
  bed.quota.reserve("acct", "inflight", 2).await.unwrap();

  let cancelled = reconcile_reservations(bed.store.as_ref(), bed.quota.as_ref())
    .await
    .unwrap();
  assert_eq!(cancelled, 1);
  assert_eq!(bed.quota.get_quota("acct").await.unwrap().balance, 8);
  assert_eq!(
    bed
      .quota
      .get_transaction("lost")
      .await
      .unwrap()
      .unwrap()
      .phase,
    QuotaPhase::Cancelled
  );
  assert_eq!(
    bed
      .quota
      .get_transaction("inflight")
      .await
      .unwrap()
      .unwrap()
      .phase,
    QuotaPhase::Reserved
  );

  // The sweep is idempotent.
  let again = reconcile_reservations(bed.store.as_ref(), bed.quota.as_ref())
    .await
    .unwrap();
  assert_eq!(again, 0);
}
