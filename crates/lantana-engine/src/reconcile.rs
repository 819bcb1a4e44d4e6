//! Reservation reconciliation.
//!
//! The engine cancels eagerly on every failure branch, but that cancel is
//! best-effort: a storage outage at the wrong moment can leave a `reserved`
//! transaction behind for a task that already failed. This sweep finds those
//! and re-issues the cancel. Because `cancel` is idempotent the sweep can run
//! any number of times, concurrently with live traffic.

use lantana_quota::QuotaCoordinator;
use lantana_store::{Store, TaskStatus};
use tracing::{info, warn};

use crate::error::EngineError;

/// Cancel every `reserved` transaction whose task is terminally `failed`.
///
/// Returns the number of reservations cancelled. Transactions whose task is
/// still pending/processing are left alone (their engine flow will settle
/// them), as are transactions pointing at tasks this store has never seen.
pub async fn reconcile_reservations(
  store: &dyn Store,
  quota: &dyn QuotaCoordinator,
) -> Result<usize, EngineError> {
  let reserved = quota.list_reserved().await?;
  let mut cancelled = 0;

  for txn in reserved {
    match store.get_task(&txn.task_id).await {
      Ok(task) if task.status == TaskStatus::Failed => {
        quota.cancel(&txn.task_id).await?;
        cancelled += 1;
        info!(task_id = %txn.task_id, amount = txn.amount, "reconciled lost refund");
      }
      Ok(_) => {}
      Err(lantana_store::Error::NotFound(_)) => {
        warn!(task_id = %txn.task_id, "reserved transaction references unknown task");
      }
      Err(err) => return Err(err.into()),
    }
  }

  Ok(cancelled)
}
