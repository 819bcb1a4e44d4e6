//! Saga correctness tests, run against both coordinator implementations.

use std::sync::Arc;

use lantana_quota::{MemoryQuota, QuotaCoordinator, QuotaError, QuotaPhase, SqliteQuota};

async fn exercise_reserve_then_cancel(quota: &dyn QuotaCoordinator) {
  quota.upsert_account("acct", 10, true).await.unwrap();

  let txn = quota.reserve("acct", "t1", 3).await.unwrap();
  assert_eq!(txn.phase, QuotaPhase::Reserved);
  assert_eq!(txn.amount, 3);
  assert_eq!(quota.get_quota("acct").await.unwrap().balance, 7);

  quota.cancel("t1").await.unwrap();
  assert_eq!(quota.get_quota("acct").await.unwrap().balance, 10);
  let txn = quota.get_transaction("t1").await.unwrap().unwrap();
  assert_eq!(txn.phase, QuotaPhase::Cancelled);
}

async fn exercise_reserve_then_confirm(quota: &dyn QuotaCoordinator) {
  quota.upsert_account("acct", 10, true).await.unwrap();

  quota.reserve("acct", "t1", 4).await.unwrap();
  quota.confirm("t1").await.unwrap();

  // Confirm keeps the debit permanently.
  assert_eq!(quota.get_quota("acct").await.unwrap().balance, 6);
  let txn = quota.get_transaction("t1").await.unwrap().unwrap();
  assert_eq!(txn.phase, QuotaPhase::Confirmed);

  // A late cancel must not undo a confirmed transaction.
  quota.cancel("t1").await.unwrap();
  assert_eq!(quota.get_quota("acct").await.unwrap().balance, 6);
  let txn = quota.get_transaction("t1").await.unwrap().unwrap();
  assert_eq!(txn.phase, QuotaPhase::Confirmed);
}

async fn exercise_idempotence(quota: &dyn QuotaCoordinator) {
  quota.upsert_account("acct", 10, true).await.unwrap();
  quota.reserve("acct", "t1", 3).await.unwrap();

  quota.cancel("t1").await.unwrap();
  quota.cancel("t1").await.unwrap();
  quota.cancel("t1").await.unwrap();
  assert_eq!(quota.get_quota("acct").await.unwrap().balance, 10);

  quota.reserve("acct", "t2", 3).await.unwrap();
  quota.confirm("t2").await.unwrap();
  quota.confirm("t2").await.unwrap();
  assert_eq!(quota.get_quota("acct").await.unwrap().balance, 7);

  // Terminal operations on unknown tasks are silent no-ops.
  quota.confirm("never-reserved").await.unwrap();
  quota.cancel("never-reserved").await.unwrap();
}

async fn exercise_resource_errors(quota: &dyn QuotaCoordinator) {
  let err = quota.reserve("nobody", "t1", 1).await.unwrap_err();
  assert!(matches!(err, QuotaError::NotMember { .. }));
  assert_eq!(err.code(), "NOT_MEMBER");

  quota.upsert_account("lapsed", 10, false).await.unwrap();
  let err = quota.reserve("lapsed", "t1", 1).await.unwrap_err();
  assert!(matches!(err, QuotaError::NotMember { .. }));

  quota.upsert_account("poor", 2, true).await.unwrap();
  let err = quota.reserve("poor", "t1", 3).await.unwrap_err();
  match err {
    QuotaError::Insufficient {
      remaining,
      requested,
    } => {
      assert_eq!(remaining, 2);
      assert_eq!(requested, 3);
    }
    other => panic!("expected Insufficient, got {other:?}"),
  }
  // A failed reserve never records a transaction.
  assert!(quota.get_transaction("t1").await.unwrap().is_none());
  assert_eq!(quota.get_quota("poor").await.unwrap().balance, 2);
}

async fn exercise_duplicate_reservation(quota: &dyn QuotaCoordinator) {
  quota.upsert_account("acct", 10, true).await.unwrap();
  quota.reserve("acct", "t1", 2).await.unwrap();

  let err = quota.reserve("acct", "t1", 2).await.unwrap_err();
  assert!(matches!(err, QuotaError::DuplicateReservation { .. }));
  // The duplicate attempt must not double-debit.
  assert_eq!(quota.get_quota("acct").await.unwrap().balance, 8);
}

async fn exercise_check_quota(quota: &dyn QuotaCoordinator) {
  quota.upsert_account("acct", 5, true).await.unwrap();
  quota.check_quota("acct", 5).await.unwrap();
  assert!(matches!(
    quota.check_quota("acct", 6).await,
    Err(QuotaError::Insufficient { .. })
  ));
  assert!(matches!(
    quota.check_quota("nobody", 1).await,
    Err(QuotaError::NotMember { .. })
  ));
}

async fn exercise_list_reserved(quota: &dyn QuotaCoordinator) {
  quota.upsert_account("acct", 10, true).await.unwrap();
  quota.reserve("acct", "t1", 1).await.unwrap();
  quota.reserve("acct", "t2", 1).await.unwrap();
  quota.reserve("acct", "t3", 1).await.unwrap();
  quota.confirm("t1").await.unwrap();
  quota.cancel("t2").await.unwrap();

  let reserved = quota.list_reserved().await.unwrap();
  let ids: Vec<&str> = reserved.iter().map(|t| t.task_id.as_str()).collect();
  assert_eq!(ids, vec!["t3"]);
}

#[tokio::test]
async fn memory_reserve_then_cancel_restores_balance() {
  exercise_reserve_then_cancel(&MemoryQuota::new()).await;
}

#[tokio::test]
async fn sqlite_reserve_then_cancel_restores_balance() {
  exercise_reserve_then_cancel(&SqliteQuota::in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn memory_reserve_then_confirm_keeps_debit() {
  exercise_reserve_then_confirm(&MemoryQuota::new()).await;
}

#[tokio::test]
async fn sqlite_reserve_then_confirm_keeps_debit() {
  exercise_reserve_then_confirm(&SqliteQuota::in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn memory_terminal_operations_are_idempotent() {
  exercise_idempotence(&MemoryQuota::new()).await;
}

#[tokio::test]
async fn sqlite_terminal_operations_are_idempotent() {
  exercise_idempotence(&SqliteQuota::in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn memory_resource_errors_carry_amounts() {
  exercise_resource_errors(&MemoryQuota::new()).await;
}

#[tokio::test]
async fn sqlite_resource_errors_carry_amounts() {
  exercise_resource_errors(&SqliteQuota::in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn memory_duplicate_reservation_is_rejected() {
  exercise_duplicate_reservation(&MemoryQuota::new()).await;
}

#[tokio::test]
async fn sqlite_duplicate_reservation_is_rejected() {
  exercise_duplicate_reservation(&SqliteQuota::in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn memory_check_quota_mirrors_reserve() {
  exercise_check_quota(&MemoryQuota::new()).await;
}

#[tokio::test]
async fn sqlite_check_quota_mirrors_reserve() {
  exercise_check_quota(&SqliteQuota::in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn memory_list_reserved_excludes_terminal_phases() {
  exercise_list_reserved(&MemoryQuota::new()).await;
}

#[tokio::test]
async fn sqlite_list_reserved_excludes_terminal_phases() {
  exercise_list_reserved(&SqliteQuota::in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn concurrent_reserves_never_oversubscribe() {
  let quota = Arc::new(MemoryQuota::new());
  quota.upsert_account("acct", 5, true).await.unwrap();

  let first = {
    let quota = Arc::clone(&quota);
    tokio::spawn(async move { quota.reserve("acct", "t1", 3).await })
  };
  let second = {
    let quota = Arc::clone(&quota);
    tokio::spawn(async move { quota.reserve("acct", "t2", 3).await })
  };

  let (first, second) = tokio::join!(first, second);
  let results = [first.unwrap(), second.unwrap()];

  let successes = results.iter().filter(|r| r.is_ok()).count();
  assert_eq!(successes, 1, "exactly one reserve may win");
  assert!(results.iter().any(|r| matches!(
    r,
    Err(QuotaError::Insufficient {
      remaining: 2,
      requested: 3
    })
  )));
  assert_eq!(quota.get_quota("acct").await.unwrap().balance, 2);
}
