//! Lantana Quota
//!
//! Per-account consumable quota, coordinated as a saga. The forward action
//! (`reserve`) is the only place a balance is decremented and is atomic under
//! the account's row lock; the compensating action (`cancel`) credits the
//! balance back and, like `confirm`, is idempotent: zero, one, or many
//! invocations have the same net effect. That idempotence is what makes the
//! saga correct under at-least-once retries from crashed or retrying callers.
//!
//! Two implementations: [`MemoryQuota`] (a single mutex stands in for the row
//! lock; tests and development) and [`SqliteQuota`] (one write transaction
//! per reserve/cancel).

mod error;
mod memory;
mod sqlite;
mod types;

pub use error::QuotaError;
pub use memory::MemoryQuota;
pub use sqlite::SqliteQuota;
pub use types::{QuotaAccount, QuotaPhase, QuotaTransaction};

use async_trait::async_trait;

/// The saga coordinator over the quota ledger. Operations are keyed by
/// `task_id`; at most one transaction exists per task.
#[async_trait]
pub trait QuotaCoordinator: Send + Sync {
  /// Atomically debit `amount` from the account and record a `reserved`
  /// transaction for `task_id`.
  ///
  /// Fails with [`QuotaError::NotMember`] when the account is missing or has
  /// no active entitlement, and [`QuotaError::Insufficient`] (carrying
  /// remaining/requested) when the balance does not cover the amount.
  async fn reserve(
    &self,
    account_id: &str,
    task_id: &str,
    amount: i64,
  ) -> Result<QuotaTransaction, QuotaError>;

  /// Flip the task's `reserved` transaction to `confirmed`. No balance
  /// change, the debit already happened at reserve. No-op when no
  /// `reserved` transaction exists.
  async fn confirm(&self, task_id: &str) -> Result<(), QuotaError>;

  /// Credit the reserved amount back and flip the transaction to
  /// `cancelled`. No-op when no `reserved` transaction exists.
  async fn cancel(&self, task_id: &str) -> Result<(), QuotaError>;

  /// Read an account's current state.
  async fn get_quota(&self, account_id: &str) -> Result<QuotaAccount, QuotaError>;

  /// Non-authoritative pre-flight: would `reserve` currently succeed?
  /// Raises the same resource errors as `reserve` without mutating anything;
  /// `reserve` remains the single source of truth.
  async fn check_quota(&self, account_id: &str, amount: i64) -> Result<(), QuotaError>;

  /// Read the transaction recorded for a task, if any.
  async fn get_transaction(&self, task_id: &str) -> Result<Option<QuotaTransaction>, QuotaError>;

  /// All transactions still in the `reserved` phase. Feeds the
  /// reconciliation sweep.
  async fn list_reserved(&self) -> Result<Vec<QuotaTransaction>, QuotaError>;

  /// Create or replace an account's balance and entitlement flag.
  async fn upsert_account(
    &self,
    account_id: &str,
    balance: i64,
    active: bool,
  ) -> Result<(), QuotaError>;
}
