use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle phase of a quota transaction. Monotonic:
/// `reserved -> {confirmed | cancelled}`, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum QuotaPhase {
  Reserved,
  Confirmed,
  Cancelled,
}

/// An account's quota row: remaining balance plus the entitlement flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct QuotaAccount {
  pub account_id: String,
  pub balance: i64,
  /// Whether the account currently holds an active entitlement. Accounts
  /// without one cannot reserve, regardless of balance.
  pub active: bool,
}

/// One row per task: the record of a reserve and its terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct QuotaTransaction {
  pub task_id: String,
  pub account_id: String,
  pub amount: i64,
  pub phase: QuotaPhase,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl QuotaTransaction {
  /// A fresh `reserved` transaction.
  pub fn reserved(
    task_id: impl Into<String>,
    account_id: impl Into<String>,
    amount: i64,
  ) -> Self {
    let now = Utc::now();
    Self {
      task_id: task_id.into(),
      account_id: account_id.into(),
      amount,
      phase: QuotaPhase::Reserved,
      created_at: now,
      updated_at: now,
    }
  }
}
