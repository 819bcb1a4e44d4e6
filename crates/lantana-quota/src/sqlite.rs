//! SQLite-backed quota coordinator.
//!
//! `reserve` and `cancel` each run as one write transaction; the first write
//! statement takes the database's write lock, which is the "account row lock"
//! held only for the duration of the ledger mutation, never across pipeline
//! work.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::debug;

use crate::error::QuotaError;
use crate::types::{QuotaAccount, QuotaPhase, QuotaTransaction};
use crate::QuotaCoordinator;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS quota_accounts (
  account_id TEXT PRIMARY KEY,
  balance    INTEGER NOT NULL,
  active     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS quota_transactions (
  task_id    TEXT PRIMARY KEY,
  account_id TEXT NOT NULL,
  amount     INTEGER NOT NULL,
  phase      TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_quota_txn_phase ON quota_transactions (phase);
";

/// Quota coordinator backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteQuota {
  pool: SqlitePool,
}

impl SqliteQuota {
  /// Open (creating if missing) a database file and ensure the schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, QuotaError> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Self::with_pool(pool).await
  }

  /// An in-memory database, for tests. Pinned to a single connection so
  /// every query sees the same database.
  pub async fn in_memory() -> Result<Self, QuotaError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect_with(options)
      .await?;
    Self::with_pool(pool).await
  }

  async fn with_pool(pool: SqlitePool) -> Result<Self, QuotaError> {
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;
    Ok(Self { pool })
  }

  async fn fetch_account(&self, account_id: &str) -> Result<Option<QuotaAccount>, QuotaError> {
    let account =
      sqlx::query_as::<_, QuotaAccount>("SELECT * FROM quota_accounts WHERE account_id = ?1")
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
    Ok(account)
  }
}

#[async_trait]
impl QuotaCoordinator for SqliteQuota {
  async fn reserve(
    &self,
    account_id: &str,
    task_id: &str,
    amount: i64,
  ) -> Result<QuotaTransaction, QuotaError> {
    let txn = QuotaTransaction::reserved(task_id, account_id, amount);

    let mut tx = self.pool.begin().await?;

    // Insert first: the primary key enforces at-most-one transaction per
    // task, and the write takes the database lock before the balance check.
    let inserted = sqlx::query(
      "INSERT INTO quota_transactions (task_id, account_id, amount, phase, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(&txn.task_id)
    .bind(&txn.account_id)
    .bind(txn.amount)
    .bind(txn.phase)
    .bind(txn.created_at)
    .bind(txn.updated_at)
    .execute(&mut *tx)
    .await;

    if let Err(err) = inserted {
      if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
          return Err(QuotaError::DuplicateReservation {
            task_id: task_id.to_string(),
          });
        }
      }
      return Err(err.into());
    }

    let debited = sqlx::query(
      "UPDATE quota_accounts
       SET balance = balance - ?2
       WHERE account_id = ?1 AND active = 1 AND balance >= ?2",
    )
    .bind(account_id)
    .bind(amount)
    .execute(&mut *tx)
    .await?;

    if debited.rows_affected() == 0 {
      // Roll back the insert, then diagnose why the debit was refused.
      tx.rollback().await?;
      return match self.fetch_account(account_id).await? {
        Some(account) if account.active => Err(QuotaError::Insufficient {
          remaining: account.balance,
          requested: amount,
        }),
        _ => Err(QuotaError::NotMember {
          account_id: account_id.to_string(),
        }),
      };
    }

    tx.commit().await?;
    debug!(account_id, task_id, amount, "quota reserved");
    Ok(txn)
  }

  async fn confirm(&self, task_id: &str) -> Result<(), QuotaError> {
    let updated = sqlx::query(
      "UPDATE quota_transactions
       SET phase = ?2, updated_at = ?3
       WHERE task_id = ?1 AND phase = ?4",
    )
    .bind(task_id)
    .bind(QuotaPhase::Confirmed)
    .bind(Utc::now())
    .bind(QuotaPhase::Reserved)
    .execute(&self.pool)
    .await?;

    if updated.rows_affected() > 0 {
      debug!(task_id, "quota confirmed");
    }
    Ok(())
  }

  async fn cancel(&self, task_id: &str) -> Result<(), QuotaError> {
    let mut tx = self.pool.begin().await?;

    // The conditional update is the idempotence guard: only the transition
    // out of `reserved` credits the balance back.
    let flipped = sqlx::query(
      "UPDATE quota_transactions
       SET phase = ?2, updated_at = ?3
       WHERE task_id = ?1 AND phase = ?4",
    )
    .bind(task_id)
    .bind(QuotaPhase::Cancelled)
    .bind(Utc::now())
    .bind(QuotaPhase::Reserved)
    .execute(&mut *tx)
    .await?;

    if flipped.rows_affected() == 0 {
      return Ok(());
    }

    sqlx::query(
      "UPDATE quota_accounts
       SET balance = balance + (SELECT amount FROM quota_transactions WHERE task_id = ?1)
       WHERE account_id = (SELECT account_id FROM quota_transactions WHERE task_id = ?1)",
    )
    .bind(task_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    debug!(task_id, "quota cancelled, balance restored");
    Ok(())
  }

  async fn get_quota(&self, account_id: &str) -> Result<QuotaAccount, QuotaError> {
    self
      .fetch_account(account_id)
      .await?
      .ok_or_else(|| QuotaError::NotMember {
        account_id: account_id.to_string(),
      })
  }

  async fn check_quota(&self, account_id: &str, amount: i64) -> Result<(), QuotaError> {
    let account = self
      .fetch_account(account_id)
      .await?
      .filter(|a| a.active)
      .ok_or_else(|| QuotaError::NotMember {
        account_id: account_id.to_string(),
      })?;

    if account.balance < amount {
      return Err(QuotaError::Insufficient {
        remaining: account.balance,
        requested: amount,
      });
    }
    Ok(())
  }

  async fn get_transaction(&self, task_id: &str) -> Result<Option<QuotaTransaction>, QuotaError> {
    let txn = sqlx::query_as::<_, QuotaTransaction>(
      "SELECT * FROM quota_transactions WHERE task_id = ?1",
    )
    .bind(task_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(txn)
  }

  async fn list_reserved(&self) -> Result<Vec<QuotaTransaction>, QuotaError> {
    let reserved = sqlx::query_as::<_, QuotaTransaction>(
      "SELECT * FROM quota_transactions WHERE phase = ?1 ORDER BY created_at",
    )
    .bind(QuotaPhase::Reserved)
    .fetch_all(&self.pool)
    .await?;
    Ok(reserved)
  }

  async fn upsert_account(
    &self,
    account_id: &str,
    balance: i64,
    active: bool,
  ) -> Result<(), QuotaError> {
    sqlx::query(
      "INSERT INTO quota_accounts (account_id, balance, active) VALUES (?1, ?2, ?3)
       ON CONFLICT (account_id) DO UPDATE SET balance = excluded.balance, active = excluded.active",
    )
    .bind(account_id)
    .bind(balance)
    .bind(active)
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}
