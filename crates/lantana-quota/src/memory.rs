//! In-memory quota coordinator for tests and development.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::QuotaError;
use crate::types::{QuotaAccount, QuotaPhase, QuotaTransaction};
use crate::QuotaCoordinator;

#[derive(Debug, Default)]
struct Ledger {
  accounts: HashMap<String, QuotaAccount>,
  transactions: HashMap<String, QuotaTransaction>,
}

fn poison_err<T>(_: PoisonError<T>) -> QuotaError {
  QuotaError::Storage("quota ledger lock poisoned".into())
}

/// Thread-safe in-memory coordinator. One mutex guards the whole ledger and
/// stands in for the per-account row lock: it is held only for the duration
/// of each operation, never across provider work.
#[derive(Debug, Default)]
pub struct MemoryQuota {
  ledger: Mutex<Ledger>,
}

impl MemoryQuota {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Ledger>, QuotaError> {
    self.ledger.lock().map_err(poison_err)
  }
}

#[async_trait]
impl QuotaCoordinator for MemoryQuota {
  async fn reserve(
    &self,
    account_id: &str,
    task_id: &str,
    amount: i64,
  ) -> Result<QuotaTransaction, QuotaError> {
    let mut ledger = self.lock()?;

    if ledger.transactions.contains_key(task_id) {
      return Err(QuotaError::DuplicateReservation {
        task_id: task_id.to_string(),
      });
    }

    let account = ledger
      .accounts
      .get_mut(account_id)
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

    account.balance -= amount;
    let txn = QuotaTransaction::reserved(task_id, account_id, amount);
    ledger.transactions.insert(task_id.to_string(), txn.clone());

    debug!(account_id, task_id, amount, "quota reserved");
    Ok(txn)
  }

  async fn confirm(&self, task_id: &str) -> Result<(), QuotaError> {
    let mut ledger = self.lock()?;

    if let Some(txn) = ledger.transactions.get_mut(task_id) {
      if txn.phase == QuotaPhase::Reserved {
        txn.phase = QuotaPhase::Confirmed;
        txn.updated_at = Utc::now();
        debug!(task_id, "quota confirmed");
      }
    }
    Ok(())
  }

  async fn cancel(&self, task_id: &str) -> Result<(), QuotaError> {
    let mut ledger = self.lock()?;

    let Some(txn) = ledger.transactions.get(task_id) else {
      return Ok(());
    };
    if txn.phase != QuotaPhase::Reserved {
      return Ok(());
    }

    let (account_id, amount) = (txn.account_id.clone(), txn.amount);
    let account = ledger
      .accounts
      .get_mut(&account_id)
      .ok_or_else(|| QuotaError::Storage(format!("account '{account_id}' missing from ledger")))?;
    account.balance += amount;

    let txn = ledger
      .transactions
      .get_mut(task_id)
      .ok_or_else(|| QuotaError::Storage("transaction vanished during cancel".into()))?;
    txn.phase = QuotaPhase::Cancelled;
    txn.updated_at = Utc::now();

    debug!(task_id, amount, "quota cancelled, balance restored");
    Ok(())
  }

  async fn get_quota(&self, account_id: &str) -> Result<QuotaAccount, QuotaError> {
    let ledger = self.lock()?;
    ledger
      .accounts
      .get(account_id)
      .cloned()
      .ok_or_else(|| QuotaError::NotMember {
        account_id: account_id.to_string(),
      })
  }

  async fn check_quota(&self, account_id: &str, amount: i64) -> Result<(), QuotaError> {
    let ledger = self.lock()?;
    let account = ledger
      .accounts
      .get(account_id)
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
    let ledger = self.lock()?;
    Ok(ledger.transactions.get(task_id).cloned())
  }

  async fn list_reserved(&self) -> Result<Vec<QuotaTransaction>, QuotaError> {
    let ledger = self.lock()?;
    let mut reserved: Vec<QuotaTransaction> = ledger
      .transactions
      .values()
      .filter(|t| t.phase == QuotaPhase::Reserved)
      .cloned()
      .collect();
    reserved.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(reserved)
  }

  async fn upsert_account(
    &self,
    account_id: &str,
    balance: i64,
    active: bool,
  ) -> Result<(), QuotaError> {
    let mut ledger = self.lock()?;
    ledger.accounts.insert(
      account_id.to_string(),
      QuotaAccount {
        account_id: account_id.to_string(),
        balance,
        active,
      },
    );
    Ok(())
  }
}
