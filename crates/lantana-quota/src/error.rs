use thiserror::Error;

/// Errors raised by the quota coordinator.
///
/// `NotMember` and `Insufficient` are resource errors surfaced synchronously
/// at `reserve`, before any pipeline work starts; callers map `code()` onto
/// their wire format.
#[derive(Debug, Error)]
pub enum QuotaError {
  #[error("account '{account_id}' has no active entitlement")]
  NotMember { account_id: String },

  #[error("insufficient quota: {remaining} remaining, {requested} requested")]
  Insufficient { remaining: i64, requested: i64 },

  #[error("task '{task_id}' already has a quota transaction")]
  DuplicateReservation { task_id: String },

  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("storage error: {0}")]
  Storage(String),
}

impl QuotaError {
  /// Stable machine-readable code for the surrounding API layer.
  pub fn code(&self) -> &'static str {
    match self {
      Self::NotMember { .. } => "NOT_MEMBER",
      Self::Insufficient { .. } => "QUOTA_INSUFFICIENT",
      Self::DuplicateReservation { .. } => "DUPLICATE_RESERVATION",
      Self::Database(_) | Self::Storage(_) => "STORAGE_ERROR",
    }
  }
}
