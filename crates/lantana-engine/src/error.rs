use thiserror::Error;

/// Errors that terminate a pipeline execution.
///
/// These never escape to the fire-and-forget caller; the engine converts them
/// into persisted task state. The variants separate fatal configuration
/// conditions (no retry) from step failures that already exhausted their
/// retry budget.
#[derive(Debug, Error)]
pub enum EngineError {
  /// The feature or its pipeline is unusable. Fatal, never retried.
  #[error("configuration error: {message}")]
  Config { message: String },

  /// No provider is registered for a step's type. Fatal, never retried.
  #[error("no provider registered for step type '{step_type}'")]
  ProviderMissing { step_type: String },

  /// A step failed after exhausting its retry budget.
  #[error("step {step_index} failed: {message}")]
  StepFailed { step_index: usize, message: String },

  #[error(transparent)]
  Storage(#[from] lantana_store::Error),

  #[error(transparent)]
  Quota(#[from] lantana_quota::QuotaError),
}

impl EngineError {
  pub fn config(message: impl Into<String>) -> Self {
    Self::Config {
      message: message.into(),
    }
  }
}
