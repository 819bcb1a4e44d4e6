use thiserror::Error;

/// Errors a provider may raise while executing a step.
///
/// The engine treats every provider error as transient and retries within
/// the step's retry policy.
#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("{message}")]
  Execution { message: String },

  #[error("invalid input: {message}")]
  InvalidInput { message: String },
}

impl ProviderError {
  pub fn execution(message: impl Into<String>) -> Self {
    Self::Execution {
      message: message.into(),
    }
  }

  pub fn invalid_input(message: impl Into<String>) -> Self {
    Self::InvalidInput {
      message: message.into(),
    }
  }
}
