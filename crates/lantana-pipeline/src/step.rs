use serde::{Deserialize, Serialize};

/// Default per-step timeout when a node does not override it.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default fixed delay between retry attempts.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Retry policy for one step: fixed-delay, non-exponential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
  /// Additional attempts after the first. A step runs at most
  /// `max_retries + 1` times.
  pub max_retries: u32,
  /// Sleep between attempts, in milliseconds.
  pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 0,
      retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
    }
  }
}

/// One unit of work in a locked pipeline, delegated to a provider by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
  /// Provider type this step is dispatched to (registry key).
  pub step_type: String,
  /// Reference the provider may use to select credentials/configuration.
  pub provider_ref: String,
  pub timeout_ms: u64,
  pub retry: RetryPolicy,
}

/// An ordered, immutable list of steps derived from a validated graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
  pub steps: Vec<Step>,
}

impl Pipeline {
  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }
}
