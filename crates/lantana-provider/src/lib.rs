//! Lantana Provider
//!
//! The pluggable capability boundary for pipeline steps. A [`Provider`]
//! performs the actual work for one step type; the engine only sees the
//! `execute` contract. The [`ProviderRegistry`] maps a step type to its
//! provider: it is populated once at startup and read-only afterwards, so it
//! needs no interior synchronization and is passed around as a plain
//! constructor-injected `Arc`.

mod error;
mod registry;

pub use error::ProviderError;
pub use registry::ProviderRegistry;

use async_trait::async_trait;
use serde_json::Value;

/// Execution context handed to a provider alongside the step input.
#[derive(Debug, Clone)]
pub struct ProviderContext {
  /// The task this step belongs to.
  pub task_id: String,
  /// Zero-based index of the step within the pipeline.
  pub step_index: usize,
  /// Provider instance/credential reference from the step definition.
  pub provider_ref: String,
}

/// A pluggable external capability performing the work for one step type.
#[async_trait]
pub trait Provider: Send + Sync {
  /// Execute one step. The returned value becomes the next step's input.
  async fn execute(&self, input: Value, ctx: &ProviderContext) -> Result<Value, ProviderError>;
}
