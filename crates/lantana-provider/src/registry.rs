use std::collections::HashMap;
use std::sync::Arc;

use crate::Provider;

/// Maps a step type to its provider.
///
/// Register every provider during startup, then share the registry behind an
/// `Arc`. Lookups after that point are lock-free reads.
#[derive(Default)]
pub struct ProviderRegistry {
  providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a provider for a step type. Re-registering a type replaces the
  /// previous provider.
  pub fn register(&mut self, step_type: impl Into<String>, provider: Arc<dyn Provider>) {
    self.providers.insert(step_type.into(), provider);
  }

  /// Look up the provider for a step type.
  pub fn get(&self, step_type: &str) -> Option<Arc<dyn Provider>> {
    self.providers.get(step_type).cloned()
  }

  /// Registered step types, for startup logging and diagnostics.
  pub fn types(&self) -> Vec<&str> {
    self.providers.keys().map(String::as_str).collect()
  }

  pub fn len(&self) -> usize {
    self.providers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.providers.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;
  use serde_json::{Value, json};

  use super::*;
  use crate::{ProviderContext, ProviderError};

  struct Echo;

  #[async_trait]
  impl Provider for Echo {
    async fn execute(&self, input: Value, _ctx: &ProviderContext) -> Result<Value, ProviderError> {
      Ok(input)
    }
  }

  #[tokio::test]
  async fn registered_provider_is_resolvable_and_executes() {
    let mut registry = ProviderRegistry::new();
    registry.register("echo", Arc::new(Echo));

    let provider = registry.get("echo").expect("provider registered");
    let ctx = ProviderContext {
      task_id: "t1".into(),
      step_index: 0,
      provider_ref: "echo".into(),
    };
    let out = provider.execute(json!({"x": 1}), &ctx).await.unwrap();
    assert_eq!(out, json!({"x": 1}));
  }

  #[test]
  fn unknown_type_resolves_to_none() {
    let registry = ProviderRegistry::new();
    assert!(registry.get("missing").is_none());
    assert!(registry.is_empty());
  }
}
