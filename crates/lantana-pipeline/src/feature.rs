//! Feature definitions and the pipeline lookup boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::step::Pipeline;

/// A feature owns one locked pipeline and the quota cost of triggering it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
  pub feature_id: String,
  pub name: String,
  pub pipeline: Pipeline,
  /// Units debited from the account's quota per task.
  pub quota_cost: i64,
}

/// Error type for catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
  #[error("catalog storage error: {0}")]
  Storage(String),
}

/// Read-only lookup from a feature id to its stored pipeline and cost.
///
/// This is the boundary to feature/pipeline storage; the engine only ever
/// reads through it.
#[async_trait]
pub trait FeatureCatalog: Send + Sync {
  async fn get(&self, feature_id: &str) -> Result<Option<Feature>, CatalogError>;
}

/// In-memory catalog, populated at startup.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
  features: HashMap<String, Feature>,
}

impl MemoryCatalog {
  pub fn new(features: impl IntoIterator<Item = Feature>) -> Self {
    Self {
      features: features
        .into_iter()
        .map(|f| (f.feature_id.clone(), f))
        .collect(),
    }
  }
}

#[async_trait]
impl FeatureCatalog for MemoryCatalog {
  async fn get(&self, feature_id: &str) -> Result<Option<Feature>, CatalogError> {
    Ok(self.features.get(feature_id).cloned())
  }
}
