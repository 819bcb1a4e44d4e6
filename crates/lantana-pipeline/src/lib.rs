//! Lantana Pipeline
//!
//! This crate provides the "locked" pipeline representation for Lantana. A
//! locked pipeline is the validated, linearized form of an authored workflow
//! graph, ready for execution:
//!
//! - The graph has been validated (see `lantana-graph`)
//! - Branches are collapsed to a single path (first outgoing edge wins)
//! - Every step carries concrete timeout and retry values
//!
//! Pipelines are immutable once stored and are owned by a feature definition;
//! the [`FeatureCatalog`] trait is the read-only lookup boundary the engine
//! consumes.

mod error;
mod feature;
mod linearize;
mod step;

pub use error::LinearizeError;
pub use feature::{CatalogError, Feature, FeatureCatalog, MemoryCatalog};
pub use linearize::linearize;
pub use step::{DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_MS, Pipeline, RetryPolicy, Step};
