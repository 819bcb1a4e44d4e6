//! Lantana Engine
//!
//! The pipeline execution engine. Given a `pending` task and the feature it
//! was triggered for, the engine:
//!
//! 1. Loads the feature's locked pipeline (missing/empty is fatal, no retry)
//! 2. Moves the task to `processing` and bulk-creates its step rows
//! 3. Executes each step in order through the provider registry, racing the
//!    provider against the step timeout and retrying with a fixed delay
//! 4. On full success persists the last output and confirms the quota
//!    reservation; on any failure marks the task `failed` and cancels the
//!    reservation unconditionally
//!
//! Execution is fire-and-forget: nothing is returned to the caller, all
//! errors are converted into persisted Task/TaskStep state, and every
//! transition is written before control moves on so pollers observe
//! monotonically advancing state.

mod engine;
mod error;
mod reconcile;

pub use engine::PipelineEngine;
pub use error::EngineError;
pub use reconcile::reconcile_reservations;
