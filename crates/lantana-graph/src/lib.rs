//! Lantana Graph
//!
//! This crate contains the serializable workflow graph types for Lantana and
//! the authoring-time topology validator. A graph definition is what an author
//! submits from the builder UI; it is validated here before a linear pipeline
//! is derived from it.
//!
//! Validation is pure and synchronous: it never touches I/O and reports every
//! problem at once as structured error/warning lists, so the authoring surface
//! can highlight all of them in a single round trip.

mod cycles;
mod node;
mod template;
mod validate;

pub use cycles::{CycleCheck, detect_cycles};
pub use node::{DegreeBounds, EdgeDef, GraphDef, NodeDef, NodeKind};
pub use template::template_refs;
pub use validate::{TopologyError, TopologyReport, TopologyWarning, validate_topology};
