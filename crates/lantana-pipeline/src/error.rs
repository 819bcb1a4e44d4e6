use thiserror::Error;

/// Errors raised while deriving a linear pipeline from a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinearizeError {
  #[error("graph has no start node")]
  MissingStart,

  #[error("step node '{node_id}' has no provider type")]
  MissingProvider { node_id: String },

  #[error("edge points to unknown node '{node_id}'")]
  UnknownNode { node_id: String },

  #[error("walk revisited node '{node_id}'; graph is not acyclic")]
  Revisited { node_id: String },
}
