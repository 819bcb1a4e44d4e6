use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The kind of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  /// The single entry point. Receives the triggering form data.
  Start,
  /// A terminal node. Nothing executes past it.
  End,
  /// A processing step dispatched to a provider.
  Step,
}

/// Degree bounds for a `step` node.
///
/// `start` and `end` nodes have fixed rules (no incoming / no outgoing edges
/// respectively) and ignore these bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegreeBounds {
  #[serde(default = "defaults::min_in")]
  pub min_in: usize,
  #[serde(default = "defaults::max_in")]
  pub max_in: usize,
  #[serde(default = "defaults::min_out")]
  pub min_out: usize,
  #[serde(default = "defaults::max_out")]
  pub max_out: usize,
}

impl Default for DegreeBounds {
  fn default() -> Self {
    Self {
      min_in: defaults::min_in(),
      max_in: defaults::max_in(),
      min_out: defaults::min_out(),
      max_out: defaults::max_out(),
    }
  }
}

mod defaults {
  pub(super) fn min_in() -> usize {
    0
  }
  pub(super) fn max_in() -> usize {
    5
  }
  pub(super) fn min_out() -> usize {
    1
  }
  pub(super) fn max_out() -> usize {
    5
  }
}

/// A node as authored in the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub node_id: String,
  #[serde(rename = "type")]
  pub kind: NodeKind,
  /// Provider capability type this step is dispatched to. Required for
  /// `step` nodes; the registry key at execution time.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub provider_type: Option<String>,
  /// Specific provider instance/credential reference. Defaults to the
  /// capability type when omitted.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub provider_ref: Option<String>,
  /// Input mapping templates. Values may reference upstream data with
  /// `{{path}}` expressions.
  #[serde(default)]
  pub inputs: HashMap<String, String>,
  /// Name under which this node's output is visible to downstream templates.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output_key: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_retries: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retry_delay_ms: Option<u64>,
  /// Per-node degree bounds. Defaults: out in [1,5], in in [0,5].
  #[serde(skip_serializing_if = "Option::is_none")]
  pub degree: Option<DegreeBounds>,
}

impl NodeDef {
  /// Create a node of the given kind with no inputs or overrides.
  pub fn new(node_id: impl Into<String>, kind: NodeKind) -> Self {
    Self {
      node_id: node_id.into(),
      kind,
      provider_type: None,
      provider_ref: None,
      inputs: HashMap::new(),
      output_key: None,
      timeout_ms: None,
      max_retries: None,
      retry_delay_ms: None,
      degree: None,
    }
  }

  /// Effective degree bounds for this node.
  pub fn bounds(&self) -> DegreeBounds {
    self.degree.unwrap_or_default()
  }
}

/// A directed edge between two nodes, identified by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDef {
  pub source: String,
  pub target: String,
}

impl EdgeDef {
  pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      source: source.into(),
      target: target.into(),
    }
  }
}

/// A workflow graph as authored: nodes and edges, identity by id, no array
/// ordering guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDef {
  pub nodes: Vec<NodeDef>,
  pub edges: Vec<EdgeDef>,
}

impl GraphDef {
  /// Validate this graph's topology. See [`crate::validate_topology`].
  pub fn validate(&self) -> crate::TopologyReport {
    crate::validate_topology(&self.nodes, &self.edges)
  }

  /// Get a node by id.
  pub fn get_node(&self, node_id: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.node_id == node_id)
  }
}
