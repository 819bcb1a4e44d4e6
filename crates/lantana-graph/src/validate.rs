//! Topology validation for authored workflow graphs.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;

use crate::cycles::detect_cycles;
use crate::node::{EdgeDef, NodeDef, NodeKind};
use crate::template::{path_root, template_refs};

/// A hard validation error. Any error makes the graph non-executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum TopologyError {
  #[error("workflow has no nodes")]
  Empty,

  #[error("workflow must have exactly one start node, found {count}")]
  StartCount { count: usize },

  #[error("start node '{node_id}' must not have incoming edges")]
  StartHasIncoming { node_id: String },

  #[error("end node '{node_id}' must not have outgoing edges")]
  EndHasOutgoing { node_id: String },

  #[error("cycle detected involving nodes: {}", .node_ids.join(", "))]
  Cycle { node_ids: Vec<String> },

  #[error("node '{node_id}' has {actual} incoming edges, expected between {min} and {max}")]
  InDegree {
    node_id: String,
    actual: usize,
    min: usize,
    max: usize,
  },

  #[error("node '{node_id}' has {actual} outgoing edges, expected between {min} and {max}")]
  OutDegree {
    node_id: String,
    actual: usize,
    min: usize,
    max: usize,
  },

  #[error("node '{node_id}' references '{{{{{path}}}}}' but no upstream node produces '{root}'")]
  UnresolvedReference {
    node_id: String,
    path: String,
    root: String,
  },
}

/// A non-blocking finding. Warnings never affect validity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyWarning {
  NoEndNode,

  UnknownEdge { source: String, target: String },

  IsolatedNodes { node_ids: Vec<String> },
}

// Manual Display/Error impl: this enum has a field literally named `source`,
// which `#[derive(thiserror::Error)]` unconditionally treats as the error
// source (requiring it to impl `std::error::Error`). The field is a plain
// `String` node id, so the derive cannot be used; this reproduces the same
// messages by hand.
impl std::fmt::Display for TopologyWarning {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TopologyWarning::NoEndNode => write!(f, "workflow has no end node"),
      TopologyWarning::UnknownEdge { source, target } => write!(
        f,
        "edge references unknown node and was ignored: {source} -> {target}"
      ),
      TopologyWarning::IsolatedNodes { node_ids } => {
        write!(f, "nodes not connected to any edge: {}", node_ids.join(", "))
      }
    }
  }
}

impl std::error::Error for TopologyWarning {}

/// The full validation result for one graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyReport {
  /// True iff `errors` is empty.
  pub valid: bool,
  pub errors: Vec<TopologyError>,
  pub warnings: Vec<TopologyWarning>,
}

/// Validate a workflow graph's topology.
///
/// Pure and deterministic: collects every error and warning instead of
/// stopping at the first, so the authoring surface can show all problems in
/// one pass. Checks, in order: structure (node count, start/end rules), cycle
/// freedom, per-node degree bounds, isolated nodes, and backward
/// reachability of every `{{path}}` reference in node input templates.
pub fn validate_topology(nodes: &[NodeDef], edges: &[EdgeDef]) -> TopologyReport {
  let mut errors = Vec::new();
  let mut warnings = Vec::new();

  if nodes.is_empty() {
    return TopologyReport {
      valid: false,
      errors: vec![TopologyError::Empty],
      warnings,
    };
  }

  let known: HashSet<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
  let usable: Vec<&EdgeDef> = edges
    .iter()
    .filter(|e| {
      let ok = known.contains(e.source.as_str()) && known.contains(e.target.as_str());
      if !ok {
        warnings.push(TopologyWarning::UnknownEdge {
          source: e.source.clone(),
          target: e.target.clone(),
        });
      }
      ok
    })
    .collect();

  let start_count = nodes.iter().filter(|n| n.kind == NodeKind::Start).count();
  if start_count != 1 {
    errors.push(TopologyError::StartCount { count: start_count });
  }
  if !nodes.iter().any(|n| n.kind == NodeKind::End) {
    warnings.push(TopologyWarning::NoEndNode);
  }

  let check = detect_cycles(nodes, edges);
  if !check.is_dag {
    errors.push(TopologyError::Cycle {
      node_ids: check.remaining_nodes,
    });
  }

  check_degrees(nodes, &usable, &mut errors);
  check_isolated(nodes, &usable, &mut warnings);
  check_references(nodes, &usable, &mut errors);

  TopologyReport {
    valid: errors.is_empty(),
    errors,
    warnings,
  }
}

fn check_degrees(nodes: &[NodeDef], edges: &[&EdgeDef], errors: &mut Vec<TopologyError>) {
  let mut incoming: HashMap<&str, usize> = HashMap::new();
  let mut outgoing: HashMap<&str, usize> = HashMap::new();
  for edge in edges {
    *outgoing.entry(edge.source.as_str()).or_insert(0) += 1;
    *incoming.entry(edge.target.as_str()).or_insert(0) += 1;
  }

  for node in nodes {
    let ins = incoming.get(node.node_id.as_str()).copied().unwrap_or(0);
    let outs = outgoing.get(node.node_id.as_str()).copied().unwrap_or(0);

    match node.kind {
      NodeKind::Start => {
        if ins > 0 {
          errors.push(TopologyError::StartHasIncoming {
            node_id: node.node_id.clone(),
          });
        }
      }
      NodeKind::End => {
        if outs > 0 {
          errors.push(TopologyError::EndHasOutgoing {
            node_id: node.node_id.clone(),
          });
        }
      }
      NodeKind::Step => {
        let bounds = node.bounds();
        if ins < bounds.min_in || ins > bounds.max_in {
          errors.push(TopologyError::InDegree {
            node_id: node.node_id.clone(),
            actual: ins,
            min: bounds.min_in,
            max: bounds.max_in,
          });
        }
        if outs < bounds.min_out || outs > bounds.max_out {
          errors.push(TopologyError::OutDegree {
            node_id: node.node_id.clone(),
            actual: outs,
            min: bounds.min_out,
            max: bounds.max_out,
          });
        }
      }
    }
  }
}

fn check_isolated(nodes: &[NodeDef], edges: &[&EdgeDef], warnings: &mut Vec<TopologyWarning>) {
  let mut touched: HashSet<&str> = HashSet::new();
  for edge in edges {
    touched.insert(edge.source.as_str());
    touched.insert(edge.target.as_str());
  }

  let isolated: Vec<String> = nodes
    .iter()
    .filter(|n| !touched.contains(n.node_id.as_str()))
    .map(|n| n.node_id.clone())
    .collect();

  if !isolated.is_empty() {
    warnings.push(TopologyWarning::IsolatedNodes { node_ids: isolated });
  }
}

/// Validate that every `{{path}}` reference resolves to a backward-reachable
/// root: `system` is always available, `form` flows from a reachable start
/// node, and each upstream node exposes its `output_key`.
fn check_references(nodes: &[NodeDef], edges: &[&EdgeDef], errors: &mut Vec<TopologyError>) {
  let by_id: HashMap<&str, &NodeDef> = nodes.iter().map(|n| (n.node_id.as_str(), n)).collect();

  let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
  for edge in edges {
    reverse
      .entry(edge.target.as_str())
      .or_default()
      .push(edge.source.as_str());
  }

  for node in nodes {
    if node.kind == NodeKind::End || node.inputs.is_empty() {
      continue;
    }

    let roots = reachable_roots(node, &by_id, &reverse);

    let mut paths: Vec<&String> = node.inputs.values().collect();
    paths.sort();
    for template in paths {
      for path in template_refs(template) {
        let root = path_root(&path).to_string();
        if !roots.contains(root.as_str()) {
          errors.push(TopologyError::UnresolvedReference {
            node_id: node.node_id.clone(),
            path,
            root,
          });
        }
      }
    }
  }
}

/// Reverse DFS from `node` over incoming edges, collecting the root names its
/// templates may reference. Iterative with an explicit visited set, so deep
/// graphs cannot overflow the stack.
fn reachable_roots<'a>(
  node: &'a NodeDef,
  by_id: &HashMap<&'a str, &'a NodeDef>,
  reverse: &HashMap<&'a str, Vec<&'a str>>,
) -> HashSet<&'a str> {
  let mut roots: HashSet<&str> = HashSet::new();
  roots.insert("system");

  let mut visited: HashSet<&str> = HashSet::new();
  let mut stack: Vec<&str> = vec![node.node_id.as_str()];

  while let Some(current) = stack.pop() {
    if !visited.insert(current) {
      continue;
    }

    if let Some(def) = by_id.get(current) {
      if def.kind == NodeKind::Start {
        roots.insert("form");
      }
      if current != node.node_id {
        if let Some(key) = def.output_key.as_deref() {
          roots.insert(key);
        }
      }
    }

    if let Some(upstream) = reverse.get(current) {
      for &up in upstream {
        if !visited.contains(up) {
          stack.push(up);
        }
      }
    }
  }

  roots
}
