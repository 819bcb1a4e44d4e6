//! Cycle detection over the edge-induced graph.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::node::{EdgeDef, NodeDef};

/// Result of a cycle check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleCheck {
  /// True when every node made it into the topological order.
  pub is_dag: bool,
  /// A topological order of the acyclic portion of the graph.
  pub topological_order: Vec<String>,
  /// Nodes on or downstream of a cycle. Empty iff `is_dag`.
  pub remaining_nodes: Vec<String>,
}

/// Detect cycles via Kahn's algorithm.
///
/// Builds adjacency and in-degree maps over the known nodes (edges that
/// reference unknown ids are dropped; the validator reports them as
/// warnings), then repeatedly removes zero-in-degree nodes into a topological
/// order. Any node left out of the order lies on or downstream of a cycle.
///
/// Node order in the input slice is used as the tie-break, so the result is
/// deterministic for a given definition.
pub fn detect_cycles(nodes: &[NodeDef], edges: &[EdgeDef]) -> CycleCheck {
  let known: HashSet<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();

  let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
  let mut in_degree: HashMap<&str, usize> = HashMap::new();
  for node in nodes {
    adjacency.entry(node.node_id.as_str()).or_default();
    in_degree.entry(node.node_id.as_str()).or_insert(0);
  }

  for edge in edges {
    if !known.contains(edge.source.as_str()) || !known.contains(edge.target.as_str()) {
      continue;
    }
    adjacency
      .entry(edge.source.as_str())
      .or_default()
      .push(edge.target.as_str());
    *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
  }

  let mut queue: VecDeque<&str> = nodes
    .iter()
    .map(|n| n.node_id.as_str())
    .filter(|id| in_degree.get(id).copied().unwrap_or(0) == 0)
    .collect();

  let mut order = Vec::with_capacity(nodes.len());
  while let Some(id) = queue.pop_front() {
    order.push(id.to_string());

    if let Some(downstream) = adjacency.get(id) {
      for &next in downstream {
        if let Some(deg) = in_degree.get_mut(next) {
          *deg = deg.saturating_sub(1);
          if *deg == 0 {
            queue.push_back(next);
          }
        }
      }
    }
  }

  let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
  let remaining: Vec<String> = nodes
    .iter()
    .map(|n| n.node_id.clone())
    .filter(|id| !ordered.contains(id.as_str()))
    .collect();

  CycleCheck {
    is_dag: remaining.is_empty(),
    topological_order: order,
    remaining_nodes: remaining,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::node::NodeKind;

  fn node(id: &str) -> NodeDef {
    NodeDef::new(id, NodeKind::Step)
  }

  fn edge(from: &str, to: &str) -> EdgeDef {
    EdgeDef::new(from, to)
  }

  #[test]
  fn empty_graph_is_a_dag() {
    let check = detect_cycles(&[], &[]);
    assert!(check.is_dag);
    assert!(check.topological_order.is_empty());
    assert!(check.remaining_nodes.is_empty());
  }

  #[test]
  fn linear_chain_sorts_in_order() {
    let nodes = vec![node("a"), node("b"), node("c")];
    let edges = vec![edge("a", "b"), edge("b", "c")];

    let check = detect_cycles(&nodes, &edges);
    assert!(check.is_dag);
    assert_eq!(check.topological_order, vec!["a", "b", "c"]);
  }

  #[test]
  fn two_node_cycle_is_reported() {
    let nodes = vec![node("a"), node("b")];
    let edges = vec![edge("a", "b"), edge("b", "a")];

    let check = detect_cycles(&nodes, &edges);
    assert!(!check.is_dag);
    assert_eq!(check.remaining_nodes, vec!["a", "b"]);
  }

  #[test]
  fn remaining_nodes_include_everything_downstream_of_the_cycle() {
    // a -> b -> c -> b (cycle), c -> d. Only a escapes.
    let nodes = vec![node("a"), node("b"), node("c"), node("d")];
    let edges = vec![edge("a", "b"), edge("b", "c"), edge("c", "b"), edge("c", "d")];

    let check = detect_cycles(&nodes, &edges);
    assert!(!check.is_dag);
    assert_eq!(check.topological_order, vec!["a"]);
    assert_eq!(check.remaining_nodes, vec!["b", "c", "d"]);
  }

  #[test]
  fn edges_to_unknown_nodes_are_dropped() {
    let nodes = vec![node("a"), node("b")];
    let edges = vec![edge("a", "b"), edge("b", "ghost"), edge("ghost", "a")];

    let check = detect_cycles(&nodes, &edges);
    assert!(check.is_dag);
    assert_eq!(check.topological_order, vec!["a", "b"]);
  }

  #[test]
  fn order_is_deterministic_for_independent_roots() {
    let nodes = vec![node("b"), node("a"), node("c")];
    let edges = vec![edge("b", "c"), edge("a", "c")];

    let first = detect_cycles(&nodes, &edges);
    let second = detect_cycles(&nodes, &edges);
    assert_eq!(first.topological_order, vec!["b", "a", "c"]);
    assert_eq!(first.topological_order, second.topological_order);
  }
}
