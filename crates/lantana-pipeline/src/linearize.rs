//! Derivation of a linear pipeline from a validated graph.

use std::collections::HashSet;

use lantana_graph::{GraphDef, NodeKind};
use tracing::warn;

use crate::error::LinearizeError;
use crate::step::{DEFAULT_TIMEOUT_MS, Pipeline, RetryPolicy, Step};

/// Walk the graph from its `start` node and produce the ordered step list.
///
/// At a branch point the first outgoing edge (in authored edge order) is
/// taken and a warning is logged; the engine deliberately never executes true
/// branches, so the data model may carry them but execution is a single path.
/// `start` and `end` nodes contribute no steps. The walk stops at a node with
/// no outgoing edges.
///
/// Call this on a graph that already passed [`lantana_graph::validate_topology`];
/// the errors here only guard against walking an unvalidated definition.
pub fn linearize(graph: &GraphDef) -> Result<Pipeline, LinearizeError> {
  let start = graph
    .nodes
    .iter()
    .find(|n| n.kind == NodeKind::Start)
    .ok_or(LinearizeError::MissingStart)?;

  let mut steps = Vec::new();
  let mut visited: HashSet<&str> = HashSet::new();
  let mut current = start.node_id.as_str();

  loop {
    if !visited.insert(current) {
      return Err(LinearizeError::Revisited {
        node_id: current.to_string(),
      });
    }

    let node = graph
      .get_node(current)
      .ok_or_else(|| LinearizeError::UnknownNode {
        node_id: current.to_string(),
      })?;

    match node.kind {
      NodeKind::Start => {}
      NodeKind::End => break,
      NodeKind::Step => {
        let step_type =
          node
            .provider_type
            .clone()
            .ok_or_else(|| LinearizeError::MissingProvider {
              node_id: node.node_id.clone(),
            })?;

        steps.push(Step {
          provider_ref: node.provider_ref.clone().unwrap_or_else(|| step_type.clone()),
          step_type,
          timeout_ms: node.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
          retry: RetryPolicy {
            max_retries: node.max_retries.unwrap_or_default(),
            retry_delay_ms: node
              .retry_delay_ms
              .unwrap_or(crate::step::DEFAULT_RETRY_DELAY_MS),
          },
        });
      }
    }

    let mut outgoing = graph
      .edges
      .iter()
      .filter(|e| e.source == node.node_id)
      .map(|e| e.target.as_str());

    let Some(next) = outgoing.next() else {
      break;
    };

    let skipped = outgoing.count();
    if skipped > 0 {
      warn!(
        node_id = %node.node_id,
        skipped,
        "node has multiple outgoing edges; taking the first"
      );
    }

    current = next;
  }

  Ok(Pipeline { steps })
}
