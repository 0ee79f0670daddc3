//! Structural checks over a pipe graph.

use super::{Edge, PipeId, PipeNode};
use crate::errors::CycleDetectedError;
use std::collections::{HashMap, HashSet};

/// Depth-first topological sort; inputs come before their consumers.
///
/// Nodes are visited in creation order so the result is stable.
pub fn topological_order(
    nodes: &[PipeNode],
    edges: &[Edge],
) -> Result<Vec<PipeId>, CycleDetectedError> {
    let mut upstream: HashMap<PipeId, Vec<PipeId>> = HashMap::new();
    for edge in edges {
        upstream.entry(edge.to).or_default().push(edge.from);
    }

    fn visit(
        node: PipeId,
        upstream: &HashMap<PipeId, Vec<PipeId>>,
        visited: &mut HashSet<PipeId>,
        path: &mut Vec<PipeId>,
        order: &mut Vec<PipeId>,
    ) -> Result<(), Vec<PipeId>> {
        if let Some(start) = path.iter().position(|p| *p == node) {
            let mut cycle = path[start..].to_vec();
            cycle.push(node);
            return Err(cycle);
        }
        if visited.contains(&node) {
            return Ok(());
        }
        path.push(node);
        for input in upstream.get(&node).map(Vec::as_slice).unwrap_or_default() {
            visit(*input, upstream, visited, path, order)?;
        }
        path.pop();
        visited.insert(node);
        order.push(node);
        Ok(())
    }

    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(nodes.len());
    let mut path = Vec::new();
    for node in nodes {
        visit(node.id, &upstream, &mut visited, &mut path, &mut order).map_err(|cycle| {
            CycleDetectedError::new(cycle.iter().map(ToString::to_string).collect())
        })?;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::super::{PipeGraph, PipeKind};
    use super::*;
    use crate::fields::FieldSet;

    fn graph_of(width: usize) -> PipeGraph {
        let mut graph = PipeGraph::new("g");
        let mut prev = Vec::new();
        for _ in 0..width {
            let id = graph.add(
                "s",
                PipeKind::Head { source: None },
                prev.clone(),
                FieldSet::empty(),
                None,
            );
            prev = vec![id];
        }
        graph
    }

    #[test]
    fn test_order_respects_inputs() {
        let graph = graph_of(3);
        let order = graph.topological_order().unwrap();
        assert_eq!(order.iter().map(|p| p.index()).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_cycle_reported_with_path() {
        let graph = graph_of(2);
        let mut edges = graph.edges().to_vec();
        edges.push(Edge {
            from: graph.nodes()[1].id,
            to: graph.nodes()[0].id,
            fields: FieldSet::empty(),
        });
        let err = topological_order(graph.nodes(), &edges).unwrap_err();
        assert_eq!(err.cycle_path.first(), err.cycle_path.last());
        assert!(err.cycle_path.len() >= 3);
    }
}
