use std::collections::HashSet;

use super::{Edge, Entity, Node};

/// Distinct edge endpoints in first-seen order (`from` before `to`), stats empty.
///
/// With a non-empty namespace filter only endpoints in that namespace are emitted.
pub fn derive_nodes(edges: &[Edge], namespace: Option<&str>) -> Vec<Node> {
    let filter = namespace.filter(|ns| !ns.is_empty());
    let mut seen: HashSet<Entity> = HashSet::with_capacity(edges.len());
    let mut nodes = Vec::with_capacity(edges.len());

    for edge in edges {
        for entity in [edge.from_entity(), edge.to_entity()] {
            if filter.is_some_and(|ns| ns != entity.namespace) {
                continue;
            }
            if seen.insert(entity.clone()) {
                nodes.push(Node::new(entity));
            }
        }
    }

    nodes
}
