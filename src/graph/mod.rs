//! Service graph: correlation of traffic samples into edges, node derivation,
//! and assembly of the full response with stats.
//!
//! Everything here is rebuilt for every request and dropped once serialized.

mod assembler;
mod edges;
mod nodes;
mod sanitize;

pub use assembler::{
    assemble_within, build_graph, build_graph_within, CorrelationStrategy, FullCorrelation,
    GraphContext, GraphRequest, GraphSink, ProgressiveCorrelation, StrategyKind,
};
pub use edges::{attach_edge_stats, correlate_edges, correlate_edges_with_stats};
pub use nodes::derive_nodes;
pub use sanitize::ensure_no_nan;

use serde::{Deserialize, Serialize};

use crate::stats::Stats;

/// A versioned application instance group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    pub namespace: String,
    pub app: String,
    pub version: String,
}

impl Entity {
    pub fn new(namespace: &str, app: &str, version: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            app: app.to_string(),
            version: version.to_string(),
        }
    }
}

/// A graph vertex: one entity and its inbound stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub app: String,
    pub version: String,
    pub namespace: String,
    pub stats: Stats,
}

impl Node {
    pub fn new(entity: Entity) -> Self {
        Self {
            app: entity.app,
            version: entity.version,
            namespace: entity.namespace,
            stats: Stats::new(),
        }
    }

    pub fn entity(&self) -> Entity {
        Entity::new(&self.namespace, &self.app, &self.version)
    }
}

/// Observed traffic from `from` to `to`, with the source's outbound stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub from_namespace: String,
    pub from_app: String,
    pub from_version: String,
    pub to_namespace: String,
    pub to_app: String,
    pub to_version: String,
    pub stats: Stats,
}

impl Edge {
    pub fn new(from: Entity, to: Entity) -> Self {
        Self {
            from_namespace: from.namespace,
            from_app: from.app,
            from_version: from.version,
            to_namespace: to.namespace,
            to_app: to.app,
            to_version: to.version,
            stats: Stats::new(),
        }
    }

    pub fn from_entity(&self) -> Entity {
        Entity::new(&self.from_namespace, &self.from_app, &self.from_version)
    }

    pub fn to_entity(&self) -> Entity {
        Entity::new(&self.to_namespace, &self.to_app, &self.to_version)
    }
}

/// Whether every node and edge carries its own stats yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integrity {
    Full,
    Partial,
}

/// Body of `GET /api/v0/namespace/{namespace}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphResponse {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub integrity: Integrity,
}

impl GraphResponse {
    pub fn full(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            nodes,
            edges,
            integrity: Integrity::Full,
        }
    }

    pub fn partial(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            nodes,
            edges,
            integrity: Integrity::Partial,
        }
    }
}
