//! Joins inbound and outbound identity samples into directed edges.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Edge, Entity};
use crate::error::Result;
use crate::prom::{Labels, QueryClient, Sample};
use crate::stats::{self, Direction};

/// Caller namespace from a mesh TLS identity (`<id>.<namespace>.<sa>.<domain...>`).
fn client_namespace(client_id: &str) -> Option<&str> {
    client_id.split('.').nth(1)
}

fn join_key(resource: &str, namespace: &str) -> String {
    format!("{}.{}", resource, namespace)
}

fn label<'a>(labels: &'a Labels, name: &str) -> &'a str {
    labels.get(name).map(String::as_str).unwrap_or("")
}

fn in_scope(filter: Option<&str>, namespace: &str) -> bool {
    match filter {
        Some(ns) if !ns.is_empty() => ns == namespace,
        _ => true,
    }
}

/// Build the edge list without stats.
///
/// Inbound samples are indexed by `<resource>.<caller namespace>`, outbound samples
/// by `<dst_resource>.<namespace>`; an edge exists for every outbound sample whose
/// key has an inbound match. With a namespace filter, an edge is kept when either
/// endpoint lives in that namespace.
pub fn correlate_edges(
    inbound: &[Sample],
    outbound: &[Sample],
    namespace: Option<&str>,
    resource: &str,
) -> Vec<Edge> {
    let dst_resource = format!("dst_{}", resource);

    let mut dst_index: HashMap<String, &Labels> = HashMap::new();
    for sample in inbound {
        let client_id = sample.label("client_id");
        // without a client identity the caller cannot be attributed
        let Some(src_ns) = client_namespace(client_id) else {
            log::debug!("dropped metric: {:?}", sample.metric);
            continue;
        };
        let key = join_key(sample.label(resource), src_ns);
        dst_index.insert(key, &sample.metric);
    }

    // keys kept in first-seen order so output is deterministic
    let mut src_keys: Vec<String> = Vec::new();
    let mut src_index: HashMap<String, Vec<&Labels>> = HashMap::new();
    for sample in outbound {
        let key = join_key(sample.label(&dst_resource), sample.label("namespace"));
        let group = src_index.entry(key.clone()).or_default();
        if group.is_empty() {
            src_keys.push(key);
        }
        group.push(&sample.metric);
    }

    let mut edges = Vec::new();
    for key in &src_keys {
        let Some(dst) = dst_index.get(key) else {
            continue;
        };
        for src in &src_index[key] {
            let src_namespace = label(src, "namespace");
            let dst_namespace = label(dst, "namespace");
            if !in_scope(namespace, src_namespace) && !in_scope(namespace, dst_namespace) {
                continue;
            }

            edges.push(Edge::new(
                Entity::new(src_namespace, label(src, "app"), label(src, "version")),
                Entity::new(dst_namespace, label(dst, "app"), label(dst, "version")),
            ));
        }
    }

    edges
}

/// Attach each edge's source outbound stats, one basket per edge. Any failure aborts.
pub async fn attach_edge_stats(
    client: &Arc<dyn QueryClient>,
    edges: &mut [Edge],
    window: &str,
) -> Result<()> {
    for edge in edges.iter_mut() {
        edge.stats = stats::entity_stats(
            client,
            Direction::Outbound,
            &edge.from_app,
            &edge.from_version,
            window,
        )
        .await?;
    }
    Ok(())
}

/// `correlate_edges` followed by per-edge stats; no edges are returned on failure.
pub async fn correlate_edges_with_stats(
    client: &Arc<dyn QueryClient>,
    inbound: &[Sample],
    outbound: &[Sample],
    namespace: Option<&str>,
    resource: &str,
    window: &str,
) -> Result<Vec<Edge>> {
    let mut edges = correlate_edges(inbound, outbound, namespace, resource);
    attach_edge_stats(client, &mut edges, window).await?;
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prom::fake::FakeQueryClient;
    use crate::stats::StatKey;

    fn inbound(client_id: Option<&str>, deployment: &str, ns: &str, app: &str, version: &str) -> Sample {
        let mut labels = vec![
            ("deployment", deployment),
            ("namespace", ns),
            ("app", app),
            ("version", version),
        ];
        if let Some(id) = client_id {
            labels.push(("client_id", id));
        }
        Sample::new(labels, 1.0)
    }

    fn outbound(dst_deployment: &str, ns: &str, app: &str, version: &str) -> Sample {
        Sample::new(
            [
                ("dst_deployment", dst_deployment),
                ("namespace", ns),
                ("app", app),
                ("version", version),
            ],
            1.0,
        )
    }

    #[test]
    fn test_client_namespace() {
        assert_eq!(client_namespace("a.ns1.sa.cluster.local"), Some("ns1"));
        assert_eq!(client_namespace("nodots"), None);
    }

    #[test]
    fn test_join_produces_single_edge() {
        let inbound = vec![inbound(Some("a.ns1.sa.cluster.local"), "X", "ns9", "x-app", "v2")];
        let outbound = vec![outbound("X", "ns1", "caller", "v1")];

        let edges = correlate_edges(&inbound, &outbound, None, "deployment");

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from_entity(), Entity::new("ns1", "caller", "v1"));
        assert_eq!(edges[0].to_entity(), Entity::new("ns9", "x-app", "v2"));
        assert!(edges[0].stats.is_empty());
    }

    #[test]
    fn test_inbound_without_client_id_is_dropped() {
        let inbound = vec![
            inbound(None, "X", "ns1", "x-app", "v1"),
            inbound(Some(""), "X", "ns1", "x-app", "v1"),
        ];
        let outbound = vec![outbound("X", "ns1", "caller", "v1")];

        assert!(correlate_edges(&inbound, &outbound, None, "deployment").is_empty());
    }

    #[test]
    fn test_outbound_without_destination_is_skipped() {
        let inbound = vec![inbound(Some("a.ns1.sa.cluster.local"), "X", "ns1", "x", "v1")];
        let outbound = vec![
            outbound("Y", "ns1", "caller", "v1"),
            outbound("X", "ns2", "caller", "v1"),
        ];

        assert!(correlate_edges(&inbound, &outbound, None, "deployment").is_empty());
    }

    #[test]
    fn test_namespace_filter_keeps_either_endpoint() {
        let inbound = vec![
            inbound(Some("c.ns1.sa.cluster.local"), "B", "ns3", "b", "v1"),
            inbound(Some("c.ns2.sa.cluster.local"), "C", "ns3", "c", "v1"),
            inbound(Some("c.ns2.sa.cluster.local"), "D", "ns1", "d", "v1"),
        ];
        let outbound = vec![
            outbound("B", "ns1", "a", "v1"), // ns1 -> ns3: kept by source
            outbound("C", "ns2", "x", "v1"), // ns2 -> ns3: dropped
            outbound("D", "ns2", "y", "v1"), // ns2 -> ns1: kept by destination
        ];

        let edges = correlate_edges(&inbound, &outbound, Some("ns1"), "deployment");

        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].from_app, "a");
        assert_eq!(edges[1].from_app, "y");
        assert!(edges
            .iter()
            .all(|e| e.from_namespace == "ns1" || e.to_namespace == "ns1"));

        // empty filter means no filter
        assert_eq!(correlate_edges(&inbound, &outbound, Some(""), "deployment").len(), 3);
    }

    #[test]
    fn test_multiple_sources_per_key() {
        let inbound = vec![inbound(Some("c.ns1.sa.cluster.local"), "B", "ns1", "b", "v1")];
        let outbound = vec![
            outbound("B", "ns1", "a", "v1"),
            outbound("B", "ns1", "a", "v2"),
        ];

        let edges = correlate_edges(&inbound, &outbound, None, "deployment");
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].from_version, "v1");
        assert_eq!(edges[1].from_version, "v2");
    }

    #[test]
    fn test_destination_with_empty_app_is_kept() {
        let inbound = vec![Sample::new(
            [("client_id", "c.ns1.sa.cluster.local"), ("deployment", "B"), ("namespace", "ns1")],
            1.0,
        )];
        let outbound = vec![outbound("B", "ns1", "a", "v1")];

        let edges = correlate_edges(&inbound, &outbound, None, "deployment");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to_app, "");
        assert_eq!(edges[0].to_version, "");
    }

    #[test]
    fn test_custom_resource_type() {
        let inbound = vec![Sample::new(
            [("client_id", "c.ns1.sa.cluster.local"), ("statefulset", "db"), ("namespace", "ns1"), ("app", "db")],
            1.0,
        )];
        let outbound = vec![Sample::new(
            [("dst_statefulset", "db"), ("namespace", "ns1"), ("app", "api")],
            1.0,
        )];

        let edges = correlate_edges(&inbound, &outbound, None, "statefulset");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to_app, "db");
    }

    #[tokio::test]
    async fn test_correlate_with_stats_attaches_outbound_stats() {
        let fake = Arc::new(FakeQueryClient::new().on_vector(
            "request_total",
            vec![Sample::new([("app", "a")], 4.0)],
        ));
        let client: Arc<dyn QueryClient> = fake.clone();
        let inbound = vec![inbound(Some("c.ns1.sa.cluster.local"), "B", "ns1", "b", "v1")];
        let outbound = vec![outbound("B", "ns1", "a", "v1")];

        let edges =
            correlate_edges_with_stats(&client, &inbound, &outbound, None, "deployment", "30s")
                .await
                .unwrap();

        assert_eq!(edges[0].stats[&StatKey::Rps], 4.0);
        assert!(fake
            .issued()
            .iter()
            .all(|q| q.contains(r#"direction="outbound",app="a",version="v1""#)));
    }

    #[tokio::test]
    async fn test_correlate_with_stats_failure_aborts() {
        let client: Arc<dyn QueryClient> =
            Arc::new(FakeQueryClient::new().fail("response_total", "backend down"));
        let inbound = vec![inbound(Some("c.ns1.sa.cluster.local"), "B", "ns1", "b", "v1")];
        let outbound = vec![outbound("B", "ns1", "a", "v1")];

        let result =
            correlate_edges_with_stats(&client, &inbound, &outbound, None, "deployment", "30s").await;
        assert!(result.is_err());
    }
}
