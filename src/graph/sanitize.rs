use super::GraphResponse;
use crate::error::{MeshGraphError, Result};

/// Reject a response carrying any NaN or infinite stat, naming the first offender.
///
/// Stats are zeroed at extraction already; this is the last check before a
/// response is serialized (JSON has no encoding for either value).
pub fn ensure_no_nan(response: &GraphResponse) -> Result<()> {
    for node in &response.nodes {
        if let Some((key, value)) = node.stats.iter().find(|(_, v)| !v.is_finite()) {
            return Err(MeshGraphError::NanDetected {
                value: *value,
                kind: "node",
                namespace: node.namespace.clone(),
                app: node.app.clone(),
                version: node.version.clone(),
                metric: key.to_string(),
            });
        }
    }
    for edge in &response.edges {
        if let Some((key, value)) = edge.stats.iter().find(|(_, v)| !v.is_finite()) {
            return Err(MeshGraphError::NanDetected {
                value: *value,
                kind: "edge from",
                namespace: edge.from_namespace.clone(),
                app: edge.from_app.clone(),
                version: edge.from_version.clone(),
                metric: key.to_string(),
            });
        }
    }
    Ok(())
}
