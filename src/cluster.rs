//! Cluster-wide resource usage and overall success rate.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{MeshGraphError, Result};
use crate::prom::{queries, QueryClient, QueryValue};

/// Body of `GET /api/v0/cluster`. Percentages for the usage figures, a ratio
/// for the success rate; `None` when the backend has no (finite) value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub memory: Option<f64>,
    pub cpu: Option<f64>,
    pub filesystem: Option<f64>,
    pub overall_success_rate: Option<f64>,
}

/// Query the four cluster figures one after another, each bounded by `per_query`.
pub async fn cluster_summary(
    client: &dyn QueryClient,
    window: &str,
    per_query: Duration,
) -> Result<ClusterSummary> {
    let success_rate = queries::overall_success_rate(window);

    Ok(ClusterSummary {
        memory: single_value(client, queries::CLUSTER_MEMORY_USAGE, per_query).await?,
        cpu: single_value(client, queries::CLUSTER_CPU_USAGE_1M_AVG, per_query).await?,
        filesystem: single_value(client, queries::CLUSTER_FILESYSTEM_USAGE, per_query).await?,
        overall_success_rate: single_value(client, &success_rate, per_query).await?,
    })
}

async fn single_value(
    client: &dyn QueryClient,
    expr: &str,
    per_query: Duration,
) -> Result<Option<f64>> {
    log::debug!("Performing query: {}", expr);
    let result = tokio::time::timeout(per_query, client.query(expr, Utc::now()))
        .await
        .map_err(|_| {
            MeshGraphError::Timeout(format!("cluster query exceeded {:?}: {}", per_query, expr))
        })?
        .map_err(|e| {
            log::error!("error querying prometheus: {}", e);
            e
        })?;

    if !result.warnings.is_empty() {
        log::warn!("{:?}", result.warnings);
    }

    let value = match result.value {
        QueryValue::Scalar(v) => Some(v),
        QueryValue::Vector(samples) => samples.first().map(|s| s.value),
        other => {
            return Err(MeshGraphError::UnexpectedResultType(
                other.type_name().to_string(),
            ))
        }
    };
    Ok(value.filter(|v| v.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prom::fake::FakeQueryClient;
    use crate::prom::Sample;
    use serde_json::json;

    #[tokio::test]
    async fn test_summary_collects_all_figures() {
        let fake = FakeQueryClient::new()
            .on_vector("machine_memory_bytes", vec![Sample::new([("a", "b")], 42.5)])
            .on("machine_cpu_cores", QueryValue::Scalar(12.0))
            .on_vector("container_fs_usage_bytes", vec![])
            .on_vector("classification=\"success\"", vec![Sample::new([("a", "b")], f64::NAN)]);

        let summary = cluster_summary(&fake, "1m", Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(summary.memory, Some(42.5));
        assert_eq!(summary.cpu, Some(12.0));
        assert_eq!(summary.filesystem, None);
        assert_eq!(summary.overall_success_rate, None);
        assert!(fake.issued()[3].contains("[1m]"));
    }

    #[tokio::test]
    async fn test_summary_wire_format() {
        let summary = ClusterSummary {
            memory: Some(1.0),
            overall_success_rate: Some(0.5),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(summary).unwrap(),
            json!({"memory": 1.0, "cpu": null, "filesystem": null, "overallSuccessRate": 0.5})
        );
    }

    #[tokio::test]
    async fn test_failure_stops_summary() {
        let fake = FakeQueryClient::new().fail("machine_cpu_cores", "boom");

        let err = cluster_summary(&fake, "30s", Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, MeshGraphError::Query(_)));
        assert_eq!(fake.issued().len(), 2);
    }

    #[tokio::test]
    async fn test_slow_query_times_out() {
        let fake = FakeQueryClient::new().delay("machine_memory_bytes", Duration::from_millis(300));

        let err = cluster_summary(&fake, "30s", Duration::from_millis(10))
            .await
            .unwrap_err();

        assert!(matches!(err, MeshGraphError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_string_result_is_rejected() {
        let fake = FakeQueryClient::new()
            .on("machine_memory_bytes", QueryValue::String("up".to_string()));

        let err = cluster_summary(&fake, "30s", Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, MeshGraphError::UnexpectedResultType(_)));
    }
}
