//! Prometheus query layer: result types, the `QueryClient` seam and query templates.
//!
//! Everything above this module only ever sees `Sample` vectors. The HTTP client
//! lives in `client`, and the query expressions the graph engine issues live in
//! `queries`.

mod client;
pub mod queries;

#[cfg(test)]
pub(crate) mod fake;

pub use client::PrometheusClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::{MeshGraphError, Result};

/// Label name → label value for one series.
pub type Labels = HashMap<String, String>;

/// One labeled data point returned by an instant query.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: Labels,
    pub value: f64,
}

impl Sample {
    pub fn new<K, V, I>(labels: I, value: f64) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            metric: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            value,
        }
    }

    /// Label value, or the empty string when the label is absent.
    pub fn label(&self, name: &str) -> &str {
        self.metric.get(name).map(String::as_str).unwrap_or("")
    }
}

/// One series of a range result.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSeries {
    pub metric: Labels,
    pub values: Vec<f64>,
}

/// A query result, tagged by its Prometheus result type.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Scalar(f64),
    Vector(Vec<Sample>),
    Matrix(Vec<RangeSeries>),
    String(String),
}

impl QueryValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            QueryValue::Scalar(_) => "scalar",
            QueryValue::Vector(_) => "vector",
            QueryValue::Matrix(_) => "matrix",
            QueryValue::String(_) => "string",
        }
    }
}

/// Result of a single instant query plus any backend warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub value: QueryValue,
    pub warnings: Vec<String>,
}

impl QueryResult {
    pub fn new(value: QueryValue) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }
}

/// Executes an instant query against the metrics backend.
///
/// Implementations must be safe to share between concurrently running tasks.
/// Cancellation is by dropping the returned future.
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn query(&self, expr: &str, at: DateTime<Utc>) -> Result<QueryResult>;
}

/// Unwrap a vector result; any other result type is a correlation error.
pub fn expect_vector(result: QueryResult) -> Result<Vec<Sample>> {
    if !result.warnings.is_empty() {
        log::warn!("{:?}", result.warnings);
    }
    match result.value {
        QueryValue::Vector(samples) => Ok(samples),
        other => Err(MeshGraphError::UnexpectedResultType(
            other.type_name().to_string(),
        )),
    }
}

/// Run `expr` at the current instant and require a vector back.
pub async fn query_vector(client: &dyn QueryClient, expr: &str) -> Result<Vec<Sample>> {
    log::debug!("Performing query: {}", expr);
    let result = client.query(expr, Utc::now()).await?;
    expect_vector(result)
}
