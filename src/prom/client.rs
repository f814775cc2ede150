use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use super::{QueryClient, QueryResult, QueryValue, RangeSeries, Sample};
use crate::error::{MeshGraphError, Result};

/// Envelope returned by every Prometheus HTTP API endpoint
#[derive(Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

/// `data` payload of an instant query, tagged by `resultType`
#[derive(Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum ApiData {
    Scalar((f64, String)),
    String((f64, String)),
    Vector(Vec<ApiSample>),
    Matrix(Vec<ApiSeries>),
}

#[derive(Deserialize)]
struct ApiSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: (f64, String),
}

#[derive(Deserialize)]
struct ApiSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// Client for the Prometheus instant query API (`/api/v1/query`).
///
/// Cheap to share behind an `Arc`; the inner `reqwest::Client` pools connections.
pub struct PrometheusClient {
    client: Client,
    query_url: Url,
}

impl PrometheusClient {
    /// Create a client for the Prometheus server at `address`
    ///
    /// # Arguments
    ///
    /// * `address` - Base URL, e.g. `http://prometheus:9090` (a path prefix is kept)
    /// * `timeout` - Per-request HTTP timeout
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(address).map_err(|e| {
            MeshGraphError::Config(format!("Invalid Prometheus address {}: {}", address, e))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let query_url = base.join("api/v1/query").map_err(|e| {
            MeshGraphError::Config(format!("Invalid Prometheus address {}: {}", address, e))
        })?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, query_url })
    }

    /// The fully resolved query endpoint
    pub fn query_url(&self) -> &Url {
        &self.query_url
    }
}

#[async_trait]
impl QueryClient for PrometheusClient {
    async fn query(&self, expr: &str, at: DateTime<Utc>) -> Result<QueryResult> {
        let mut url = self.query_url.clone();
        url.query_pairs_mut()
            .append_pair("query", expr)
            .append_pair("time", &at.to_rfc3339_opts(SecondsFormat::Millis, true));

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Prometheus reports query errors as JSON bodies on 4xx/5xx too
        let parsed: ApiResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => {
                return Err(MeshGraphError::Query(format!(
                    "Failed to parse Prometheus response: {}",
                    e
                )));
            }
            Err(_) => {
                return Err(MeshGraphError::Query(format!(
                    "Prometheus API error {}: {}",
                    status, body
                )));
            }
        };

        if parsed.status != "success" || !status.is_success() {
            return Err(MeshGraphError::Query(format!(
                "Prometheus API error {} ({}): {}",
                status,
                parsed.error_type.as_deref().unwrap_or("unknown"),
                parsed.error.as_deref().unwrap_or("no error message"),
            )));
        }

        let data = parsed.data.ok_or_else(|| {
            MeshGraphError::Query("Prometheus response has no data".to_string())
        })?;

        Ok(QueryResult {
            value: decode_data(data)?,
            warnings: parsed.warnings,
        })
    }
}

fn decode_data(data: ApiData) -> Result<QueryValue> {
    let value = match data {
        ApiData::Scalar((_, v)) => QueryValue::Scalar(parse_sample_value(&v)?),
        ApiData::String((_, v)) => QueryValue::String(v),
        ApiData::Vector(samples) => QueryValue::Vector(
            samples
                .into_iter()
                .map(|s| {
                    Ok(Sample {
                        value: parse_sample_value(&s.value.1)?,
                        metric: s.metric,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        ApiData::Matrix(series) => QueryValue::Matrix(
            series
                .into_iter()
                .map(|s| {
                    let values = s
                        .values
                        .iter()
                        .map(|(_, v)| parse_sample_value(v))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(RangeSeries {
                        metric: s.metric,
                        values,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        ),
    };
    Ok(value)
}

/// Sample values travel as strings; `NaN`, `+Inf` and `-Inf` are legal.
fn parse_sample_value(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| MeshGraphError::Query(format!("Invalid sample value: {:?}", raw)))
}
