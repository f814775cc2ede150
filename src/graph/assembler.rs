//! Graph assembly strategies.
//!
//! A strategy pushes one or more responses into a [`GraphSink`]; the last one
//! pushed is the complete graph. Every response passes NaN sanitation first.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{correlate_edges, correlate_edges_with_stats, derive_nodes, ensure_no_nan, GraphResponse};
use crate::error::{MeshGraphError, Result};
use crate::prom::{self, queries, QueryClient, Sample};
use crate::stats::{self, Direction};

/// Everything a strategy needs besides the request itself.
#[derive(Clone)]
pub struct GraphContext {
    pub client: Arc<dyn QueryClient>,
    /// Workload label the identity queries group by (`deployment`, `statefulset`, ...).
    pub resource_type: String,
}

impl GraphContext {
    pub fn new(client: Arc<dyn QueryClient>, resource_type: impl Into<String>) -> Self {
        Self {
            client,
            resource_type: resource_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRequest {
    /// `None` or empty means every namespace.
    pub namespace: Option<String>,
    pub window: String,
}

impl GraphRequest {
    pub fn new(namespace: Option<String>, window: impl Into<String>) -> Self {
        Self {
            namespace,
            window: window.into(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    fn scope_name(&self) -> &str {
        self.namespace().unwrap_or("all namespaces")
    }
}

pub type GraphSink = mpsc::UnboundedSender<GraphResponse>;

#[async_trait]
pub trait CorrelationStrategy: Send + Sync {
    /// Build the graph for `request`, pushing each response into `sink`.
    async fn assemble(
        &self,
        ctx: &GraphContext,
        request: &GraphRequest,
        sink: &GraphSink,
    ) -> Result<()>;
}

/// Per-edge and per-node stats queried inline; emits one `full` response.
pub struct FullCorrelation;

#[async_trait]
impl CorrelationStrategy for FullCorrelation {
    async fn assemble(
        &self,
        ctx: &GraphContext,
        request: &GraphRequest,
        sink: &GraphSink,
    ) -> Result<()> {
        let (inbound, outbound) = fetch_identity(ctx).await?;

        let edges = correlate_edges_with_stats(
            &ctx.client,
            &inbound,
            &outbound,
            request.namespace(),
            &ctx.resource_type,
            &request.window,
        )
        .await?;

        let mut nodes = derive_nodes(&edges, request.namespace());
        for node in nodes.iter_mut() {
            node.stats = stats::entity_stats(
                &ctx.client,
                Direction::Inbound,
                &node.app,
                &node.version,
                &request.window,
            )
            .await
            .map_err(|e| {
                log::error!("unable to populate node list: {}", e);
                e
            })?;
        }

        emit(sink, GraphResponse::full(nodes, edges))
    }
}

/// Emits the bare topology as `partial` first, then `full` once the bulk
/// inbound and outbound stats baskets have arrived.
pub struct ProgressiveCorrelation;

#[async_trait]
impl CorrelationStrategy for ProgressiveCorrelation {
    async fn assemble(
        &self,
        ctx: &GraphContext,
        request: &GraphRequest,
        sink: &GraphSink,
    ) -> Result<()> {
        let topology = async {
            let (inbound, outbound) = fetch_identity(ctx).await?;
            let edges = correlate_edges(
                &inbound,
                &outbound,
                request.namespace(),
                &ctx.resource_type,
            );
            let nodes = derive_nodes(&edges, request.namespace());
            emit(sink, GraphResponse::partial(nodes.clone(), edges.clone()))?;
            Ok::<_, MeshGraphError>((nodes, edges))
        };

        let baskets = async {
            tokio::try_join!(
                stats::direction_stats(
                    &ctx.client,
                    Direction::Inbound,
                    &ctx.resource_type,
                    &request.window,
                ),
                stats::direction_stats(
                    &ctx.client,
                    Direction::Outbound,
                    &ctx.resource_type,
                    &request.window,
                ),
            )
        };

        let ((mut nodes, mut edges), (inbound_stats, outbound_stats)) =
            tokio::try_join!(topology, baskets)?;

        for node in nodes.iter_mut() {
            node.stats = stats::lookup_stats(&inbound_stats, &node.app, &node.version);
        }
        for edge in edges.iter_mut() {
            edge.stats = stats::lookup_stats(&outbound_stats, &edge.from_app, &edge.from_version);
        }

        emit(sink, GraphResponse::full(nodes, edges))
    }
}

/// Strategy selector as it appears in config files and query strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Full,
    Progressive,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Full => "full",
            StrategyKind::Progressive => "progressive",
        }
    }

    pub fn strategy(&self) -> Box<dyn CorrelationStrategy> {
        match self {
            StrategyKind::Full => Box::new(FullCorrelation),
            StrategyKind::Progressive => Box::new(ProgressiveCorrelation),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = MeshGraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(StrategyKind::Full),
            "progressive" => Ok(StrategyKind::Progressive),
            other => Err(MeshGraphError::InvalidInput(format!(
                "unknown strategy '{}', expected 'full' or 'progressive'",
                other
            ))),
        }
    }
}

/// Inbound and outbound identity vectors, queried concurrently.
async fn fetch_identity(ctx: &GraphContext) -> Result<(Vec<Sample>, Vec<Sample>)> {
    let inbound_query = queries::inbound_identity(&ctx.resource_type);
    let outbound_query = queries::outbound_identity(&ctx.resource_type);

    tokio::try_join!(
        prom::query_vector(ctx.client.as_ref(), &inbound_query),
        prom::query_vector(ctx.client.as_ref(), &outbound_query),
    )
}

fn emit(sink: &GraphSink, response: GraphResponse) -> Result<()> {
    ensure_no_nan(&response)?;

    log::info!(
        "graph ready ({:?}): {} nodes, {} edges",
        response.integrity,
        response.nodes.len(),
        response.edges.len()
    );
    if let Err(unsent) = sink.send(response) {
        log::debug!("graph receiver gone, dropping {:?} response", unsent.0.integrity);
    }
    Ok(())
}

/// Run `strategy` to completion and return the last response it emitted.
pub async fn build_graph(
    strategy: &dyn CorrelationStrategy,
    ctx: &GraphContext,
    request: &GraphRequest,
) -> Result<GraphResponse> {
    let (sink, mut responses) = mpsc::unbounded_channel();
    strategy.assemble(ctx, request, &sink).await?;
    drop(sink);

    let mut last = None;
    while let Some(response) = responses.recv().await {
        last = Some(response);
    }
    last.ok_or_else(|| {
        MeshGraphError::Query(format!("no graph produced for {}", request.scope_name()))
    })
}

/// [`build_graph`] bounded by `deadline`. On expiry every outstanding query is
/// dropped and a timeout error is returned.
pub async fn build_graph_within(
    strategy: &dyn CorrelationStrategy,
    ctx: &GraphContext,
    request: &GraphRequest,
    deadline: Duration,
) -> Result<GraphResponse> {
    tokio::time::timeout(deadline, build_graph(strategy, ctx, request))
        .await
        .map_err(|_| timeout_error(request, deadline))?
}

/// Drive `strategy` into a caller-owned sink, bounded by `deadline`.
pub async fn assemble_within(
    strategy: &dyn CorrelationStrategy,
    ctx: &GraphContext,
    request: &GraphRequest,
    sink: &GraphSink,
    deadline: Duration,
) -> Result<()> {
    tokio::time::timeout(deadline, strategy.assemble(ctx, request, sink))
        .await
        .map_err(|_| timeout_error(request, deadline))?
}

fn timeout_error(request: &GraphRequest, deadline: Duration) -> MeshGraphError {
    MeshGraphError::Timeout(format!(
        "graph for {} not ready within {:?}",
        request.scope_name(),
        deadline
    ))
}
