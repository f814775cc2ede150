use crate::cluster;
use crate::config::{is_prometheus_duration, Config, TimeoutConfig};
use crate::error::{MeshGraphError, Result};
use crate::graph::{self, GraphContext, GraphRequest, GraphResponse, StrategyKind};
use crate::prom::QueryClient;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures_util::{stream, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt as TokioStreamExt};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const API_VERSIONS: &[&str] = &["v0"];

/// HTTP API server for the service graph
pub struct ApiServer {
    state: AppState,
    addr: String,
    allowed_origins: Vec<String>,
}

impl ApiServer {
    pub fn new(config: &Config, client: Arc<dyn QueryClient>) -> Self {
        Self {
            state: AppState::new(config, client),
            addr: config.server.addr.clone(),
            allowed_origins: config.server.allowed_origins.clone(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.state.instance_id
    }

    /// Serve until Ctrl-C or SIGTERM
    pub async fn run(&self) -> Result<()> {
        let app = create_router(self.state.clone(), &self.allowed_origins);

        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| {
                MeshGraphError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to bind to {}: {}", self.addr, e),
                ))
            })?;
        log::info!("Starting meshgraph API on http://{}", self.addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                MeshGraphError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("HTTP server error: {}", e),
                ))
            })?;

        log::info!("meshgraph API stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutdown signal received, draining connections");
}

/// Build the router with tracing, CORS and security headers applied
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    // Empty list allows any origin
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/", get(handle_hello))
        .route("/hello", get(handle_hello))
        .route("/health", get(handle_health))
        .route("/api/version", get(handle_api_version))
        .route("/api/v0/cluster", get(handle_cluster))
        .route("/api/v0/namespace", get(handle_all_namespaces))
        .route("/api/v0/namespace/", get(handle_all_namespaces))
        .route("/api/v0/namespace/:namespace", get(handle_namespace))
        .route("/api/v0/namespace/:namespace/stream", get(handle_namespace_stream))
        .route("/api/v0/stream", get(handle_all_namespaces_stream))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("SAMEORIGIN"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_XSS_PROTECTION,
                    HeaderValue::from_static("1; mode=block"),
                )),
        )
        .with_state(state)
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    ctx: GraphContext,
    window_default: String,
    strategy: StrategyKind,
    timeouts: TimeoutConfig,
    instance_id: Uuid,
    controller_namespace: String,
}

impl AppState {
    pub fn new(config: &Config, client: Arc<dyn QueryClient>) -> Self {
        Self {
            ctx: GraphContext::new(client, config.graph.resource_type.clone()),
            window_default: config.graph.window_default.clone(),
            strategy: config.graph.strategy,
            timeouts: config.timeouts.clone(),
            instance_id: Uuid::new_v4(),
            controller_namespace: config.server.controller_namespace.clone(),
        }
    }

    /// Request window, or the configured default when absent or empty
    fn window(&self, requested: Option<String>) -> Result<String> {
        match requested.filter(|w| !w.is_empty()) {
            None => Ok(self.window_default.clone()),
            Some(w) if is_prometheus_duration(&w) => Ok(w),
            Some(w) => Err(MeshGraphError::InvalidInput(format!(
                "window must be a duration like 30s or 5m, got '{}'",
                w
            ))),
        }
    }

    fn strategy(&self, requested: Option<String>) -> Result<StrategyKind> {
        match requested.filter(|s| !s.is_empty()) {
            None => Ok(self.strategy),
            Some(s) => s.parse(),
        }
    }
}

/// Error rendered as `{"error": "..."}` with a status derived from the kind
struct ApiError(MeshGraphError);

impl From<MeshGraphError> for ApiError {
    fn from(e: MeshGraphError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MeshGraphError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            MeshGraphError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        log::error!("{}", self.0);
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct WindowParams {
    window: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GraphParams {
    window: Option<String>,
    strategy: Option<String>,
}

async fn handle_hello(State(state): State<AppState>) -> String {
    format!(
        "Hello there! \ninstance: {}\ncontroller namespace: {}\n",
        state.instance_id, state.controller_namespace
    )
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "meshgraph",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

async fn handle_api_version() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "version": API_VERSIONS }))
}

async fn handle_cluster(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> std::result::Result<Json<cluster::ClusterSummary>, ApiError> {
    let window = state.window(params.window)?;
    let summary =
        cluster::cluster_summary(state.ctx.client.as_ref(), &window, state.timeouts.aggregate())
            .await?;
    Ok(Json(summary))
}

async fn handle_namespace(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(params): Query<GraphParams>,
) -> std::result::Result<Json<GraphResponse>, ApiError> {
    graph_response(state, Some(namespace), params).await
}

async fn handle_all_namespaces(
    State(state): State<AppState>,
    Query(params): Query<GraphParams>,
) -> std::result::Result<Json<GraphResponse>, ApiError> {
    graph_response(state, None, params).await
}

async fn graph_response(
    state: AppState,
    namespace: Option<String>,
    params: GraphParams,
) -> std::result::Result<Json<GraphResponse>, ApiError> {
    let strategy = state.strategy(params.strategy)?;
    let request = GraphRequest::new(namespace, state.window(params.window)?);
    log::debug!(
        "graph request: namespace={:?} window={} strategy={}",
        request.namespace(),
        request.window,
        strategy
    );

    let response = graph::build_graph_within(
        strategy.strategy().as_ref(),
        &state.ctx,
        &request,
        state.timeouts.graph(),
    )
    .await?;
    Ok(Json(response))
}

async fn handle_namespace_stream(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(params): Query<GraphParams>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError>
{
    graph_stream(state, Some(namespace), params)
}

async fn handle_all_namespaces_stream(
    State(state): State<AppState>,
    Query(params): Query<GraphParams>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError>
{
    graph_stream(state, None, params)
}

/// One `graph` event per emitted response, or a closing `error` event.
///
/// Assembly runs inside the stream, so a disconnecting client drops every
/// query still in flight.
fn graph_stream(
    state: AppState,
    namespace: Option<String>,
    params: GraphParams,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError>
{
    let strategy = state.strategy(params.strategy)?;
    let request = GraphRequest::new(namespace, state.window(params.window)?);
    let deadline = state.timeouts.graph();
    let ctx = state.ctx;

    let (sink, responses) = mpsc::unbounded_channel();
    let driver = async move {
        graph::assemble_within(
            strategy.strategy().as_ref(),
            &ctx,
            &request,
            &sink,
            deadline,
        )
        .await
    };

    let graph_events = UnboundedReceiverStream::new(responses)
        .map(|response| Ok::<_, Infallible>(graph_event(&response)));
    let outcome = stream::once(driver)
        .filter_map(|result| result.err().map(|e| Ok::<_, Infallible>(error_event(&e))));

    let keepalive = KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("ping");

    Ok(Sse::new(stream::select(graph_events, outcome)).keep_alive(keepalive))
}

fn graph_event(response: &GraphResponse) -> Event {
    match serde_json::to_string(response) {
        Ok(body) => Event::default().event("graph").data(body),
        Err(e) => error_event(&MeshGraphError::Json(e)),
    }
}

fn error_event(err: &MeshGraphError) -> Event {
    log::error!("graph stream failed: {}", err);
    Event::default()
        .event("error")
        .data(serde_json::json!({ "error": err.to_string() }).to_string())
}
