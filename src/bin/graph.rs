use anyhow::Result;
use clap::Parser;
use meshgraph::graph::{build_graph_within, GraphContext, GraphRequest};
use meshgraph::{Config, PrometheusClient, StrategyKind};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "graph")]
#[command(about = "Build the service graph once and print it as JSON")]
struct Args {
    /// Namespace to scope the graph to; all namespaces when omitted
    namespace: Option<String>,

    /// Address of the Prometheus API (defaults to the configured one)
    #[arg(long = "api-addr")]
    api_addr: Option<String>,

    /// Range window for rate and latency queries
    #[arg(short, long)]
    window: Option<String>,

    /// Assembly strategy: full or progressive
    #[arg(short, long)]
    strategy: Option<StrategyKind>,

    /// Log level (error, warn, info, debug, trace); defaults to the configured one
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Pretty-print the JSON
    #[arg(short, long)]
    pretty: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(api_addr) = &self.api_addr {
            config.prometheus.address = api_addr.clone();
        }
        if let Some(window) = &self.window {
            config.graph.window_default = window.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load()?;
    args.apply(&mut config);
    config.validate()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.logging.level),
    )
    .init();

    let client = PrometheusClient::new(&config.prometheus.address, config.request_timeout())?;
    let ctx = GraphContext::new(Arc::new(client), config.graph.resource_type.clone());
    let request = GraphRequest::new(args.namespace, config.graph.window_default.clone());
    let strategy = args.strategy.unwrap_or(config.graph.strategy);

    let start = Instant::now();
    let graph = build_graph_within(
        strategy.strategy().as_ref(),
        &ctx,
        &request,
        config.timeouts.graph(),
    )
    .await?;
    log::info!(
        "built graph with {} nodes and {} edges in {:?}",
        graph.nodes.len(),
        graph.edges.len(),
        start.elapsed()
    );

    let out = if args.pretty {
        serde_json::to_string_pretty(&graph)?
    } else {
        serde_json::to_string(&graph)?
    };
    println!("{}", out);

    Ok(())
}
