use anyhow::Result;
use clap::Parser;
use meshgraph::api::ApiServer;
use meshgraph::{Config, PrometheusClient};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "meshgraph")]
#[command(version, about = "Serve the service graph derived from mesh Prometheus metrics")]
struct Args {
    /// Address to serve on
    #[arg(long)]
    addr: Option<String>,

    /// Address of the Prometheus API
    #[arg(long = "api-addr")]
    api_addr: Option<String>,

    /// Namespace of the mesh control plane
    #[arg(long = "controller-namespace")]
    controller_namespace: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Enable debug logging (deprecated, use --log-level debug)
    #[arg(long)]
    debug: bool,

    /// Config file; overrides MESHGRAPH_CONFIG
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(addr) = &self.addr {
            config.server.addr = addr.clone();
        }
        if let Some(api_addr) = &self.api_addr {
            config.prometheus.address = api_addr.clone();
        }
        if let Some(namespace) = &self.controller_namespace {
            config.server.controller_namespace = namespace.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        } else if self.debug {
            config.logging.level = "debug".to_string();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    args.apply(&mut config);
    config.validate()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.logging.level),
    )
    .init();

    if args.debug && args.log_level.is_none() {
        log::warn!("--debug is deprecated, use --log-level debug");
    }

    let client = PrometheusClient::new(&config.prometheus.address, config.request_timeout())?;
    log::info!("Prometheus query API: {}", client.query_url());

    let server = ApiServer::new(&config, Arc::new(client));
    log::info!(
        "meshgraph {} instance {} (controller namespace: {}, strategy: {})",
        env!("CARGO_PKG_VERSION"),
        server.instance_id(),
        config.server.controller_namespace,
        config.graph.strategy
    );

    server.run().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "meshgraph",
            "--addr",
            "0.0.0.0:9999",
            "--api-addr",
            "http://prom:9090",
            "--controller-namespace",
            "mesh",
            "--debug",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.server.addr, "0.0.0.0:9999");
        assert_eq!(config.prometheus.address, "http://prom:9090");
        assert_eq!(config.server.controller_namespace, "mesh");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_unknown_log_level_flag_fails_validation() {
        let args = Args::parse_from(["meshgraph", "--log-level", "verbose"]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_wins_over_debug() {
        let args = Args::parse_from(["meshgraph", "--debug", "--log-level", "warn"]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.logging.level, "warn");
    }
}
