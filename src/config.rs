use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

use crate::graph::StrategyKind;
use crate::prom::queries::WINDOW_DEFAULT;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    /// CORS origins; empty allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_controller_namespace")]
    pub controller_namespace: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            allowed_origins: Vec::new(),
            controller_namespace: default_controller_namespace(),
        }
    }
}

fn default_addr() -> String {
    "127.0.0.1:8084".to_string()
}

fn default_controller_namespace() -> String {
    "linkerd".to_string()
}

/// Metrics backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_prometheus_address")]
    pub address: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            address: default_prometheus_address(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_prometheus_address() -> String {
    "http://linkerd-prometheus.linkerd.svc.cluster.local:9090".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Graph assembly configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_window")]
    pub window_default: String,
    /// Workload label used to join inbound and outbound traffic
    #[serde(default = "default_resource_type")]
    pub resource_type: String,
    #[serde(default)]
    pub strategy: StrategyKind,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            window_default: default_window(),
            resource_type: default_resource_type(),
            strategy: StrategyKind::default(),
        }
    }
}

fn default_window() -> String {
    WINDOW_DEFAULT.to_string()
}

fn default_resource_type() -> String {
    "deployment".to_string()
}

/// Request deadlines
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    /// Per query, for the cluster summary
    #[serde(default = "default_aggregate_secs")]
    pub aggregate_secs: u64,
    /// Whole graph request
    #[serde(default = "default_graph_secs")]
    pub graph_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            aggregate_secs: default_aggregate_secs(),
            graph_secs: default_graph_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn aggregate(&self) -> Duration {
        Duration::from_secs(self.aggregate_secs)
    }

    pub fn graph(&self) -> Duration {
        Duration::from_secs(self.graph_secs)
    }
}

fn default_aggregate_secs() -> u64 {
    10
}

fn default_graph_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// True for PromQL range durations such as `30s`, `5m` or `1h30m`.
pub fn is_prometheus_duration(window: &str) -> bool {
    static DURATION: OnceLock<Regex> = OnceLock::new();
    DURATION
        .get_or_init(|| {
            Regex::new(r"^([0-9]+(ms|s|m|h|d|w|y))+$").expect("duration pattern is valid")
        })
        .is_match(window)
}

impl Config {
    /// Load configuration
    ///
    /// Loads environment variables from .env file (if present) first.
    /// Looks for the config file in this order:
    /// 1. Path specified in MESHGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory, if it exists
    ///
    /// Without either, the built-in defaults are used.
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        match std::env::var("MESHGRAPH_CONFIG") {
            Ok(path) => Self::load_from(Path::new(&path)),
            Err(_) => {
                let local = PathBuf::from("config.toml");
                if local.exists() {
                    Self::load_from(&local)
                } else {
                    let config = Config::default();
                    config.validate()?;
                    Ok(config)
                }
            }
        }
    }

    /// Load and validate a specific config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !is_prometheus_duration(&self.graph.window_default) {
            anyhow::bail!(
                "graph.window_default must be a Prometheus duration like 30s or 5m, got '{}'",
                self.graph.window_default
            );
        }

        if self.graph.resource_type.trim().is_empty() {
            anyhow::bail!("graph.resource_type must not be empty");
        }

        Url::parse(&self.prometheus.address).with_context(|| {
            format!(
                "prometheus.address is not a valid URL: {}",
                self.prometheus.address
            )
        })?;

        if self.prometheus.request_timeout_secs == 0 {
            anyhow::bail!("prometheus.request_timeout_secs must be greater than 0");
        }

        if self.timeouts.aggregate_secs == 0 {
            anyhow::bail!("timeouts.aggregate_secs must be greater than 0");
        }

        if self.timeouts.graph_secs == 0 {
            anyhow::bail!("timeouts.graph_secs must be greater than 0");
        }

        log::LevelFilter::from_str(&self.logging.level).map_err(|_| {
            anyhow::anyhow!(
                "logging.level must be one of off, error, warn, info, debug, trace; got '{}'",
                self.logging.level
            )
        })?;

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.prometheus.request_timeout_secs)
    }
}
