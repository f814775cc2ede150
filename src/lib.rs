pub mod api;
pub mod cluster;
pub mod config;
pub mod error;
pub mod graph;
pub mod prom;
pub mod stats;

pub use config::Config;
pub use error::{MeshGraphError, Result};
pub use graph::{build_graph, GraphContext, GraphRequest, GraphResponse, StrategyKind};
pub use prom::{PrometheusClient, QueryClient};
