//! Performance stats: the fixed metric vocabulary and the query basket that fills it.
//!
//! A basket is five queries (three latency quantiles, request rate, success rate)
//! for either one entity or a whole traffic direction.

mod aggregator;

pub use aggregator::{direction_stats, entity_stats, lookup_stats, Scope, StatsVectors};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stat names as they appear in graph JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatKey {
    #[serde(rename = "p50ms")]
    P50,
    /// Carries the 0.95 quantile. Dashboards read it under this name.
    #[serde(rename = "p90ms")]
    P90,
    #[serde(rename = "p99ms")]
    P99,
    #[serde(rename = "rps")]
    Rps,
    #[serde(rename = "successRate")]
    SuccessRate,
}

impl StatKey {
    pub const ALL: [StatKey; 5] = [
        StatKey::P50,
        StatKey::P90,
        StatKey::P99,
        StatKey::Rps,
        StatKey::SuccessRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatKey::P50 => "p50ms",
            StatKey::P90 => "p90ms",
            StatKey::P99 => "p99ms",
            StatKey::Rps => "rps",
            StatKey::SuccessRate => "successRate",
        }
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stat name → value for one node or edge.
pub type Stats = BTreeMap<StatKey, f64>;

/// Traffic direction as labeled by the mesh proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latency quantiles computed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantile {
    P50,
    P95,
    P99,
}

impl Quantile {
    pub const ALL: [Quantile; 3] = [Quantile::P50, Quantile::P95, Quantile::P99];

    /// The `histogram_quantile` argument.
    pub fn as_str(&self) -> &'static str {
        match self {
            Quantile::P50 => "0.5",
            Quantile::P95 => "0.95",
            Quantile::P99 => "0.99",
        }
    }

    pub fn stat_key(&self) -> StatKey {
        match self {
            Quantile::P50 => StatKey::P50,
            Quantile::P95 => StatKey::P90,
            Quantile::P99 => StatKey::P99,
        }
    }
}
