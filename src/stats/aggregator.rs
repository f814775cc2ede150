use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;

use super::{Direction, Quantile, StatKey, Stats};
use crate::error::{MeshGraphError, Result};
use crate::prom::{self, queries, QueryClient, Sample};

/// Raw per-stat result vectors of one basket, before reduction to numbers.
pub type StatsVectors = HashMap<StatKey, Vec<Sample>>;

/// What a basket is computed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// One app (and version, when non-empty) in one direction, grouped by app.
    Entity {
        direction: Direction,
        app: String,
        version: String,
    },
    /// Every app in one direction, grouped finely enough to look entities up later.
    Direction {
        direction: Direction,
        resource: String,
    },
}

impl Scope {
    pub fn entity(direction: Direction, app: &str, version: &str) -> Self {
        Scope::Entity {
            direction,
            app: app.to_string(),
            version: version.to_string(),
        }
    }

    /// Label selector for this scope; `success_only` adds the success classification.
    pub fn selector(&self, success_only: bool) -> String {
        let mut pairs: Vec<(&str, &str)> = Vec::with_capacity(4);
        if success_only {
            pairs.push(("classification", "success"));
        }
        match self {
            Scope::Entity {
                direction,
                app,
                version,
            } => {
                pairs.push(("direction", direction.as_str()));
                pairs.push(("app", app));
                if !version.is_empty() {
                    pairs.push(("version", version));
                }
            }
            Scope::Direction { direction, .. } => {
                pairs.push(("direction", direction.as_str()));
            }
        }
        queries::label_selector(&pairs)
    }

    /// `by (...)` dimensions for every query in the basket.
    pub fn group_by(&self) -> String {
        match self {
            Scope::Entity { .. } => "app".to_string(),
            Scope::Direction { resource, .. } => format!("app,version,{}", resource),
        }
    }
}

/// Stats for one entity: each stat is the first returned sample, or 0.0.
pub async fn entity_stats(
    client: &Arc<dyn QueryClient>,
    direction: Direction,
    app: &str,
    version: &str,
    window: &str,
) -> Result<Stats> {
    let scope = Scope::entity(direction, app, version);
    let vectors = run_basket(client, &scope, window).await?;

    let mut stats = Stats::new();
    for key in StatKey::ALL {
        let value = vectors
            .get(&key)
            .and_then(|samples| samples.first())
            .map(|sample| sample.value)
            .unwrap_or(0.0);
        stats.insert(key, zero_non_finite(value, key, app, version));
    }
    Ok(stats)
}

/// Raw vectors for a whole direction; reduce per entity with `lookup_stats`.
pub async fn direction_stats(
    client: &Arc<dyn QueryClient>,
    direction: Direction,
    resource: &str,
    window: &str,
) -> Result<StatsVectors> {
    let scope = Scope::Direction {
        direction,
        resource: resource.to_string(),
    };
    run_basket(client, &scope, window).await
}

/// Pick the stats of one `(app, version)` out of direction-wide vectors.
///
/// The first matching sample wins (a missing label matches ""); stats with no
/// matching sample are 0.0.
pub fn lookup_stats(vectors: &StatsVectors, app: &str, version: &str) -> Stats {
    let mut stats = Stats::new();
    for key in StatKey::ALL {
        let value = vectors
            .get(&key)
            .and_then(|samples| {
                samples
                    .iter()
                    .find(|sample| sample.label("app") == app && sample.label("version") == version)
            })
            .map(|sample| {
                log::debug!("found {} for app: {} version: {}", key, app, version);
                sample.value
            })
            .unwrap_or(0.0);
        stats.insert(key, zero_non_finite(value, key, app, version));
    }
    stats
}

/// NaN and +/-Inf (e.g. a quantile landing in the top bucket) become 0.0.
fn zero_non_finite(value: f64, key: StatKey, app: &str, version: &str) -> f64 {
    if !value.is_finite() {
        log::info!(
            "Found {} value for metric: {}, with app {} & version: {}",
            value,
            key,
            app,
            version
        );
        0.0
    } else {
        value
    }
}

/// Quantiles fan out concurrently; rps and success rate follow sequentially.
async fn run_basket(
    client: &Arc<dyn QueryClient>,
    scope: &Scope,
    window: &str,
) -> Result<StatsVectors> {
    let mut vectors = fetch_quantiles(client, scope, window).await?;

    let selector = scope.selector(false);
    let group_by = scope.group_by();

    let rps_query = queries::request_rate(&selector, window, &group_by);
    let rps = prom::query_vector(client.as_ref(), &rps_query).await?;
    vectors.insert(StatKey::Rps, rps);

    let success_query =
        queries::success_rate(&scope.selector(true), &selector, window, &group_by);
    let success = prom::query_vector(client.as_ref(), &success_query).await?;
    vectors.insert(StatKey::SuccessRate, success);

    Ok(vectors)
}

/// Runs the three quantile queries as separate tasks and waits for all of them.
///
/// Results are keyed by the quantile each task reports, so arrival order does not
/// matter. Any failure fails the whole set, but only after every task has finished.
async fn fetch_quantiles(
    client: &Arc<dyn QueryClient>,
    scope: &Scope,
    window: &str,
) -> Result<StatsVectors> {
    let selector = scope.selector(false);
    let group_by = scope.group_by();

    // Dropping the set (e.g. on deadline) aborts tasks still in flight.
    let mut tasks = JoinSet::new();
    for quantile in Quantile::ALL {
        let client = Arc::clone(client);
        let expr = queries::latency_quantile(quantile.as_str(), &selector, window, &group_by);
        tasks.spawn(async move {
            let result = prom::query_vector(client.as_ref(), &expr).await;
            (quantile, result)
        });
    }

    let mut vectors = StatsVectors::new();
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((quantile, Ok(samples))) => {
                vectors.insert(quantile.stat_key(), samples);
            }
            Ok((quantile, Err(e))) => {
                log::error!("quantile {} query failed with {}", quantile.as_str(), e);
                first_error.get_or_insert(e);
            }
            Err(e) => {
                log::error!("quantile query task failed: {}", e);
                first_error
                    .get_or_insert(MeshGraphError::Query(format!("quantile task failed: {}", e)));
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(vectors),
    }
}
