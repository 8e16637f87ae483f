pub mod forum;
pub mod pools;
pub mod social;
pub mod token_metrics;

pub use forum::{ForumConnector, ForumSourceConfig};
pub use pools::{PoolConnector, PoolSourceConfig};
pub use social::{SocialConnector, SocialSourceConfig};
pub use token_metrics::{TokenMetricsConnector, TokenMetricsSourceConfig};

use crate::error::FetchError;
use async_trait::async_trait;
use common::{RawRecord, SourceKind};
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::pin::pin;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

/// A source that yields a batch of raw records per cycle
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError>;
}

/// Per-token market-metric lookup
#[async_trait]
pub trait TokenMetricsLookup: Send + Sync {
    async fn fetch_token(&self, address: &str) -> Result<RawRecord, FetchError>;
}

/// Token lookups gathered in one fan-out
#[derive(Debug, Default)]
pub struct TokenMetricsBatch {
    pub records: Vec<RawRecord>,
    /// Lookups were still running when the deadline passed
    pub deadline_hit: bool,
}

/// Look up metrics for many tokens with at most `max_concurrent` requests in flight.
/// Failed lookups are logged and skipped. Lookups still running at `deadline` are dropped;
/// those that finished before it are kept.
pub async fn fetch_token_metrics(
    lookup: &dyn TokenMetricsLookup,
    addresses: &[String],
    max_concurrent: usize,
    deadline: Option<Instant>,
) -> TokenMetricsBatch {
    let mut lookups = pin!(stream::iter(addresses)
        .map(|address| async move {
            match lookup.fetch_token(address).await {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping token metrics for {}: {}", address, e);
                    None
                }
            }
        })
        .buffer_unordered(max_concurrent.max(1)));

    let mut batch = TokenMetricsBatch::default();
    loop {
        let next = match deadline {
            Some(deadline) => match timeout_at(deadline, lookups.next()).await {
                Ok(next) => next,
                Err(_) => {
                    batch.deadline_hit = true;
                    break;
                }
            },
            None => lookups.next().await,
        };
        match next {
            Some(Some(record)) => batch.records.push(record),
            Some(None) => {}
            None => break,
        }
    }

    if batch.deadline_hit {
        warn!(
            "⚠️ Token lookups cut off at the deadline with {}/{} tokens fetched",
            batch.records.len(),
            addresses.len()
        );
    } else {
        info!("Fetched token metrics for {}/{} tokens", batch.records.len(), addresses.len());
    }
    batch
}

/// Distinct base-token mints of a pool listing, in listing order
pub fn pool_token_addresses(pools: &[RawRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    pools
        .iter()
        .filter_map(|pool| pool.str_field("mintA"))
        .filter(|mint| !mint.is_empty() && seen.insert(mint.to_string()))
        .map(str::to_string)
        .collect()
}

/// Numeric value that may arrive as a JSON number or a numeric string
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Normalize a numeric field, leaving unparseable values untouched for the validator to reject
pub(crate) fn numeric_or_raw(value: Option<&Value>, default: f64) -> Value {
    match value {
        None | Some(Value::Null) => Value::from(default),
        Some(v) => as_number(v).map(Value::from).unwrap_or_else(|| v.clone()),
    }
}
