use super::{numeric_or_raw, SourceConnector};
use crate::client::{FetchRequest, RateLimitedClient, RetryPolicy, Transport};
use crate::error::FetchError;
use async_trait::async_trait;
use common::{RawRecord, SourceKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSourceConfig {
    pub endpoint: String,

    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
}

impl Default for PoolSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.raydium.io/v2".to_string(),
            rate_limit: default_rate_limit(),
        }
    }
}

fn default_rate_limit() -> f64 {
    2.0
}

/// Liquidity pool listing connector
pub struct PoolConnector {
    client: RateLimitedClient,
    endpoint: String,
}

impl PoolConnector {
    pub fn new(config: PoolSourceConfig, transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        let client = RateLimitedClient::new(
            SourceKind::Pool.as_str(),
            transport,
            config.rate_limit,
            retry,
            validate_pool_listing,
        );
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SourceConnector for PoolConnector {
    fn kind(&self) -> SourceKind {
        SourceKind::Pool
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let request = FetchRequest::get(format!("{}/pools", self.endpoint));
        let response = self.client.fetch(&request).await?;

        let pools: Vec<RawRecord> = response
            .get("data")
            .and_then(Value::as_array)
            .map(|pools| pools.iter().map(pool_payload).collect())
            .unwrap_or_default();

        info!("✅ Fetched {} liquidity pools", pools.len());
        Ok(pools)
    }
}

/// `success: true` plus a `data` array of pools with identity and pricing fields
pub fn validate_pool_listing(response: &Value) -> bool {
    if response.get("success").and_then(Value::as_bool) != Some(true) {
        return false;
    }
    let Some(pools) = response.get("data").and_then(Value::as_array) else {
        return false;
    };
    pools.iter().all(|pool| {
        ["id", "mintA", "mintB", "tvl", "price"]
            .iter()
            .all(|field| pool.get(field).is_some())
    })
}

fn pool_payload(pool: &Value) -> RawRecord {
    RawRecord::new(
        SourceKind::Pool,
        json!({
            "id": pool.get("id"),
            "mintA": pool.get("mintA"),
            "mintB": pool.get("mintB"),
            "tvl": numeric_or_raw(pool.get("tvl"), 0.0),
            "price": numeric_or_raw(pool.get("price"), 0.0),
            "volume_24h": numeric_or_raw(pool.get("volume24h"), 0.0),
            "fee_24h": numeric_or_raw(pool.get("fee24h"), 0.0),
            "apy": numeric_or_raw(pool.get("apy"), 0.0),
        }),
    )
}
