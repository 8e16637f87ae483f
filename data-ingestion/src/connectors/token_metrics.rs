use super::{as_number, TokenMetricsLookup};
use crate::client::{FetchRequest, RateLimitedClient, RetryPolicy, Transport};
use crate::error::FetchError;
use async_trait::async_trait;
use chrono::Utc;
use common::{RawRecord, SourceKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// USD size above which a single transaction counts as a whale trade
pub const WHALE_THRESHOLD_USD: f64 = 100_000.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetricsSourceConfig {
    pub endpoint: String,

    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,

    /// Lookups in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for TokenMetricsSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.dexscreener.com/latest/dex".to_string(),
            rate_limit: default_rate_limit(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_rate_limit() -> f64 {
    5.0
}

fn default_max_concurrent() -> usize {
    4
}

/// Per-token market metrics, aggregated across every trading pair of the token
pub struct TokenMetricsConnector {
    client: RateLimitedClient,
    endpoint: String,
    max_concurrent: usize,
}

impl TokenMetricsConnector {
    pub fn new(config: TokenMetricsSourceConfig, transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        let client = RateLimitedClient::new(
            SourceKind::TokenMetrics.as_str(),
            transport,
            config.rate_limit,
            retry,
            validate_pairs_response,
        );
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            max_concurrent: config.max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

#[async_trait]
impl TokenMetricsLookup for TokenMetricsConnector {
    async fn fetch_token(&self, address: &str) -> Result<RawRecord, FetchError> {
        let request = FetchRequest::get(format!("{}/tokens/{}", self.endpoint, address));
        let response = self.client.fetch(&request).await?;

        let pairs = response
            .get("pairs")
            .and_then(Value::as_array)
            .filter(|pairs| !pairs.is_empty())
            .ok_or_else(|| {
                FetchError::permanent(self.client.name(), format!("no pairs found for {address}"))
            })?;

        debug!("{} pairs for token {}", pairs.len(), address);
        Ok(aggregate_pairs(address, pairs))
    }
}

/// `pairs` array whose entries carry chain, dex, both tokens, price and volume
pub fn validate_pairs_response(response: &Value) -> bool {
    let Some(pairs) = response.get("pairs").and_then(Value::as_array) else {
        return false;
    };
    pairs.iter().all(|pair| {
        ["chainId", "dexId", "baseToken", "quoteToken", "priceUsd", "volume"]
            .iter()
            .all(|field| pair.get(field).is_some())
    })
}

fn pair_number(pair: &Value, pointer: &str) -> Option<f64> {
    pair.pointer(pointer).and_then(as_number)
}

fn aggregate_pairs(address: &str, pairs: &[Value]) -> RawRecord {
    let volume_24h: f64 = pairs.iter().filter_map(|p| pair_number(p, "/volume/h24")).sum();
    let liquidity_usd: f64 = pairs.iter().filter_map(|p| pair_number(p, "/liquidity/usd")).sum();

    let h6: Vec<f64> = pairs.iter().filter_map(|p| pair_number(p, "/volume/h6")).collect();
    let volume_6h = (!h6.is_empty()).then(|| h6.iter().sum::<f64>());

    let changes: Vec<f64> = pairs.iter().filter_map(|p| pair_number(p, "/priceChange/h24")).collect();
    let price_change_pct = (!changes.is_empty()).then(|| changes.iter().sum::<f64>() / changes.len() as f64);

    let whale_volumes: Vec<f64> = pairs
        .iter()
        .filter_map(|p| p.pointer("/txns/h24").and_then(Value::as_array))
        .flatten()
        .filter_map(|tx| tx.get("volumeUsd").and_then(as_number))
        .filter(|volume| *volume > WHALE_THRESHOLD_USD)
        .collect();

    let first = &pairs[0];

    RawRecord::new(
        SourceKind::TokenMetrics,
        json!({
            "address": address,
            "symbol": first.pointer("/baseToken/symbol"),
            "price_usd": first.get("priceUsd").and_then(as_number),
            "volume_24h": volume_24h,
            "volume_6h": volume_6h,
            "liquidity_usd": liquidity_usd,
            "price_change_pct": price_change_pct,
            "whale_transactions": whale_volumes.len(),
            "whale_volume_usd": whale_volumes.iter().sum::<f64>(),
            "pairs_count": pairs.len(),
            "observed_at": Utc::now(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{fast_retry, ScriptedTransport};

    fn connector(transport: Arc<ScriptedTransport>) -> TokenMetricsConnector {
        TokenMetricsConnector::new(
            TokenMetricsSourceConfig {
                endpoint: "http://dex.local".to_string(),
                rate_limit: 100.0,
                max_concurrent: 2,
            },
            transport,
            fast_retry(2),
        )
    }

    #[tokio::test]
    async fn test_pairs_are_aggregated() {
        let body = json!({
            "pairs": [
                {
                    "chainId": "solana", "dexId": "raydium",
                    "baseToken": {"symbol": "BONK"}, "quoteToken": {"symbol": "SOL"},
                    "priceUsd": "0.000021",
                    "volume": {"h24": 400000.0, "h6": 150000.0},
                    "liquidity": {"usd": 250000.0},
                    "priceChange": {"h24": 4.0},
                    "txns": {"h24": [{"volumeUsd": 150000.0}, {"volumeUsd": 2000.0}]}
                },
                {
                    "chainId": "solana", "dexId": "orca",
                    "baseToken": {"symbol": "BONK"}, "quoteToken": {"symbol": "USDC"},
                    "priceUsd": "0.000022",
                    "volume": {"h24": 100000.0},
                    "liquidity": {"usd": 50000.0},
                    "priceChange": {"h24": 2.0}
                }
            ]
        });
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(body)]));
        let connector = connector(transport.clone());

        let record = connector.fetch_token("DezX").await.unwrap();
        let payload = &record.payload;

        assert_eq!(payload["symbol"], json!("BONK"));
        assert_eq!(payload["price_usd"], json!(0.000021));
        assert_eq!(payload["volume_24h"], json!(500000.0));
        assert_eq!(payload["volume_6h"], json!(150000.0));
        assert_eq!(payload["liquidity_usd"], json!(300000.0));
        assert_eq!(payload["price_change_pct"], json!(3.0));
        assert_eq!(payload["whale_transactions"], json!(1));
        assert_eq!(payload["whale_volume_usd"], json!(150000.0));
        assert_eq!(payload["pairs_count"], json!(2));
        assert!(payload["observed_at"].is_string());

        assert_eq!(transport.requests.lock().unwrap()[0].url, "http://dex.local/tokens/DezX");
    }

    #[tokio::test]
    async fn test_empty_pairs_is_not_found() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(json!({"pairs": []}))]));
        let err = connector(transport).fetch_token("nothing").await.unwrap_err();
        assert!(matches!(err, FetchError::Permanent { .. }));
        assert!(err.to_string().contains("no pairs found"));
    }

    #[test]
    fn test_pairs_shape() {
        assert!(!validate_pairs_response(&json!({"pairs": null})));
        assert!(!validate_pairs_response(&json!({
            "pairs": [{"chainId": "solana", "dexId": "raydium", "priceUsd": "1"}]
        })));
    }
}
