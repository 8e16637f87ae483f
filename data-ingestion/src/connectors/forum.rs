use super::{as_number, SourceConnector};
use crate::client::{FetchRequest, RateLimitedClient, RetryPolicy, Transport};
use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{RawRecord, SourceKind};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

lazy_static! {
    static ref PRICE: Regex = Regex::new(r"\$?\d+(?:,\d{3})*(?:\.\d+)?[kKmM]?").unwrap();
    static ref BUY_WORDS: Regex = Regex::new(r"(?i)\b(buy|long)\b").unwrap();
    static ref SELL_WORDS: Regex = Regex::new(r"(?i)\b(sell|short)\b").unwrap();
    static ref STOP_WORDS: Regex = Regex::new(r"(?i)\b(sl|stop)\b").unwrap();
    static ref TARGET_WORDS: Regex = Regex::new(r"(?i)\b(tp|target)\b").unwrap();
}

/// Forum trading-call source: an HTTP endpoint or a local JSON export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumSourceConfig {
    pub location: String,

    /// Requests per second (HTTP locations only)
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

impl Default for ForumSourceConfig {
    fn default() -> Self {
        Self {
            location: "data/forum_calls.json".to_string(),
            rate_limit: default_rate_limit(),
            lookback_days: default_lookback_days(),
        }
    }
}

fn default_rate_limit() -> f64 {
    1.0
}

fn default_lookback_days() -> i64 {
    7
}

pub struct ForumConnector {
    client: RateLimitedClient,
    config: ForumSourceConfig,
}

impl ForumConnector {
    pub fn new(config: ForumSourceConfig, transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        let client = RateLimitedClient::new(
            SourceKind::ForumCall.as_str(),
            transport,
            config.rate_limit,
            retry,
            validate_call_export,
        );
        Self { client, config }
    }

    fn is_remote(&self) -> bool {
        self.config.location.starts_with("http://") || self.config.location.starts_with("https://")
    }

    async fn read_export(&self) -> Result<Value, FetchError> {
        if self.is_remote() {
            return self.client.fetch(&FetchRequest::get(&self.config.location)).await;
        }

        let name = self.client.name();
        let contents = tokio::fs::read_to_string(&self.config.location)
            .await
            .map_err(|e| FetchError::permanent(name, format!("reading {}: {}", self.config.location, e)))?;
        let export: Value = serde_json::from_str(&contents)
            .map_err(|e| FetchError::permanent(name, format!("parsing {}: {}", self.config.location, e)))?;

        if !validate_call_export(&export) {
            return Err(FetchError::InvalidShape {
                source_name: name.to_string(),
            });
        }
        Ok(export)
    }
}

#[async_trait]
impl SourceConnector for ForumConnector {
    fn kind(&self) -> SourceKind {
        SourceKind::ForumCall
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let export = self.read_export().await?;
        let cutoff = Utc::now() - Duration::days(self.config.lookback_days);

        let calls = export
            .get("calls")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let total = calls.len();

        let recent: Vec<RawRecord> = calls
            .iter()
            .filter(|call| is_recent(call, cutoff))
            .map(call_payload)
            .collect();

        info!("✅ Fetched {} forum calls ({} within lookback)", total, recent.len());
        Ok(recent)
    }
}

/// `calls` array whose entries carry post id, author, content and timestamp
pub fn validate_call_export(export: &Value) -> bool {
    let Some(calls) = export.get("calls").and_then(Value::as_array) else {
        return false;
    };
    calls.iter().all(|call| {
        ["post_id", "author", "content", "timestamp"]
            .iter()
            .all(|field| call.get(field).is_some())
    })
}

/// Calls with an unreadable timestamp are kept; the validator decides on them
fn is_recent(call: &Value, cutoff: DateTime<Utc>) -> bool {
    let Some(timestamp) = call.get("timestamp").and_then(Value::as_str) else {
        return true;
    };
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(ts) => ts.with_timezone(&Utc) >= cutoff,
        Err(_) => {
            debug!("Keeping forum call with unparsed timestamp {}", timestamp);
            true
        }
    }
}

fn call_payload(call: &Value) -> RawRecord {
    let content = call.get("content").and_then(Value::as_str).unwrap_or_default();
    let parsed = parse_trading_call(content);

    let targets = call
        .get("targets")
        .and_then(Value::as_array)
        .map(|targets| targets.iter().filter_map(as_number).collect::<Vec<f64>>())
        .unwrap_or_default();

    RawRecord::new(
        SourceKind::ForumCall,
        json!({
            "post_id": call.get("post_id"),
            "author": call.get("author"),
            "content": call.get("content"),
            "timestamp": call.get("timestamp"),
            "sentiment": call.get("sentiment").cloned().unwrap_or_else(|| json!("neutral")),
            "confidence": call.get("confidence").cloned().unwrap_or_else(|| json!(0.5)),
            "targets": targets,
            "stop_loss": call.get("stop_loss").and_then(as_number).or(parsed.stop_loss),
            "take_profit": call.get("take_profit").and_then(as_number).or(parsed.take_profit),
        }),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// Structured reading of a free-text trading call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TradingCall {
    pub action: Option<TradeAction>,
    /// Every price mentioned, in order of appearance
    pub prices: Vec<f64>,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// `$1,200` -> 1200, `3.5k` -> 3500, `2M` -> 2000000
fn parse_price(raw: &str) -> Option<f64> {
    let cleaned = raw.trim_start_matches('$').replace(',', "");
    let (digits, multiplier) = match cleaned.chars().last() {
        Some('k' | 'K') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('m' | 'M') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };
    digits.parse::<f64>().ok().map(|value| value * multiplier)
}

fn first_price_after(content: &str, keyword: &Regex) -> Option<f64> {
    let start = keyword.find(content)?.end();
    PRICE
        .find(&content[start..])
        .and_then(|m| parse_price(m.as_str()))
}

/// Whether the text names a buy or sell action as a whole word
pub fn mentions_trade_action(content: &str) -> bool {
    BUY_WORDS.is_match(content) || SELL_WORDS.is_match(content)
}

pub fn parse_trading_call(content: &str) -> TradingCall {
    let action = if BUY_WORDS.is_match(content) {
        Some(TradeAction::Buy)
    } else if SELL_WORDS.is_match(content) {
        Some(TradeAction::Sell)
    } else {
        None
    };

    // Entry is the first price mentioned before any stop or target keyword
    let levels_start = [&*STOP_WORDS, &*TARGET_WORDS]
        .iter()
        .filter_map(|keyword| keyword.find(content).map(|m| m.start()))
        .min()
        .unwrap_or(content.len());

    let mut prices = Vec::new();
    let mut entry_price = None;
    for m in PRICE.find_iter(content) {
        if let Some(price) = parse_price(m.as_str()) {
            if entry_price.is_none() && m.start() < levels_start {
                entry_price = Some(price);
            }
            prices.push(price);
        }
    }

    TradingCall {
        action,
        prices,
        entry_price,
        stop_loss: first_price_after(content, &STOP_WORDS),
        take_profit: first_price_after(content, &TARGET_WORDS),
    }
}

/// Percent move from the call's entry price to the current price
pub fn call_profitability(entry_price: f64, current_price: f64) -> Option<f64> {
    if entry_price <= 0.0 || !entry_price.is_finite() || !current_price.is_finite() {
        return None;
    }
    Some((current_price - entry_price) / entry_price * 100.0)
}
