// Record Validators
// Structural and relevance checks applied to raw source records before scoring

use chrono::{DateTime, Utc};
use data_ingestion::mentions_trade_action;
use common::{ForumCall, LiquidityPool, RawRecord, SocialPost, SourceKind, TokenMetrics, ValidatedRecord, Engagement};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Domain keywords; a post or call must mention at least one (case-insensitive substring)
pub const CRYPTO_KEYWORDS: [&str; 22] = [
    "bitcoin", "btc", "ethereum", "eth", "crypto", "token", "blockchain", "defi", "nft", "solana", "sol",
    "trading", "market", "price", "bull", "bear", "buy", "sell", "long", "short", "hodl", "moon",
];

/// Why a record did not pass. A filtering outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    MissingField(&'static str),
    EmptyText,
    NotRelevant,
    NoTradingAction,
    NotNumeric(&'static str),
    Negative(&'static str, f64),
    ConfidenceOutOfRange(f64),
    InvalidTimestamp(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingField(field) => write!(f, "missing or empty field `{field}`"),
            Rejection::EmptyText => write!(f, "text is empty"),
            Rejection::NotRelevant => write!(f, "no domain keyword"),
            Rejection::NoTradingAction => write!(f, "no trading action keyword"),
            Rejection::NotNumeric(field) => write!(f, "field `{field}` is not numeric"),
            Rejection::Negative(field, value) => write!(f, "field `{field}` is negative ({value})"),
            Rejection::ConfidenceOutOfRange(value) => write!(f, "confidence {value} outside [0, 1]"),
            Rejection::InvalidTimestamp(raw) => write!(f, "unparseable timestamp `{raw}`"),
        }
    }
}

fn required_str(payload: &Value, field: &'static str) -> Result<String, Rejection> {
    match payload.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(Rejection::MissingField(field)),
    }
}

fn optional_str(payload: &Value, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// `None` when absent or null; a present value must be a finite JSON number
fn optional_number(payload: &Value, field: &'static str) -> Result<Option<f64>, Rejection> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or(Rejection::NotNumeric(field)),
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, Rejection> {
    if value < 0.0 {
        Err(Rejection::Negative(field, value))
    } else {
        Ok(value)
    }
}

fn required_non_negative(payload: &Value, field: &'static str) -> Result<f64, Rejection> {
    let value = optional_number(payload, field)?.ok_or(Rejection::MissingField(field))?;
    non_negative(field, value)
}

fn optional_non_negative(payload: &Value, field: &'static str) -> Result<Option<f64>, Rejection> {
    optional_number(payload, field)?
        .map(|value| non_negative(field, value))
        .transpose()
}

fn optional_count(payload: &Value, field: &'static str) -> Result<u64, Rejection> {
    Ok(optional_non_negative(payload, field)?.unwrap_or(0.0) as u64)
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let text = text.to_lowercase();
    keywords.iter().any(|keyword| text.contains(keyword))
}

/// Per-source validation predicates
#[derive(Debug, Clone, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_social_post(&self, payload: &Value) -> Result<SocialPost, Rejection> {
        let id = required_str(payload, "id")?;
        let author_id = required_str(payload, "author_id")?;
        let created_at = required_str(payload, "created_at")?;
        let text = match payload.get("text").and_then(Value::as_str) {
            None => return Err(Rejection::MissingField("text")),
            Some(text) if text.trim().is_empty() => return Err(Rejection::EmptyText),
            Some(text) => text.to_string(),
        };
        if !contains_any(&text, &CRYPTO_KEYWORDS) {
            return Err(Rejection::NotRelevant);
        }

        let engagement = Engagement::new(
            optional_non_negative(payload, "likes")?.unwrap_or(0.0),
            optional_non_negative(payload, "retweets")?.unwrap_or(0.0),
            optional_non_negative(payload, "comments")?.unwrap_or(0.0),
        );

        Ok(SocialPost {
            id,
            author_id,
            text,
            created_at,
            engagement,
            author_username: optional_str(payload, "author_username"),
            author_verified: payload
                .get("author_verified")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    pub fn validate_pool(&self, payload: &Value) -> Result<LiquidityPool, Rejection> {
        Ok(LiquidityPool {
            id: required_str(payload, "id")?,
            mint_a: required_str(payload, "mintA")?,
            mint_b: required_str(payload, "mintB")?,
            tvl: required_non_negative(payload, "tvl")?,
            price: required_non_negative(payload, "price")?,
            volume_24h: optional_non_negative(payload, "volume_24h")?.unwrap_or(0.0),
            fee_24h: optional_non_negative(payload, "fee_24h")?.unwrap_or(0.0),
            apy: optional_non_negative(payload, "apy")?.unwrap_or(0.0),
        })
    }

    /// Price change is signed and exempt from the non-negative check
    pub fn validate_token_metrics(&self, payload: &Value) -> Result<TokenMetrics, Rejection> {
        let observed_at = match payload.get("observed_at").and_then(Value::as_str) {
            None => Utc::now(),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| Rejection::InvalidTimestamp(raw.to_string()))?,
        };

        Ok(TokenMetrics {
            address: required_str(payload, "address")?,
            symbol: optional_str(payload, "symbol"),
            price_usd: required_non_negative(payload, "price_usd")?,
            volume_24h: required_non_negative(payload, "volume_24h")?,
            volume_6h: optional_non_negative(payload, "volume_6h")?,
            liquidity_usd: required_non_negative(payload, "liquidity_usd")?,
            price_change_pct: optional_number(payload, "price_change_pct")?,
            whale_transactions: optional_count(payload, "whale_transactions")?,
            whale_volume_usd: optional_non_negative(payload, "whale_volume_usd")?.unwrap_or(0.0),
            pairs_count: optional_count(payload, "pairs_count")?,
            observed_at,
        })
    }

    pub fn validate_forum_call(&self, payload: &Value) -> Result<ForumCall, Rejection> {
        let post_id = required_str(payload, "post_id")?;
        let author = required_str(payload, "author")?;
        let content = required_str(payload, "content")?;
        let timestamp = required_str(payload, "timestamp")?;

        if !mentions_trade_action(&content) {
            return Err(Rejection::NoTradingAction);
        }
        if !contains_any(&content, &CRYPTO_KEYWORDS) {
            return Err(Rejection::NotRelevant);
        }

        let confidence = optional_number(payload, "confidence")?;
        if let Some(value) = confidence {
            if !(0.0..=1.0).contains(&value) {
                return Err(Rejection::ConfidenceOutOfRange(value));
            }
        }

        let targets = payload
            .get("targets")
            .and_then(Value::as_array)
            .map(|targets| targets.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();

        Ok(ForumCall {
            post_id,
            author,
            content,
            timestamp,
            sentiment: optional_str(payload, "sentiment"),
            confidence,
            targets,
            stop_loss: optional_number(payload, "stop_loss")?,
            take_profit: optional_number(payload, "take_profit")?,
        })
    }

    /// Dispatch on the record's source
    pub fn validate(&self, record: &RawRecord) -> Result<ValidatedRecord, Rejection> {
        let payload = &record.payload;
        match record.source {
            SourceKind::SocialPost => self.validate_social_post(payload).map(ValidatedRecord::SocialPost),
            SourceKind::Pool => self.validate_pool(payload).map(ValidatedRecord::Pool),
            SourceKind::TokenMetrics => self.validate_token_metrics(payload).map(ValidatedRecord::TokenMetrics),
            SourceKind::ForumCall => self.validate_forum_call(payload).map(ValidatedRecord::ForumCall),
        }
    }

    /// Keep the records that pass; rejections are logged, never raised
    pub fn filter_valid(&self, records: &[RawRecord]) -> Vec<ValidatedRecord> {
        let mut totals: BTreeMap<SourceKind, (usize, usize)> = BTreeMap::new();
        let mut valid = Vec::with_capacity(records.len());

        for record in records {
            let entry = totals.entry(record.source).or_default();
            entry.1 += 1;
            match self.validate(record) {
                Ok(validated) => {
                    entry.0 += 1;
                    valid.push(validated);
                }
                Err(rejection) => {
                    warn!("Rejected {} record: {}", record.source, rejection);
                }
            }
        }

        for (source, (passed, total)) in &totals {
            info!("Validated {}/{} {} records", passed, total, source);
        }
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_ingestion::{parse_trading_call, TradeAction};
    use serde_json::json;

    fn social(text: &str) -> Value {
        json!({
            "id": "1", "author_id": "a", "created_at": "2024-03-01T00:00:00Z",
            "text": text, "likes": 10, "retweets": 2, "comments": null
        })
    }

    #[test]
    fn test_social_post_rules() {
        let validator = Validator::new();

        let post = validator.validate_social_post(&social("Loading up on $SOL")).unwrap();
        assert_eq!(post.engagement, Engagement::new(10.0, 2.0, 0.0));

        assert_eq!(validator.validate_social_post(&social("   ")), Err(Rejection::EmptyText));
        assert_eq!(
            validator.validate_social_post(&social("lovely weather today")),
            Err(Rejection::NotRelevant)
        );
        assert_eq!(
            validator.validate_social_post(&json!({"id": "1", "author_id": "a", "text": "btc"})),
            Err(Rejection::MissingField("created_at"))
        );

        let mut negative = social("btc");
        negative["likes"] = json!(-3);
        assert_eq!(validator.validate_social_post(&negative), Err(Rejection::Negative("likes", -3.0)));
    }

    #[test]
    fn test_pool_rules() {
        let validator = Validator::new();
        let pool = json!({"id": "p", "mintA": "A", "mintB": "B", "tvl": 10.0, "price": 1.5});
        assert_eq!(validator.validate_pool(&pool).unwrap().volume_24h, 0.0);

        let mut bad = pool.clone();
        bad["tvl"] = json!(-1.0);
        assert!(matches!(validator.validate_pool(&bad), Err(Rejection::Negative("tvl", _))));

        let mut bad = pool.clone();
        bad["price"] = json!("n/a");
        assert_eq!(validator.validate_pool(&bad), Err(Rejection::NotNumeric("price")));

        let mut bad = pool;
        bad["mintB"] = json!("");
        assert_eq!(validator.validate_pool(&bad), Err(Rejection::MissingField("mintB")));
    }

    #[test]
    fn test_token_metrics_allow_negative_price_change() {
        let validator = Validator::new();
        let metrics = json!({
            "address": "So111", "price_usd": 150.0, "volume_24h": 1e6, "liquidity_usd": 5e5,
            "price_change_pct": -7.5, "whale_transactions": 2, "observed_at": "2024-03-01T12:00:00Z"
        });
        let parsed = validator.validate_token_metrics(&metrics).unwrap();
        assert_eq!(parsed.price_change_pct, Some(-7.5));
        assert_eq!(parsed.whale_transactions, 2);
        assert_eq!(parsed.volume_6h, None);

        let mut bad = metrics;
        bad["liquidity_usd"] = json!(-5.0);
        assert!(validator.validate_token_metrics(&bad).is_err());
    }

    #[test]
    fn test_forum_call_rules() {
        let validator = Validator::new();
        let call = |content: &str, confidence: Value| {
            json!({
                "post_id": "p", "author": "x", "timestamp": "2024-03-01T00:00:00Z",
                "content": content, "confidence": confidence
            })
        };

        assert!(validator.validate_forum_call(&call("buy ETH at 3000", json!(0.9))).is_ok());
        assert_eq!(
            validator.validate_forum_call(&call("eth looks heavy", json!(0.9))),
            Err(Rejection::NoTradingAction)
        );
        assert_eq!(
            validator.validate_forum_call(&call("buy ETH", json!(1.4))),
            Err(Rejection::ConfidenceOutOfRange(1.4))
        );
        assert!(validator.validate_forum_call(&call("short btc", Value::Null)).is_ok());
    }

    #[test]
    fn test_forum_action_must_be_a_whole_word() {
        let validator = Validator::new();
        let call = |content: &str| {
            json!({"post_id": "p", "author": "x", "timestamp": "2024-03-01T00:00:00Z", "content": content})
        };

        // "selling" and "longer" only contain the action words
        assert_eq!(
            validator.validate_forum_call(&call("selling my ETH bags")),
            Err(Rejection::NoTradingAction)
        );
        assert_eq!(
            validator.validate_forum_call(&call("holding SOL longer")),
            Err(Rejection::NoTradingAction)
        );

        let accepted = validator.validate_forum_call(&call("Sell ETH now")).unwrap();
        assert_eq!(parse_trading_call(&accepted.content).action, Some(TradeAction::Sell));
    }

    #[test]
    fn test_filter_valid_drops_rejections() {
        let records = vec![
            RawRecord::new(SourceKind::SocialPost, social("eth to the moon")),
            RawRecord::new(SourceKind::SocialPost, social("")),
            RawRecord::new(SourceKind::Pool, json!({"id": "p"})),
            RawRecord::new(
                SourceKind::Pool,
                json!({"id": "p2", "mintA": "A", "mintB": "B", "tvl": 1.0, "price": 2.0}),
            ),
        ];

        let valid = Validator::new().filter_valid(&records);
        assert_eq!(valid.len(), 2);
        assert_eq!(valid[0].source(), SourceKind::SocialPost);
        assert_eq!(valid[1].natural_key(), "p2");
    }
}
