use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Upstream source a record was ingested from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    SocialPost,
    Pool,
    TokenMetrics,
    ForumCall,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::SocialPost,
        SourceKind::Pool,
        SourceKind::TokenMetrics,
        SourceKind::ForumCall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::SocialPost => "social_post",
            SourceKind::Pool => "pool",
            SourceKind::TokenMetrics => "token_metrics",
            SourceKind::ForumCall => "forum_call",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source payload as received, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: SourceKind,
    pub payload: Value,
}

impl RawRecord {
    pub fn new(source: SourceKind, payload: Value) -> Self {
        Self { source, payload }
    }

    /// String field lookup, `None` when absent or not a string
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }
}

/// Social interaction counts attached to a post
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Engagement {
    pub likes: f64,
    pub retweets: f64,
    pub comments: f64,
}

impl Engagement {
    pub fn new(likes: f64, retweets: f64, comments: f64) -> Self {
        Self { likes, retweets, comments }
    }

    /// Raw interaction volume; reshares and replies count more than likes
    pub fn volume(&self) -> f64 {
        self.likes + self.retweets * 2.0 + self.comments * 3.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    pub id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: String,
    pub engagement: Engagement,
    pub author_username: Option<String>,
    pub author_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub id: String,
    pub mint_a: String,
    pub mint_b: String,
    pub tvl: f64,
    pub price: f64,
    pub volume_24h: f64,
    pub fee_24h: f64,
    pub apy: f64,
}

/// One market-metric snapshot for a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub address: String,
    pub symbol: Option<String>,
    pub price_usd: f64,
    pub volume_24h: f64,
    /// Volume over the trailing 6h, when the provider reports it
    pub volume_6h: Option<f64>,
    pub liquidity_usd: f64,
    /// Signed, unlike every other numeric field
    pub price_change_pct: Option<f64>,
    pub whale_transactions: u64,
    pub whale_volume_usd: f64,
    pub pairs_count: u64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumCall {
    pub post_id: String,
    pub author: String,
    pub content: String,
    pub timestamp: String,
    pub sentiment: Option<String>,
    pub confidence: Option<f64>,
    pub targets: Vec<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// Record that passed the validation gate, tagged by source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ValidatedRecord {
    SocialPost(SocialPost),
    Pool(LiquidityPool),
    TokenMetrics(TokenMetrics),
    ForumCall(ForumCall),
}

impl ValidatedRecord {
    pub fn source(&self) -> SourceKind {
        match self {
            ValidatedRecord::SocialPost(_) => SourceKind::SocialPost,
            ValidatedRecord::Pool(_) => SourceKind::Pool,
            ValidatedRecord::TokenMetrics(_) => SourceKind::TokenMetrics,
            ValidatedRecord::ForumCall(_) => SourceKind::ForumCall,
        }
    }

    /// Natural key used for idempotent upserts
    pub fn natural_key(&self) -> String {
        match self {
            ValidatedRecord::SocialPost(post) => post.id.clone(),
            ValidatedRecord::Pool(pool) => pool.id.clone(),
            ValidatedRecord::TokenMetrics(metrics) => {
                format!("{}:{}", metrics.address, metrics.observed_at.timestamp_millis())
            }
            ValidatedRecord::ForumCall(call) => call.post_id.clone(),
        }
    }
}
