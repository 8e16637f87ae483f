use crate::scores::NormalizedMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Directional recommendation bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl SignalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCategory::StrongBuy => "strong_buy",
            SignalCategory::Buy => "buy",
            SignalCategory::Neutral => "neutral",
            SignalCategory::Sell => "sell",
            SignalCategory::StrongSell => "strong_sell",
        }
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trust label derived from score magnitude and indicator alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-scores that produced a signal, rounded to two decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalComponents {
    pub sentiment: f64,
    pub metrics: NormalizedMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMetadata {
    /// Number of sentiment samples that fed the asset's sentiment score
    pub sentiment_count: usize,
    pub has_metrics: bool,
}

/// Trading signal for one asset in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub asset_id: String,
    pub timestamp: DateTime<Utc>,
    pub category: SignalCategory,
    pub confidence: Confidence,
    pub score: f64, // 0.0 to 1.0, rounded
    pub components: SignalComponents,
    pub metadata: SignalMetadata,
}

impl Signal {
    /// Natural key for idempotent persistence
    pub fn natural_key(&self) -> String {
        format!("{}:{}", self.asset_id, self.timestamp.timestamp_millis())
    }
}
