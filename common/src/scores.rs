use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Clip into [0, 1]
pub fn clip_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Round to two decimals for auditable output
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Coarse polarity of a sentiment score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Label for a [0, 1] score using the 0.6 / 0.4 bands
    pub fn from_score(score: f64) -> Self {
        if score > 0.6 {
            SentimentLabel::Positive
        } else if score < 0.4 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

/// Five-band sentiment category produced by the composite scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentCategory {
    StrongPositive,
    Positive,
    Neutral,
    Negative,
    StrongNegative,
}

impl SentimentCategory {
    pub fn label(&self) -> SentimentLabel {
        match self {
            SentimentCategory::StrongPositive | SentimentCategory::Positive => SentimentLabel::Positive,
            SentimentCategory::Neutral => SentimentLabel::Neutral,
            SentimentCategory::Negative | SentimentCategory::StrongNegative => SentimentLabel::Negative,
        }
    }
}

impl fmt::Display for SentimentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SentimentCategory::StrongPositive => "strong_positive",
            SentimentCategory::Positive => "positive",
            SentimentCategory::Neutral => "neutral",
            SentimentCategory::Negative => "negative",
            SentimentCategory::StrongNegative => "strong_negative",
        };
        f.write_str(name)
    }
}

/// Scored sentiment for one subject (post, call)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub subject_id: String,
    pub score: f64, // 0.0 to 1.0
    pub label: SentimentLabel,
    pub category: SentimentCategory,
    pub components: BTreeMap<String, f64>,
}

/// Market metrics mapped to bounded sub-scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMetrics {
    pub liquidity: f64,
    pub volume: f64,
    pub price_action: f64,
}

impl NormalizedMetrics {
    /// No-information state
    pub const NEUTRAL: NormalizedMetrics = NormalizedMetrics {
        liquidity: 0.5,
        volume: 0.5,
        price_action: 0.5,
    };

    pub fn rounded(&self) -> Self {
        Self {
            liquidity: round2(self.liquidity),
            volume: round2(self.volume),
            price_action: round2(self.price_action),
        }
    }

    pub fn is_bounded(&self) -> bool {
        [self.liquidity, self.volume, self.price_action]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }
}

impl Default for NormalizedMetrics {
    fn default() -> Self {
        Self::NEUTRAL
    }
}
