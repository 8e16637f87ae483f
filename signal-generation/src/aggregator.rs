// Signal Aggregator
// Combines per-asset sentiment and normalized market metrics into a categorized signal

use crate::normalizer::{MarketMetricsInput, MetricNormalizer};
use chrono::Utc;
use common::{
    clip_unit, round2, Confidence, Engagement, NormalizedMetrics, Signal, SignalCategory, SignalComponents,
    SignalMetadata, Uuid,
};
use sentiment_analysis::{simple_polarity, ScoringError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Sentiment and price action closer than this are aligned
const ALIGNED_SPREAD: f64 = 0.3;
/// Sentiment and price action further apart than this contradict each other
const CONTRADICTORY_SPREAD: f64 = 0.6;

/// One sentiment observation attributed to an asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentSample {
    /// Pre-computed score; clipped to [0, 1]
    pub score: Option<f64>,
    /// Raw text, scored with the fallback lexicon when `score` is absent
    pub text: Option<String>,
    pub engagement: Option<Engagement>,
}

impl SentimentSample {
    pub fn scored(score: f64) -> Self {
        Self {
            score: Some(score),
            ..Self::default()
        }
    }

    pub fn with_engagement(mut self, engagement: Engagement) -> Self {
        self.engagement = Some(engagement);
        self
    }
}

/// Everything known about one asset in one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetInput {
    pub sentiment: Vec<SentimentSample>,
    pub metrics: Option<MarketMetricsInput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregationWeights {
    pub sentiment: f64,
    pub liquidity: f64,
    pub volume: f64,
    pub price_action: f64,
}

impl Default for AggregationWeights {
    fn default() -> Self {
        Self {
            sentiment: 0.4,
            liquidity: 0.2,
            volume: 0.2,
            price_action: 0.2,
        }
    }
}

impl AggregationWeights {
    pub fn sum(&self) -> f64 {
        self.sentiment + self.liquidity + self.volume + self.price_action
    }

    pub fn all_non_negative(&self) -> bool {
        [self.sentiment, self.liquidity, self.volume, self.price_action]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }
}

/// Minimums for a buy-side category (all inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuyBand {
    pub min_score: f64,
    pub sentiment_min: f64,
    pub price_action_min: f64,
}

impl BuyBand {
    fn matches(&self, score: f64, sentiment: f64, price_action: f64) -> bool {
        score >= self.min_score && sentiment >= self.sentiment_min && price_action >= self.price_action_min
    }
}

/// Maximums for a sell-side category (all inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SellBand {
    pub max_score: f64,
    pub sentiment_max: f64,
    pub price_action_max: f64,
}

impl SellBand {
    fn matches(&self, score: f64, sentiment: f64, price_action: f64) -> bool {
        score <= self.max_score && sentiment <= self.sentiment_max && price_action <= self.price_action_max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryBands {
    pub strong_buy: BuyBand,
    pub buy: BuyBand,
    pub strong_sell: SellBand,
    pub sell: SellBand,
}

impl Default for CategoryBands {
    fn default() -> Self {
        Self {
            strong_buy: BuyBand {
                min_score: 0.8,
                sentiment_min: 0.7,
                price_action_min: 0.6,
            },
            buy: BuyBand {
                min_score: 0.6,
                sentiment_min: 0.5,
                price_action_min: 0.4,
            },
            strong_sell: SellBand {
                max_score: 0.2,
                sentiment_max: 0.3,
                price_action_max: 0.4,
            },
            sell: SellBand {
                max_score: 0.4,
                sentiment_max: 0.5,
                price_action_max: 0.4,
            },
        }
    }
}

/// Aggregation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default)]
    pub weights: AggregationWeights,

    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,

    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,

    #[serde(default)]
    pub categories: CategoryBands,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            weights: AggregationWeights::default(),
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
            categories: CategoryBands::default(),
        }
    }
}

fn default_high_threshold() -> f64 {
    0.7
}

fn default_medium_threshold() -> f64 {
    0.4
}

/// Stateless across cycles: every call sees only its own inputs
pub struct SignalAggregator {
    config: AggregationConfig,
    normalizer: MetricNormalizer,
}

impl SignalAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self {
            config,
            normalizer: MetricNormalizer::new(),
        }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Engagement-aware mean of the samples; 0.5 when there are none
    pub fn sentiment_score(&self, samples: &[SentimentSample]) -> Result<f64, ScoringError> {
        if samples.is_empty() {
            return Ok(0.5);
        }

        let max_volume = samples
            .iter()
            .filter_map(|s| s.engagement.map(|e| e.volume()))
            .fold(0.0_f64, f64::max);
        let normalized_engagement = |sample: &SentimentSample| {
            sample
                .engagement
                .map(|e| if max_volume > 0.0 { e.volume() / max_volume } else { 0.0 })
        };

        let mut scores = Vec::with_capacity(samples.len());
        let mut weights = Vec::with_capacity(samples.len());
        for sample in samples {
            let engagement = normalized_engagement(sample);
            let score = match (sample.score, &sample.text) {
                (Some(score), _) => clip_unit(score),
                // Text-derived scores are damped for low-engagement posts
                (None, Some(text)) => {
                    let polarity = simple_polarity(text);
                    engagement.map_or(polarity, |e| polarity * (0.5 + 0.5 * e))
                }
                (None, None) => 0.5,
            };
            if !score.is_finite() {
                return Err(ScoringError::NonFinite("sentiment sample"));
            }
            scores.push(score);
            weights.push(engagement);
        }

        let all_weighted: Option<Vec<f64>> = weights.into_iter().collect();
        let mean = match all_weighted {
            Some(weights) if weights.iter().sum::<f64>() > 0.0 => {
                let total: f64 = weights.iter().sum();
                scores.iter().zip(&weights).map(|(s, w)| s * w).sum::<f64>() / total
            }
            _ => scores.iter().sum::<f64>() / scores.len() as f64,
        };
        Ok(mean)
    }

    /// Weighted sum, clamped so caller weights above 1 cannot leave [0, 1]
    pub fn aggregate_score(&self, sentiment: f64, metrics: &NormalizedMetrics) -> f64 {
        let w = &self.config.weights;
        clip_unit(
            w.sentiment * sentiment
                + w.liquidity * metrics.liquidity
                + w.volume * metrics.volume
                + w.price_action * metrics.price_action,
        )
    }

    /// Alignment-driven "low" takes precedence over a mid-range score
    pub fn confidence(&self, score: f64, sentiment: f64, price_action: f64) -> Confidence {
        let spread = (sentiment - price_action).abs();
        if score >= self.config.high_threshold && spread < ALIGNED_SPREAD {
            Confidence::High
        } else if spread > CONTRADICTORY_SPREAD {
            Confidence::Low
        } else if score >= self.config.medium_threshold {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    /// Fixed priority: strong_buy, buy, strong_sell, sell, then neutral
    pub fn categorize(&self, score: f64, sentiment: f64, price_action: f64) -> SignalCategory {
        let bands = &self.config.categories;
        if bands.strong_buy.matches(score, sentiment, price_action) {
            SignalCategory::StrongBuy
        } else if bands.buy.matches(score, sentiment, price_action) {
            SignalCategory::Buy
        } else if bands.strong_sell.matches(score, sentiment, price_action) {
            SignalCategory::StrongSell
        } else if bands.sell.matches(score, sentiment, price_action) {
            SignalCategory::Sell
        } else {
            SignalCategory::Neutral
        }
    }

    /// `Ok(None)` when the asset has neither sentiment nor metrics
    pub fn generate_signal(&self, asset_id: &str, input: &AssetInput) -> Result<Option<Signal>, ScoringError> {
        if input.sentiment.is_empty() && input.metrics.is_none() {
            debug!("No sentiment or metrics for {}, skipping", asset_id);
            return Ok(None);
        }

        let sentiment = self.sentiment_score(&input.sentiment)?;
        let metrics = input
            .metrics
            .map(|m| self.normalizer.normalize(&m))
            .unwrap_or(NormalizedMetrics::NEUTRAL);

        let score = self.aggregate_score(sentiment, &metrics);
        if !score.is_finite() {
            return Err(ScoringError::NonFinite("aggregate score"));
        }
        let confidence = self.confidence(score, sentiment, metrics.price_action);
        let category = self.categorize(score, sentiment, metrics.price_action);

        Ok(Some(Signal {
            id: Uuid::new_v4(),
            asset_id: asset_id.to_string(),
            timestamp: Utc::now(),
            category,
            confidence,
            score: round2(score),
            components: SignalComponents {
                sentiment: round2(sentiment),
                metrics: metrics.rounded(),
            },
            metadata: SignalMetadata {
                sentiment_count: input.sentiment.len(),
                has_metrics: input.metrics.is_some(),
            },
        }))
    }

    /// Independent per asset; a failing asset is logged and left out
    pub fn generate_batch(&self, assets: &BTreeMap<String, AssetInput>) -> Vec<Signal> {
        let mut signals = Vec::with_capacity(assets.len());
        for (asset_id, input) in assets {
            match self.generate_signal(asset_id, input) {
                Ok(Some(signal)) => {
                    debug!(
                        "Signal for {}: {} ({}, score {:.2})",
                        asset_id, signal.category, signal.confidence, signal.score
                    );
                    signals.push(signal);
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to generate signal for {}: {}", asset_id, e),
            }
        }
        info!("Generated {} signals from {} assets", signals.len(), assets.len());
        signals
    }
}

impl Default for SignalAggregator {
    fn default() -> Self {
        Self::new(AggregationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(liquidity: f64, volume_ratio: f64, price_change_pct: f64) -> MarketMetricsInput {
        MarketMetricsInput {
            liquidity: Some(liquidity),
            volume: Some(100.0 * volume_ratio),
            average_volume: Some(100.0),
            price_change_pct: Some(price_change_pct),
        }
    }

    fn input(samples: Vec<SentimentSample>, metrics: Option<MarketMetricsInput>) -> AssetInput {
        AssetInput {
            sentiment: samples,
            metrics,
        }
    }

    #[test]
    fn test_strong_buy_scenario() {
        let aggregator = SignalAggregator::default();
        let signal = aggregator
            .generate_signal("SOL", &input(vec![SentimentSample::scored(0.9)], Some(metrics(1e6, 2.0, 6.0))))
            .unwrap()
            .unwrap();

        assert_eq!(signal.components.metrics.price_action, 0.8);
        assert!(signal.score >= 0.8);
        assert_eq!(signal.category, SignalCategory::StrongBuy);
        assert_eq!(signal.confidence, Confidence::High);
        assert!(signal.metadata.has_metrics);
        assert_eq!(signal.metadata.sentiment_count, 1);
    }

    #[test]
    fn test_strong_sell_scenario() {
        let aggregator = SignalAggregator::default();
        let signal = aggregator
            .generate_signal("BONK", &input(vec![SentimentSample::scored(0.2)], Some(metrics(0.0, 0.25, -7.0))))
            .unwrap()
            .unwrap();

        assert_eq!(signal.components.metrics.price_action, 0.15);
        assert!(signal.score <= 0.2);
        assert_eq!(signal.category, SignalCategory::StrongSell);
    }

    #[test]
    fn test_zero_metrics_without_sentiment() {
        let aggregator = SignalAggregator::default();
        let zero = MarketMetricsInput {
            liquidity: Some(0.0),
            volume: Some(0.0),
            average_volume: Some(0.0),
            price_change_pct: Some(0.0),
        };
        let signal = aggregator.generate_signal("ZERO", &input(vec![], Some(zero))).unwrap().unwrap();

        assert_eq!(signal.components.sentiment, 0.5);
        assert_eq!(signal.components.metrics.liquidity, 0.0);
        assert_eq!(signal.components.metrics.volume, 0.5);
        assert_eq!(signal.score, 0.4);
        assert_eq!(signal.confidence, Confidence::Medium);
        assert_eq!(signal.category, SignalCategory::Neutral);
        assert_eq!(signal.metadata.sentiment_count, 0);
    }

    #[test]
    fn test_contradiction_overrides_high_score() {
        let aggregator = SignalAggregator::default();
        for score in [0.7, 0.8, 0.95] {
            assert_eq!(aggregator.confidence(score, 1.0, 0.2), Confidence::Low);
            assert_eq!(aggregator.confidence(score, 0.1, 0.8), Confidence::Low);
        }
        assert_eq!(aggregator.confidence(0.5, 0.9, 0.2), Confidence::Low);
        assert_eq!(aggregator.confidence(0.5, 0.6, 0.4), Confidence::Medium);
        assert_eq!(aggregator.confidence(0.3, 0.5, 0.5), Confidence::Low);
    }

    #[test]
    fn test_category_and_confidence_are_independent() {
        let config = AggregationConfig {
            high_threshold: 0.95,
            ..AggregationConfig::default()
        };
        let aggregator = SignalAggregator::new(config);
        // score 0.85, sentiment 1.0, price action 0.6: strong_buy, spread 0.4 is not aligned
        assert_eq!(aggregator.categorize(0.85, 1.0, 0.6), SignalCategory::StrongBuy);
        assert_eq!(aggregator.confidence(0.85, 1.0, 0.6), Confidence::Medium);
    }

    #[test]
    fn test_category_priority_is_monotonic() {
        let aggregator = SignalAggregator::default();
        let rank = |c: SignalCategory| match c {
            SignalCategory::StrongSell => 0,
            SignalCategory::Sell => 1,
            SignalCategory::Neutral => 2,
            SignalCategory::Buy => 3,
            SignalCategory::StrongBuy => 4,
        };

        for (sentiment, price_action) in [(0.9, 0.8), (0.6, 0.5), (0.2, 0.1), (0.45, 0.3), (0.5, 0.5)] {
            let mut previous = None;
            for step in 0..=100 {
                let score = step as f64 / 100.0;
                let current = rank(aggregator.categorize(score, sentiment, price_action));
                if let Some(previous) = previous {
                    assert!(current >= previous, "category fell at score {score}");
                }
                previous = Some(current);
            }
        }
    }

    #[test]
    fn test_no_inputs_is_skipped() {
        let aggregator = SignalAggregator::default();
        assert!(aggregator.generate_signal("NONE", &AssetInput::default()).unwrap().is_none());
    }

    #[test]
    fn test_sentiment_sample_normalization() {
        let aggregator = SignalAggregator::default();

        assert_eq!(aggregator.sentiment_score(&[SentimentSample::scored(1.7)]).unwrap(), 1.0);

        // text-derived, top engagement keeps its full polarity, zero engagement is halved
        let samples = vec![
            SentimentSample {
                text: Some("bullish".to_string()),
                engagement: Some(Engagement::new(10.0, 0.0, 0.0)),
                ..SentimentSample::default()
            },
            SentimentSample {
                text: Some("bullish".to_string()),
                engagement: Some(Engagement::new(0.0, 0.0, 0.0)),
                ..SentimentSample::default()
            },
        ];
        // weights 1.0 and 0.0 -> only the engaged post counts
        assert_eq!(aggregator.sentiment_score(&samples).unwrap(), 1.0);

        let mixed = vec![SentimentSample::scored(0.8), SentimentSample::default()];
        assert!((aggregator.sentiment_score(&mixed).unwrap() - 0.65).abs() < 1e-9);

        assert!(aggregator.sentiment_score(&[SentimentSample::scored(f64::NAN)]).is_err());
    }

    #[test]
    fn test_engagement_weighted_mean() {
        let aggregator = SignalAggregator::default();
        let samples = vec![
            SentimentSample::scored(0.9).with_engagement(Engagement::new(300.0, 0.0, 0.0)),
            SentimentSample::scored(0.3).with_engagement(Engagement::new(100.0, 0.0, 0.0)),
        ];
        // weights 1.0 and 1/3
        let expected = (0.9 + 0.3 / 3.0) / (1.0 + 1.0 / 3.0);
        assert!((aggregator.sentiment_score(&samples).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_heavy_weights_stay_bounded() {
        let config = AggregationConfig {
            weights: AggregationWeights {
                sentiment: 1.0,
                liquidity: 1.0,
                volume: 1.0,
                price_action: 1.0,
            },
            ..AggregationConfig::default()
        };
        let aggregator = SignalAggregator::new(config);
        let signal = aggregator
            .generate_signal("X", &input(vec![SentimentSample::scored(1.0)], Some(metrics(1e7, 4.0, 20.0))))
            .unwrap()
            .unwrap();
        assert_eq!(signal.score, 1.0);
    }

    #[test]
    fn test_batch_skips_failures_and_empty_assets() {
        let aggregator = SignalAggregator::default();
        let mut assets = BTreeMap::new();
        assets.insert("A".to_string(), input(vec![SentimentSample::scored(0.7)], None));
        assets.insert("B".to_string(), input(vec![SentimentSample::scored(f64::NAN)], None));
        assets.insert("C".to_string(), AssetInput::default());
        assets.insert("D".to_string(), input(vec![], Some(metrics(5e5, 1.0, 1.0))));

        let signals = aggregator.generate_batch(&assets);
        let ids: Vec<&str> = signals.iter().map(|s| s.asset_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "D"]);
    }

    #[test]
    fn test_signal_json_round_trip() {
        let aggregator = SignalAggregator::default();
        let signal = aggregator
            .generate_signal("SOL", &input(vec![SentimentSample::scored(0.66)], Some(metrics(3e5, 1.5, 2.5))))
            .unwrap()
            .unwrap();

        let json = serde_json::to_string(&signal).unwrap();
        let back: Signal = serde_json::from_str(&json).unwrap();
        assert_eq!(back.category, signal.category);
        assert_eq!(back.confidence, signal.confidence);
        assert!((back.score - signal.score).abs() <= 0.01);
        assert_eq!(back.natural_key(), signal.natural_key());
    }
}
