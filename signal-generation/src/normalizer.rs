// Metric Normalizer
// Maps raw market metrics onto bounded [0, 1] sub-scores

use common::{clip_unit, NormalizedMetrics, TokenMetrics};
use serde::{Deserialize, Serialize};

/// Liquidity at which the liquidity sub-score saturates (USD)
pub const LIQUIDITY_REFERENCE: f64 = 1_000_000.0;

/// 6h windows per day, used to project 6h volume onto a daily pace
const DAILY_PACE_MULTIPLIER: f64 = 4.0;

/// Raw metric inputs for one asset; absent fields normalize to neutral
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketMetricsInput {
    pub liquidity: Option<f64>,
    pub volume: Option<f64>,
    pub average_volume: Option<f64>,
    pub price_change_pct: Option<f64>,
}

impl MarketMetricsInput {
    /// Current volume pace (4 x trailing 6h) against the trailing-day volume
    pub fn from_token_metrics(metrics: &TokenMetrics) -> Self {
        Self {
            liquidity: Some(metrics.liquidity_usd),
            volume: metrics.volume_6h.map(|v| v * DAILY_PACE_MULTIPLIER),
            average_volume: metrics.volume_6h.map(|_| metrics.volume_24h),
            price_change_pct: metrics.price_change_pct,
        }
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Pure, field-independent normalization
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricNormalizer;

impl MetricNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn liquidity(&self, liquidity: Option<f64>) -> f64 {
        finite(liquidity).map_or(0.5, |l| clip_unit(l / LIQUIDITY_REFERENCE))
    }

    /// 0.5 at average volume, ~0.8 at double, ~0.2 at half; saturates on spikes
    pub fn volume(&self, volume: Option<f64>, average_volume: Option<f64>) -> f64 {
        match (finite(volume), finite(average_volume)) {
            (Some(volume), Some(average)) if average > 0.0 => {
                if volume <= 0.0 {
                    return 0.0;
                }
                clip_unit(0.5 + 0.3 * (volume / average).log2())
            }
            _ => 0.5,
        }
    }

    /// +/-10% saturates
    pub fn price_action(&self, price_change_pct: Option<f64>) -> f64 {
        finite(price_change_pct).map_or(0.5, |pct| clip_unit(0.5 + pct / 20.0))
    }

    pub fn normalize(&self, input: &MarketMetricsInput) -> NormalizedMetrics {
        NormalizedMetrics {
            liquidity: self.liquidity(input.liquidity),
            volume: self.volume(input.volume, input.average_volume),
            price_action: self.price_action(input.price_change_pct),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_liquidity() {
        let n = MetricNormalizer::new();
        assert_eq!(n.liquidity(Some(250_000.0)), 0.25);
        assert_eq!(n.liquidity(Some(5e7)), 1.0);
        assert_eq!(n.liquidity(Some(0.0)), 0.0);
        assert_eq!(n.liquidity(None), 0.5);
        assert_eq!(n.liquidity(Some(f64::NAN)), 0.5);
    }

    #[test]
    fn test_volume_log_scale() {
        let n = MetricNormalizer::new();
        assert_eq!(n.volume(Some(100.0), Some(100.0)), 0.5);
        assert!(close(n.volume(Some(200.0), Some(100.0)), 0.8));
        assert!(close(n.volume(Some(50.0), Some(100.0)), 0.2));
        assert_eq!(n.volume(Some(1e9), Some(1.0)), 1.0);
        assert_eq!(n.volume(Some(0.0), Some(100.0)), 0.0);
        assert_eq!(n.volume(Some(100.0), Some(0.0)), 0.5);
        assert_eq!(n.volume(Some(100.0), None), 0.5);
    }

    #[test]
    fn test_price_action() {
        let n = MetricNormalizer::new();
        assert!(close(n.price_action(Some(6.0)), 0.8));
        assert!(close(n.price_action(Some(-7.0)), 0.15));
        assert_eq!(n.price_action(Some(25.0)), 1.0);
        assert_eq!(n.price_action(Some(-10.0)), 0.0);
        assert_eq!(n.price_action(None), 0.5);
    }

    #[test]
    fn test_normalize_is_pure_and_bounded() {
        let n = MetricNormalizer::new();
        let inputs = [
            MarketMetricsInput::default(),
            MarketMetricsInput {
                liquidity: Some(-5.0),
                volume: Some(f64::INFINITY),
                average_volume: Some(1.0),
                price_change_pct: Some(-400.0),
            },
            MarketMetricsInput {
                liquidity: Some(3e6),
                volume: Some(1e-12),
                average_volume: Some(1e12),
                price_change_pct: Some(0.0),
            },
        ];
        for input in &inputs {
            let first = n.normalize(input);
            assert!(first.is_bounded());
            assert_eq!(first, n.normalize(input));
        }
        assert_eq!(n.normalize(&MarketMetricsInput::default()), NormalizedMetrics::NEUTRAL);
    }

    #[test]
    fn test_from_token_metrics_uses_daily_pace() {
        let mut metrics = TokenMetrics {
            address: "So111".to_string(),
            symbol: None,
            price_usd: 1.0,
            volume_24h: 1000.0,
            volume_6h: Some(500.0),
            liquidity_usd: 2e5,
            price_change_pct: Some(3.0),
            whale_transactions: 0,
            whale_volume_usd: 0.0,
            pairs_count: 1,
            observed_at: Utc::now(),
        };
        let input = MarketMetricsInput::from_token_metrics(&metrics);
        assert_eq!(input.volume, Some(2000.0));
        assert_eq!(input.average_volume, Some(1000.0));
        assert!(close(MetricNormalizer::new().normalize(&input).volume, 0.8));

        metrics.volume_6h = None;
        let input = MarketMetricsInput::from_token_metrics(&metrics);
        assert_eq!(MetricNormalizer::new().normalize(&input).volume, 0.5);
    }
}
