//! Pipeline configuration

use crate::aggregator::AggregationConfig;
use anyhow::{bail, Context};
use data_ingestion::{ForumSourceConfig, PoolSourceConfig, RetryConfig, SocialSourceConfig, TokenMetricsSourceConfig};
use sentiment_analysis::{SentimentBackendKind, SentimentConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Everything the signal pipeline reads at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Upstream data sources
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Retry budget shared by every source client
    #[serde(default)]
    pub retry: RetryConfig,

    /// Sentiment backend and engagement blend
    #[serde(default)]
    pub sentiment: SentimentConfig,

    /// Signal weights and thresholds
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Cadence, deadline and cache lifetimes
    #[serde(default)]
    pub cycle: CycleConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub social: SocialSourceConfig,

    #[serde(default)]
    pub pools: PoolSourceConfig,

    #[serde(default)]
    pub token_metrics: TokenMetricsSourceConfig,

    #[serde(default)]
    pub forum: ForumSourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Seconds between cycle starts
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Overall budget of one cycle; late stages are abandoned
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    #[serde(default = "default_signal_cache_ttl_secs")]
    pub signal_cache_ttl_secs: u64,

    #[serde(default = "default_metrics_cache_ttl_secs")]
    pub metrics_cache_ttl_secs: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            deadline_secs: default_deadline_secs(),
            signal_cache_ttl_secs: default_signal_cache_ttl_secs(),
            metrics_cache_ttl_secs: default_metrics_cache_ttl_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    300
}

fn default_deadline_secs() -> u64 {
    240
}

fn default_signal_cache_ttl_secs() -> u64 {
    3600
}

fn default_metrics_cache_ttl_secs() -> u64 {
    300
}

impl CycleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn signal_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.signal_cache_ttl_secs)
    }

    pub fn metrics_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.metrics_cache_ttl_secs)
    }
}

/// Connection strings; without both the pipeline runs on in-memory storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub redis_url: Option<String>,
}

/// Secrets supplied outside the config file
#[derive(Debug, Clone, Default)]
pub struct SecretOverrides {
    pub social_bearer_token: Option<String>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
}

impl PipelineSettings {
    /// Non-empty overrides win over the file
    pub fn apply_overrides(&mut self, overrides: SecretOverrides) {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(overrides.social_bearer_token) {
            self.sources.social.bearer_token = token;
        }
        if let Some(url) = non_empty(overrides.database_url) {
            self.storage.database_url = Some(url);
        }
        if let Some(url) = non_empty(overrides.redis_url) {
            self.storage.redis_url = Some(url);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let rate_limits = [
            ("sources.social", self.sources.social.rate_limit),
            ("sources.pools", self.sources.pools.rate_limit),
            ("sources.token_metrics", self.sources.token_metrics.rate_limit),
            ("sources.forum", self.sources.forum.rate_limit),
        ];
        for (section, rate) in rate_limits {
            if !(rate.is_finite() && rate > 0.0) {
                bail!("{}.rate_limit must be positive, got {}", section, rate);
            }
        }
        if self.sources.token_metrics.max_concurrent == 0 {
            bail!("sources.token_metrics.max_concurrent must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }

        let sentiment = &self.sentiment;
        if !sentiment.weights.all_non_negative() {
            bail!("sentiment.weights must be non-negative");
        }
        if !sentiment.thresholds.is_descending() {
            bail!("sentiment.thresholds must be descending from strong_positive to negative");
        }
        if sentiment.backend == SentimentBackendKind::ExternalClassifier
            && sentiment.classifier_endpoint.as_deref().map_or(true, |e| e.trim().is_empty())
        {
            bail!("sentiment.classifier_endpoint is required by the external_classifier backend");
        }

        let aggregation = &self.aggregation;
        if !aggregation.weights.all_non_negative() {
            bail!("aggregation.weights must be non-negative");
        }
        if aggregation.high_threshold < aggregation.medium_threshold {
            bail!(
                "aggregation.high_threshold ({}) is below medium_threshold ({})",
                aggregation.high_threshold,
                aggregation.medium_threshold
            );
        }

        if self.cycle.interval_secs == 0 || self.cycle.deadline_secs == 0 {
            bail!("cycle.interval_secs and cycle.deadline_secs must be positive");
        }

        // Weights summing to 1 is a caller contract, not enforced
        if (sentiment.weights.sum() - 1.0).abs() > 1e-6 {
            warn!("sentiment.weights sum to {:.3}, not 1", sentiment.weights.sum());
        }
        if (aggregation.weights.sum() - 1.0).abs() > 1e-6 {
            warn!("aggregation.weights sum to {:.3}, not 1", aggregation.weights.sum());
        }

        Ok(())
    }
}

/// Load and validate configuration from a TOML file
pub fn load_config(path: &str) -> anyhow::Result<PipelineSettings> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
    let config: PipelineSettings = toml::from_str(&content).with_context(|| format!("Invalid config {}", path))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to TOML file
pub fn save_config(config: &PipelineSettings, path: &str) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Create a default configuration file template
pub fn create_config_template(path: &str) -> anyhow::Result<()> {
    let template = "# Signal Pipeline Configuration

[sources.social]
endpoint = \"https://api.twitter.com/2/tweets/search/recent\"
# Prefer the SOCIAL_BEARER_TOKEN environment variable
bearer_token = \"\"
query = \"(solana OR $SOL OR crypto) -is:retweet lang:en\"
max_results = 100
# Requests per second
rate_limit = 1.0
lookback_hours = 24

[sources.pools]
endpoint = \"https://api.raydium.io/v2\"
rate_limit = 2.0

[sources.token_metrics]
endpoint = \"https://api.dexscreener.com/latest/dex\"
rate_limit = 5.0
# Lookups in flight at once
max_concurrent = 4

[sources.forum]
# HTTP endpoint or local JSON export
location = \"data/forum_calls.json\"
rate_limit = 1.0
lookback_days = 7

[retry]
max_attempts = 3
base_delay_ms = 1000
max_delay_ms = 10000
request_timeout_secs = 30

[sentiment]
# lexicon | weighted_keyword | external_classifier
backend = \"lexicon\"
# classifier_endpoint = \"http://localhost:8080/classify\"
classifier_timeout_secs = 10
max_concurrent = 8

[sentiment.weights]
text = 0.7
likes = 0.1
retweets = 0.1
comments = 0.1

[sentiment.thresholds]
strong_positive = 0.8
positive = 0.6
neutral = 0.4
negative = 0.2

[aggregation]
high_threshold = 0.7
medium_threshold = 0.4

[aggregation.weights]
sentiment = 0.4
liquidity = 0.2
volume = 0.2
price_action = 0.2

[aggregation.categories.strong_buy]
min_score = 0.8
sentiment_min = 0.7
price_action_min = 0.6

[aggregation.categories.buy]
min_score = 0.6
sentiment_min = 0.5
price_action_min = 0.4

[aggregation.categories.strong_sell]
max_score = 0.2
sentiment_max = 0.3
price_action_max = 0.4

[aggregation.categories.sell]
max_score = 0.4
sentiment_max = 0.5
price_action_max = 0.4

[cycle]
interval_secs = 300
deadline_secs = 240
signal_cache_ttl_secs = 3600
metrics_cache_ttl_secs = 300

[storage]
# Without both URLs the pipeline keeps everything in memory
# database_url = \"postgres://localhost/signals\"
# redis_url = \"redis://localhost:6379\"
";

    std::fs::write(path, template)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("{}-{}.toml", name, uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineSettings::default();
        assert_eq!(config.cycle.signal_cache_ttl_secs, 3600);
        assert_eq!(config.cycle.metrics_cache_ttl_secs, 300);
        assert_eq!(config.aggregation.weights.sentiment, 0.4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_template_loads() {
        let path = temp_path("pipeline-template");
        create_config_template(&path).unwrap();
        let config = load_config(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.sources.token_metrics.max_concurrent, 4);
        assert_eq!(config.sentiment.backend, SentimentBackendKind::Lexicon);
        assert_eq!(config.aggregation.categories.strong_sell.sentiment_max, 0.3);
        assert!(config.storage.database_url.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let path = temp_path("pipeline-saved");
        let mut config = PipelineSettings::default();
        config.cycle.interval_secs = 60;
        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.cycle.interval_secs, 60);
        assert_eq!(loaded.aggregation.weights, config.aggregation.weights);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: PipelineSettings = toml::from_str("[cycle]\ninterval_secs = 30\n").unwrap();
        assert_eq!(config.cycle.interval_secs, 30);
        assert_eq!(config.cycle.deadline_secs, 240);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let parsed = toml::from_str::<PipelineSettings>("[sentiment]\nbackend = \"crystal_ball\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = PipelineSettings::default();
        config.sources.pools.rate_limit = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineSettings::default();
        config.aggregation.weights.volume = -0.1;
        assert!(config.validate().is_err());

        let mut config = PipelineSettings::default();
        config.sentiment.thresholds.neutral = 0.9;
        assert!(config.validate().is_err());

        let mut config = PipelineSettings::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineSettings::default();
        config.sentiment.backend = SentimentBackendKind::ExternalClassifier;
        assert!(config.validate().is_err());

        // Off-unit weights only warn
        let mut config = PipelineSettings::default();
        config.aggregation.weights.sentiment = 0.9;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secret_overrides() {
        let mut config = PipelineSettings::default();
        config.storage.redis_url = Some("redis://file:6379".to_string());
        config.apply_overrides(SecretOverrides {
            social_bearer_token: Some("secret".to_string()),
            database_url: Some("postgres://db/signals".to_string()),
            redis_url: Some("  ".to_string()),
        });

        assert_eq!(config.sources.social.bearer_token, "secret");
        assert_eq!(config.storage.database_url.as_deref(), Some("postgres://db/signals"));
        // Blank values leave the file's setting alone
        assert_eq!(config.storage.redis_url.as_deref(), Some("redis://file:6379"));
    }
}
