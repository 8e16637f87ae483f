use crate::classifier::ExternalClassifierScorer;
use crate::composite::SentimentConfig;
use crate::keywords::WeightedKeywordScorer;
use crate::lexicon::LexiconScorer;
use async_trait::async_trait;
use common::{clip_unit, SentimentLabel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Text-only score from one backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextScore {
    pub score: f64, // 0.0 to 1.0
    pub label: SentimentLabel,
}

impl TextScore {
    /// Clip into [0, 1] and label with the shared 0.6 / 0.4 bands
    pub fn from_score(score: f64) -> Self {
        let score = clip_unit(score);
        Self {
            score,
            label: SentimentLabel::from_score(score),
        }
    }
}

/// Per-record scoring failure; the record is dropped, the batch continues
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("{backend} backend failed: {reason}")]
    Backend { backend: &'static str, reason: String },

    #[error("missing or empty field: {0}")]
    MissingField(&'static str),

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("invalid sentiment configuration: {0}")]
    Config(String),
}

/// One scoring interface, interchangeable implementations
#[async_trait]
pub trait SentimentBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn score(&self, text: &str) -> Result<TextScore, ScoringError>;
}

/// Backend identifier as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentBackendKind {
    #[default]
    Lexicon,
    WeightedKeyword,
    ExternalClassifier,
}

impl fmt::Display for SentimentBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SentimentBackendKind::Lexicon => "lexicon",
            SentimentBackendKind::WeightedKeyword => "weighted_keyword",
            SentimentBackendKind::ExternalClassifier => "external_classifier",
        };
        f.write_str(name)
    }
}

/// Construct the configured backend. Called once at startup.
pub fn build_backend(config: &SentimentConfig) -> Result<Arc<dyn SentimentBackend>, ScoringError> {
    let backend: Arc<dyn SentimentBackend> = match config.backend {
        SentimentBackendKind::Lexicon => Arc::new(LexiconScorer::new()),
        SentimentBackendKind::WeightedKeyword => Arc::new(WeightedKeywordScorer::default()),
        SentimentBackendKind::ExternalClassifier => {
            let endpoint = config
                .classifier_endpoint
                .as_deref()
                .filter(|e| !e.trim().is_empty())
                .ok_or_else(|| {
                    ScoringError::Config("external_classifier requires classifier_endpoint".to_string())
                })?;
            Arc::new(ExternalClassifierScorer::new(
                endpoint,
                Duration::from_secs(config.classifier_timeout_secs),
            )?)
        }
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_score_is_clipped() {
        assert_eq!(TextScore::from_score(1.7).score, 1.0);
        assert_eq!(TextScore::from_score(-0.2).label, SentimentLabel::Negative);
        assert_eq!(TextScore::from_score(0.5).label, SentimentLabel::Neutral);
    }

    #[test]
    fn test_registry_builds_each_backend() {
        let mut config = SentimentConfig::default();
        assert_eq!(build_backend(&config).unwrap().name(), "lexicon");

        config.backend = SentimentBackendKind::WeightedKeyword;
        assert_eq!(build_backend(&config).unwrap().name(), "weighted_keyword");

        config.backend = SentimentBackendKind::ExternalClassifier;
        assert!(matches!(build_backend(&config), Err(ScoringError::Config(_))));

        config.classifier_endpoint = Some("http://classifier.local/predict".to_string());
        assert_eq!(build_backend(&config).unwrap().name(), "external_classifier");
    }

    #[test]
    fn test_unknown_backend_fails_to_parse() {
        let parsed: Result<SentimentBackendKind, _> = serde_json::from_str("\"tensorflow\"");
        assert!(parsed.is_err());
        let parsed: SentimentBackendKind = serde_json::from_str("\"weighted_keyword\"").unwrap();
        assert_eq!(parsed, SentimentBackendKind::WeightedKeyword);
    }
}
