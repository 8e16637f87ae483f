//! Sentiment Analysis - Layer 1
//!
//! Scores social text and blends it with engagement:
//! - `SentimentBackend` trait with lexicon, weighted-keyword and external-classifier variants
//! - a backend registry selected once from configuration
//! - `CompositeSentimentScorer` that weights text score against likes, retweets and comments
//! - `simple_polarity`, the fallback lexicon used when only raw text is available

pub mod backend;
pub mod classifier;
pub mod composite;
pub mod keywords;
pub mod lexicon;

pub use backend::{build_backend, ScoringError, SentimentBackend, SentimentBackendKind, TextScore};
pub use classifier::ExternalClassifierScorer;
pub use composite::{CategoryThresholds, CompositeSentimentScorer, EngagementWeights, SentimentConfig};
pub use keywords::WeightedKeywordScorer;
pub use lexicon::{simple_polarity, LexiconScorer};
