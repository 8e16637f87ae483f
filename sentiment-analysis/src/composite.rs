//! Composite Sentiment Scorer
//!
//! Blends one backend's text score with engagement:
//! `w_text * text + w_likes * likes/1000 + w_retweets * retweets/500 + w_comments * comments/200`,
//! each engagement term clipped to [0, 1] before weighting.

use crate::backend::{build_backend, ScoringError, SentimentBackend, SentimentBackendKind};
use common::{clip_unit, SentimentCategory, SentimentResult, SocialPost};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::pin;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

pub const LIKES_REFERENCE: f64 = 1000.0;
pub const RETWEETS_REFERENCE: f64 = 500.0;
pub const COMMENTS_REFERENCE: f64 = 200.0;

/// Weights of the text score and each engagement term; sum to 1 by convention
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngagementWeights {
    pub text: f64,
    pub likes: f64,
    pub retweets: f64,
    pub comments: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            text: 0.7,
            likes: 0.1,
            retweets: 0.1,
            comments: 0.1,
        }
    }
}

impl EngagementWeights {
    pub fn sum(&self) -> f64 {
        self.text + self.likes + self.retweets + self.comments
    }

    pub fn all_non_negative(&self) -> bool {
        [self.text, self.likes, self.retweets, self.comments]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }
}

/// Lower bounds of each category, checked top-down with `>=`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryThresholds {
    pub strong_positive: f64,
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

impl Default for CategoryThresholds {
    fn default() -> Self {
        Self {
            strong_positive: 0.8,
            positive: 0.6,
            neutral: 0.4,
            negative: 0.2,
        }
    }
}

impl CategoryThresholds {
    pub fn is_descending(&self) -> bool {
        self.strong_positive >= self.positive && self.positive >= self.neutral && self.neutral >= self.negative
    }

    pub fn categorize(&self, score: f64) -> SentimentCategory {
        if score >= self.strong_positive {
            SentimentCategory::StrongPositive
        } else if score >= self.positive {
            SentimentCategory::Positive
        } else if score >= self.neutral {
            SentimentCategory::Neutral
        } else if score >= self.negative {
            SentimentCategory::Negative
        } else {
            SentimentCategory::StrongNegative
        }
    }
}

/// Sentiment scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentConfig {
    #[serde(default)]
    pub backend: SentimentBackendKind,

    /// Required by the external classifier backend
    #[serde(default)]
    pub classifier_endpoint: Option<String>,

    #[serde(default = "default_classifier_timeout_secs")]
    pub classifier_timeout_secs: u64,

    #[serde(default)]
    pub weights: EngagementWeights,

    #[serde(default)]
    pub thresholds: CategoryThresholds,

    /// Posts scored concurrently
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            backend: SentimentBackendKind::default(),
            classifier_endpoint: None,
            classifier_timeout_secs: default_classifier_timeout_secs(),
            weights: EngagementWeights::default(),
            thresholds: CategoryThresholds::default(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_classifier_timeout_secs() -> u64 {
    10
}

fn default_max_concurrent() -> usize {
    8
}

pub struct CompositeSentimentScorer {
    backend: Arc<dyn SentimentBackend>,
    weights: EngagementWeights,
    thresholds: CategoryThresholds,
    max_concurrent: usize,
}

impl CompositeSentimentScorer {
    pub fn new(backend: Arc<dyn SentimentBackend>, config: &SentimentConfig) -> Self {
        Self {
            backend,
            weights: config.weights,
            thresholds: config.thresholds,
            max_concurrent: config.max_concurrent.max(1),
        }
    }

    /// Build the configured backend and wrap it
    pub fn from_config(config: &SentimentConfig) -> Result<Self, ScoringError> {
        let backend = build_backend(config)?;
        info!("Sentiment backend: {}", backend.name());
        Ok(Self::new(backend, config))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn categorize(&self, score: f64) -> SentimentCategory {
        self.thresholds.categorize(score)
    }

    pub async fn analyze_post(&self, post: &SocialPost) -> Result<SentimentResult, ScoringError> {
        if post.text.trim().is_empty() {
            return Err(ScoringError::MissingField("text"));
        }
        let engagement = post.engagement;
        if ![engagement.likes, engagement.retweets, engagement.comments]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ScoringError::NonFinite("engagement"));
        }

        let text = self.backend.score(&post.text).await?;
        let likes = clip_unit(engagement.likes / LIKES_REFERENCE);
        let retweets = clip_unit(engagement.retweets / RETWEETS_REFERENCE);
        let comments = clip_unit(engagement.comments / COMMENTS_REFERENCE);

        let w = &self.weights;
        let weighted = w.text * text.score + w.likes * likes + w.retweets * retweets + w.comments * comments;
        if !weighted.is_finite() {
            return Err(ScoringError::NonFinite("weighted score"));
        }
        let score = clip_unit(weighted);
        let category = self.categorize(score);

        let components = BTreeMap::from([
            ("text".to_string(), text.score),
            ("likes".to_string(), likes),
            ("retweets".to_string(), retweets),
            ("comments".to_string(), comments),
        ]);

        debug!("Post {} scored {:.3} ({})", post.id, score, category);

        Ok(SentimentResult {
            subject_id: post.id.clone(),
            score,
            label: category.label(),
            category,
            components,
        })
    }

    /// Score a batch with bounded concurrency, preserving input order.
    /// Posts that fail to score are dropped with a warning.
    pub async fn analyze_posts(&self, posts: &[SocialPost]) -> Vec<SentimentResult> {
        self.analyze_posts_until(posts, None).await.0
    }

    /// `analyze_posts` with a cut-off. Posts still scoring at `deadline` are dropped
    /// and the flag reports it; results finished before then are kept in input order.
    pub async fn analyze_posts_until(
        &self,
        posts: &[SocialPost],
        deadline: Option<Instant>,
    ) -> (Vec<SentimentResult>, bool) {
        let mut scoring = pin!(stream::iter(posts.iter().enumerate())
            .map(|(index, post)| async move { (index, post, self.analyze_post(post).await) })
            .buffer_unordered(self.max_concurrent));

        let mut scored = Vec::with_capacity(posts.len());
        let mut deadline_hit = false;
        loop {
            let next = match deadline {
                Some(deadline) => match timeout_at(deadline, scoring.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        deadline_hit = true;
                        break;
                    }
                },
                None => scoring.next().await,
            };
            let Some((index, post, result)) = next else {
                break;
            };
            match result {
                Ok(result) => scored.push((index, result)),
                Err(e) => warn!("Dropping post {} from sentiment batch: {}", post.id, e),
            }
        }

        scored.sort_by_key(|(index, _)| *index);
        let results: Vec<SentimentResult> = scored.into_iter().map(|(_, result)| result).collect();

        if deadline_hit {
            warn!("⚠️ Sentiment scoring cut off at the deadline with {}/{} posts scored", results.len(), posts.len());
        } else {
            info!("Scored sentiment for {}/{} posts", results.len(), posts.len());
        }
        (results, deadline_hit)
    }
}
