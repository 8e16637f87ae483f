use crate::backend::{ScoringError, SentimentBackend, TextScore};
use async_trait::async_trait;
use std::collections::HashMap;

/// Weighted keyword dictionaries over whitespace tokens
#[derive(Debug, Clone)]
pub struct WeightedKeywordScorer {
    positive: HashMap<String, f64>,
    negative: HashMap<String, f64>,
}

impl Default for WeightedKeywordScorer {
    fn default() -> Self {
        let positive = [
            ("bullish", 1.0), ("moon", 0.8), ("buy", 0.6), ("long", 0.6), ("up", 0.4),
            ("gain", 0.4), ("profit", 0.4), ("good", 0.3), ("great", 0.3), ("strong", 0.3),
        ];
        let negative = [
            ("bearish", 1.0), ("dump", 0.8), ("sell", 0.6), ("short", 0.6), ("down", 0.4),
            ("loss", 0.4), ("bad", 0.3), ("weak", 0.3), ("crash", 0.8), ("scam", 0.8),
        ];
        Self::new(positive, negative)
    }
}

impl WeightedKeywordScorer {
    pub fn new<'a>(
        positive: impl IntoIterator<Item = (&'a str, f64)>,
        negative: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Self {
        Self {
            positive: lowercase_keys(positive),
            negative: lowercase_keys(negative),
        }
    }

    /// Summed positive and negative weights of the matched tokens
    pub fn weights(&self, text: &str) -> (f64, f64) {
        let text = text.to_lowercase();
        text.split_whitespace().fold((0.0, 0.0), |(pos, neg), word| {
            (
                pos + self.positive.get(word).copied().unwrap_or(0.0),
                neg + self.negative.get(word).copied().unwrap_or(0.0),
            )
        })
    }

    pub fn score_text(&self, text: &str) -> TextScore {
        let (pos, neg) = self.weights(text);
        let total = pos + neg;
        let score = if total > 0.0 { pos / total } else { 0.5 };
        TextScore::from_score(score)
    }
}

fn lowercase_keys<'a>(words: impl IntoIterator<Item = (&'a str, f64)>) -> HashMap<String, f64> {
    words
        .into_iter()
        .map(|(word, weight)| (word.to_lowercase(), weight))
        .collect()
}

#[async_trait]
impl SentimentBackend for WeightedKeywordScorer {
    fn name(&self) -> &'static str {
        "weighted_keyword"
    }

    async fn score(&self, text: &str) -> Result<TextScore, ScoringError> {
        Ok(self.score_text(text))
    }
}
