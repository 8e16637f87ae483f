//! Valence lexicon scorer
//!
//! Sums per-word valences (roughly -4..4), adjusting each for a preceding
//! booster and for negation within the three preceding words, adds exclamation
//! emphasis, then squashes the sum into a compound score in (-1, 1).

use crate::backend::{ScoringError, SentimentBackend, TextScore};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

const NEGATION_SCALAR: f64 = -0.74;
const BOOSTER_INCREMENT: f64 = 0.293;
const EXCLAMATION_INCREMENT: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;
const COMPOUND_ALPHA: f64 = 15.0;

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"[A-Za-z0-9_']+").unwrap();

    static ref VALENCE: HashMap<&'static str, f64> = [
        ("bullish", 2.5), ("moon", 2.0), ("mooning", 2.3), ("pump", 1.5), ("pumping", 1.5),
        ("gain", 1.8), ("gains", 1.8), ("profit", 1.9), ("profits", 1.9), ("good", 1.9),
        ("great", 3.1), ("excellent", 3.2), ("love", 3.2), ("strong", 2.3), ("win", 2.8),
        ("winning", 2.4), ("rally", 1.9), ("breakout", 1.5), ("buy", 1.0), ("hodl", 1.2),
        ("up", 0.8), ("undervalued", 1.4), ("gem", 1.8), ("safe", 1.9),
        ("bearish", -2.5), ("dump", -1.9), ("dumping", -2.0), ("crash", -2.6), ("scam", -2.9),
        ("rug", -2.5), ("rugged", -2.7), ("loss", -1.3), ("losses", -1.6), ("bad", -2.5),
        ("terrible", -2.1), ("poor", -2.1), ("weak", -1.9), ("fear", -2.2), ("down", -1.0),
        ("sell", -0.8), ("hate", -2.7), ("rekt", -2.4), ("worst", -3.1), ("fail", -2.5),
        ("overvalued", -1.4), ("panic", -2.3),
    ]
    .into_iter()
    .collect();

    static ref BOOSTERS: HashMap<&'static str, f64> = [
        ("very", BOOSTER_INCREMENT), ("extremely", BOOSTER_INCREMENT), ("really", BOOSTER_INCREMENT),
        ("super", BOOSTER_INCREMENT), ("so", BOOSTER_INCREMENT), ("incredibly", BOOSTER_INCREMENT),
        ("absolutely", BOOSTER_INCREMENT), ("massively", BOOSTER_INCREMENT),
        ("slightly", -BOOSTER_INCREMENT), ("barely", -BOOSTER_INCREMENT),
        ("somewhat", -BOOSTER_INCREMENT), ("kinda", -BOOSTER_INCREMENT),
    ]
    .into_iter()
    .collect();
}

const NEGATIONS: [&str; 9] = ["not", "never", "no", "nor", "cannot", "without", "dont", "isnt", "wont"];

fn is_negation(token: &str) -> bool {
    NEGATIONS.contains(&token) || token.ends_with("n't")
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }

    /// Compound score in (-1, 1)
    pub fn compound(&self, text: &str) -> f64 {
        let tokens: Vec<String> = TOKEN
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect();

        let mut sum = 0.0;
        for (i, token) in tokens.iter().enumerate() {
            let Some(&base) = VALENCE.get(token.as_str()) else {
                continue;
            };

            let mut valence = base;
            if let Some(boost) = i.checked_sub(1).and_then(|j| BOOSTERS.get(tokens[j].as_str())) {
                valence += boost * valence.signum();
            }
            if tokens[i.saturating_sub(3)..i].iter().any(|t| is_negation(t)) {
                valence *= NEGATION_SCALAR;
            }
            sum += valence;
        }

        if sum != 0.0 {
            let exclamations = text.matches('!').count().min(MAX_EXCLAMATIONS) as f64;
            sum += exclamations * EXCLAMATION_INCREMENT * sum.signum();
        }

        sum / (sum * sum + COMPOUND_ALPHA).sqrt()
    }

    pub fn score_text(&self, text: &str) -> TextScore {
        TextScore::from_score((self.compound(text) + 1.0) / 2.0)
    }
}

#[async_trait]
impl SentimentBackend for LexiconScorer {
    fn name(&self) -> &'static str {
        "lexicon"
    }

    async fn score(&self, text: &str) -> Result<TextScore, ScoringError> {
        Ok(self.score_text(text))
    }
}

const POSITIVE_WORDS: [&str; 8] = ["bullish", "moon", "up", "gain", "profit", "good", "great", "excellent"];
const NEGATIVE_WORDS: [&str; 7] = ["bearish", "down", "crash", "loss", "bad", "terrible", "poor"];

/// Fallback polarity for raw text: share of positive words among the matched
/// polarity words (substring presence), 0.5 when none match
pub fn simple_polarity(text: &str) -> f64 {
    let text = text.to_lowercase();
    let positive = POSITIVE_WORDS.iter().filter(|w| text.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| text.contains(*w)).count();

    if positive + negative == 0 {
        return 0.5;
    }
    positive as f64 / (positive + negative) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SentimentLabel;

    #[test]
    fn test_neutral_text() {
        let scorer = LexiconScorer::new();
        assert_eq!(scorer.compound("watching the chart today"), 0.0);
        assert_eq!(scorer.score_text("watching the chart today").score, 0.5);
    }

    #[test]
    fn test_polarity_and_labels() {
        let scorer = LexiconScorer::new();
        let bullish = scorer.score_text("Very bullish on $SOL");
        assert_eq!(bullish.label, SentimentLabel::Positive);

        let bearish = scorer.score_text("this is a scam, total crash");
        assert_eq!(bearish.label, SentimentLabel::Negative);
    }

    #[test]
    fn test_negation_flips_valence() {
        let scorer = LexiconScorer::new();
        assert!(scorer.compound("bullish") > 0.0);
        assert!(scorer.compound("not bullish") < 0.0);
        assert!(scorer.compound("this isn't bullish") < 0.0);
        assert!(scorer.compound("not bullish").abs() < scorer.compound("bullish").abs());
    }

    #[test]
    fn test_boosters_and_exclamation() {
        let scorer = LexiconScorer::new();
        let plain = scorer.compound("bullish");
        assert!(scorer.compound("extremely bullish") > plain);
        assert!(scorer.compound("slightly bullish") < plain);
        assert!(scorer.compound("bullish!!!") > plain);
        assert!(scorer.compound("crash!!!") < scorer.compound("crash"));
    }

    #[test]
    fn test_compound_is_bounded() {
        let scorer = LexiconScorer::new();
        let text = "great great great excellent love moon bullish win!!!!!!";
        let compound = scorer.compound(text);
        assert!(compound > 0.9 && compound < 1.0);
    }

    #[test]
    fn test_simple_polarity() {
        assert_eq!(simple_polarity("nothing to see"), 0.5);
        assert_eq!(simple_polarity("Bullish, going to the moon"), 1.0);
        assert_eq!(simple_polarity("good project but bearish chart"), 0.5);
        assert!((simple_polarity("bad crash, terrible loss, still up") - 0.2).abs() < 1e-9);
    }
}
