use crate::backend::{ScoringError, SentimentBackend, TextScore};
use async_trait::async_trait;
use common::{clip_unit, SentimentLabel};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const BACKEND: &str = "external_classifier";

/// Hosted text-classification model reached over HTTP.
///
/// Request body is `{"inputs": text}`; the response is `[{label, score}]`,
/// possibly nested one level deeper.
pub struct ExternalClassifierScorer {
    client: reqwest::Client,
    endpoint: String,
}

impl ExternalClassifierScorer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ScoringError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| backend_error(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

fn backend_error(reason: impl Into<String>) -> ScoringError {
    ScoringError::Backend {
        backend: BACKEND,
        reason: reason.into(),
    }
}

/// Positive-class probability from a classifier response
pub fn parse_classifier_output(output: &Value) -> Result<TextScore, ScoringError> {
    let mut top = output;
    while let Some(first) = top.as_array().and_then(|items| items.first()) {
        top = first;
    }

    let label = top
        .get("label")
        .and_then(Value::as_str)
        .ok_or_else(|| backend_error("response has no label"))?;
    let score = top
        .get("score")
        .and_then(Value::as_f64)
        .ok_or_else(|| backend_error("response has no score"))?;

    let positive = if label.eq_ignore_ascii_case("negative") {
        1.0 - score
    } else {
        score
    };
    let positive = clip_unit(positive);

    Ok(TextScore {
        score: positive,
        label: if positive > 0.5 {
            SentimentLabel::Positive
        } else {
            SentimentLabel::Negative
        },
    })
}

#[async_trait]
impl SentimentBackend for ExternalClassifierScorer {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn score(&self, text: &str) -> Result<TextScore, ScoringError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "inputs": text }))
            .send()
            .await
            .map_err(|e| backend_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(backend_error(format!("HTTP {}", status.as_u16())));
        }

        let output: Value = response.json().await.map_err(|e| backend_error(e.to_string()))?;
        debug!("Classifier output: {}", output);
        parse_classifier_output(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_label() {
        let result = parse_classifier_output(&json!([{"label": "POSITIVE", "score": 0.93}])).unwrap();
        assert_eq!(result.score, 0.93);
        assert_eq!(result.label, SentimentLabel::Positive);
    }

    #[test]
    fn test_negative_label_is_inverted() {
        let result = parse_classifier_output(&json!([[{"label": "NEGATIVE", "score": 0.75}]])).unwrap();
        assert_eq!(result.score, 0.25);
        assert_eq!(result.label, SentimentLabel::Negative);
    }

    #[test]
    fn test_malformed_output() {
        assert!(parse_classifier_output(&json!([])).is_err());
        assert!(parse_classifier_output(&json!([{"label": "POSITIVE"}])).is_err());
        assert!(parse_classifier_output(&json!({"error": "model loading"})).is_err());
    }
}
