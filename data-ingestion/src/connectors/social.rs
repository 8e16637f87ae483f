use super::SourceConnector;
use crate::client::{FetchRequest, RateLimitedClient, RetryPolicy, Transport};
use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use common::{RawRecord, SourceKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Social post search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialSourceConfig {
    pub endpoint: String,

    #[serde(default)]
    pub bearer_token: String,

    #[serde(default = "default_query")]
    pub query: String,

    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,

    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
}

impl Default for SocialSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.twitter.com/2/tweets/search/recent".to_string(),
            bearer_token: String::new(),
            query: default_query(),
            max_results: default_max_results(),
            rate_limit: default_rate_limit(),
            lookback_hours: default_lookback_hours(),
        }
    }
}

fn default_query() -> String {
    "(solana OR $SOL OR crypto) -is:retweet lang:en".to_string()
}

fn default_max_results() -> u32 {
    100
}

fn default_rate_limit() -> f64 {
    1.0
}

fn default_lookback_hours() -> i64 {
    24
}

/// Social post search connector
pub struct SocialConnector {
    client: RateLimitedClient,
    config: SocialSourceConfig,
}

impl SocialConnector {
    pub fn new(config: SocialSourceConfig, transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        let client = RateLimitedClient::new(
            SourceKind::SocialPost.as_str(),
            transport,
            config.rate_limit,
            retry,
            validate_search_response,
        );
        Self { client, config }
    }

    fn request(&self) -> FetchRequest {
        let start_time = (Utc::now() - Duration::hours(self.config.lookback_hours))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        FetchRequest::get(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.bearer_token))
            .query("query", &self.config.query)
            .query("max_results", self.config.max_results.to_string())
            .query("tweet.fields", "id,text,author_id,created_at,public_metrics")
            .query("user.fields", "id,name,username,verified")
            .query("expansions", "author_id")
            .query("start_time", start_time)
    }
}

#[async_trait]
impl SourceConnector for SocialConnector {
    fn kind(&self) -> SourceKind {
        SourceKind::SocialPost
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let response = self.client.fetch(&self.request()).await?;
        let posts = enrich_posts(&response);
        info!("✅ Fetched {} social posts", posts.len());
        Ok(posts)
    }
}

/// `data` array of posts carrying id/text/author_id, plus `includes`
pub fn validate_search_response(response: &Value) -> bool {
    if response.get("includes").is_none() {
        return false;
    }
    let Some(posts) = response.get("data").and_then(Value::as_array) else {
        return false;
    };
    posts.iter().all(|post| {
        ["id", "text", "author_id"]
            .iter()
            .all(|field| post.get(field).is_some())
    })
}

/// Flatten posts and attach author details and engagement counts
fn enrich_posts(response: &Value) -> Vec<RawRecord> {
    let users: HashMap<&str, &Value> = response
        .pointer("/includes/users")
        .and_then(Value::as_array)
        .map(|users| {
            users
                .iter()
                .filter_map(|user| user.get("id").and_then(Value::as_str).map(|id| (id, user)))
                .collect()
        })
        .unwrap_or_default();

    let posts = response
        .get("data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    posts
        .iter()
        .map(|post| {
            let author = post
                .get("author_id")
                .and_then(Value::as_str)
                .and_then(|id| users.get(id));
            let metric = |name: &str| post.pointer(&format!("/public_metrics/{name}")).cloned();

            RawRecord::new(
                SourceKind::SocialPost,
                json!({
                    "id": post.get("id"),
                    "text": post.get("text"),
                    "author_id": post.get("author_id"),
                    "created_at": post.get("created_at"),
                    "likes": metric("like_count"),
                    "retweets": metric("retweet_count"),
                    "comments": metric("reply_count"),
                    "author_name": author.and_then(|a| a.get("name")),
                    "author_username": author.and_then(|a| a.get("username")),
                    "author_verified": author
                        .and_then(|a| a.get("verified"))
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                }),
            )
        })
        .collect()
}
