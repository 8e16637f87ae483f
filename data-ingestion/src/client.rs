// Rate-Limited Client
// Shared request path for every upstream source: pacing, retry with backoff, shape validation

use crate::error::{FetchError, TransportError};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Source-specific structural check on a decoded response body
pub type ShapeCheck = fn(&Value) -> bool;

/// Outbound request description, independent of the transport
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

/// Status line plus decoded JSON body (`None` if the body was not JSON)
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Option<Value>,
}

/// Wire-level seam under the client
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &FetchRequest) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_builder() {
        TransportError::Request(error.to_string())
    } else {
        TransportError::Connect(error.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &FetchRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(classify_reqwest_error)?;

        Ok(TransportResponse {
            status,
            body: serde_json::from_slice(&bytes).ok(),
        })
    }
}

/// Minimum spacing between outbound calls (token bucket of size 1)
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// `rate` requests per second; non-positive rates disable pacing
    pub fn per_second(rate: f64) -> Self {
        let min_interval = if rate.is_finite() && rate > 0.0 {
            Duration::from_secs_f64(1.0 / rate)
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Reserve the next slot and wait for it.
    ///
    /// The slot is recorded before the caller issues its request, so a failed
    /// request still counts against the budget. The lock is released before sleeping.
    pub async fn acquire(&self) {
        let slot = {
            let mut last = self.last_request.lock().await;
            let now = Instant::now();
            let slot = match *last {
                Some(previous) => (previous + self.min_interval).max(now),
                None => now,
            };
            *last = Some(slot);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

/// Retry settings as they appear in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            request_timeout_secs: 30,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Bounded exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().policy()
    }
}

impl RetryPolicy {
    /// Backoff ceiling after the given (1-based) failed attempt
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Equal jitter: half the ceiling plus a random share of the other half
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        let half = ceiling / 2;
        half + half.mul_f64(fastrand::f64())
    }
}

enum StatusClass {
    Success,
    Retryable,
    Permanent,
}

fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        429 | 500..=599 => StatusClass::Retryable,
        _ => StatusClass::Permanent,
    }
}

/// One client per source: its own pacing, its own retry budget
pub struct RateLimitedClient {
    name: String,
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    validate_shape: ShapeCheck,
}

impl RateLimitedClient {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        rate_limit: f64,
        retry: RetryPolicy,
        validate_shape: ShapeCheck,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            limiter: RateLimiter::per_second(rate_limit),
            retry,
            validate_shape,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Issue a request, retrying transient failures, and return the validated body
    pub async fn fetch(&self, request: &FetchRequest) -> Result<Value, FetchError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.limiter.acquire().await;
            debug!("{} {} {} (attempt {})", self.name, request.method, request.url, attempt);

            let failure = match self.transport.send(request).await {
                Ok(response) => match classify_status(response.status) {
                    StatusClass::Success => return self.accept(response),
                    StatusClass::Retryable => format!("HTTP {}", response.status),
                    StatusClass::Permanent => {
                        return Err(FetchError::Permanent {
                            source_name: self.name.clone(),
                            status: Some(response.status),
                            reason: "request rejected".to_string(),
                        });
                    }
                },
                Err(e) if e.is_transient() => e.to_string(),
                Err(e) => return Err(FetchError::permanent(self.name.clone(), e.to_string())),
            };

            if attempt >= max_attempts {
                return Err(FetchError::Transient {
                    source_name: self.name.clone(),
                    attempts: attempt,
                    last_error: failure,
                });
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                "{} request failed (attempt {}/{}): {}; retrying in {:?}",
                self.name, attempt, max_attempts, failure, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn accept(&self, response: TransportResponse) -> Result<Value, FetchError> {
        let body = response.body.ok_or_else(|| {
            FetchError::permanent(self.name.clone(), "response body is not valid JSON")
        })?;

        if !(self.validate_shape)(&body) {
            warn!("{} response failed shape validation", self.name);
            return Err(FetchError::InvalidShape {
                source_name: self.name.clone(),
            });
        }

        Ok(body)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport that replays a fixed script of outcomes
    pub struct ScriptedTransport {
        script: std::sync::Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        calls: AtomicUsize,
        pub requests: std::sync::Mutex<Vec<FetchRequest>>,
    }

    impl ScriptedTransport {
        pub fn new(script: Vec<Result<TransportResponse, TransportError>>) -> Self {
            Self {
                script: std::sync::Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                requests: std::sync::Mutex::new(Vec::new()),
            }
        }

        pub fn ok(body: Value) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse { status: 200, body: Some(body) })
        }

        pub fn status(status: u16) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse { status, body: None })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &FetchRequest) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connect("script exhausted".to_string())))
        }
    }

    pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    pub fn accept_any(_: &Value) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde_json::json;

    fn client(transport: Arc<ScriptedTransport>, max_attempts: u32, shape: ShapeCheck) -> RateLimitedClient {
        RateLimitedClient::new("test-source", transport, 0.0, fast_retry(max_attempts), shape)
    }

    #[tokio::test]
    async fn test_success_returns_body() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(json!({"data": []}))]));
        let client = client(transport.clone(), 3, accept_any);

        let body = client.fetch(&FetchRequest::get("http://source/items")).await.unwrap();
        assert_eq!(body, json!({"data": []}));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_on_503() {
        let script = (0..5).map(|_| ScriptedTransport::status(503)).collect();
        let transport = Arc::new(ScriptedTransport::new(script));
        let client = client(transport.clone(), 5, accept_any);

        let err = client.fetch(&FetchRequest::get("http://source/items")).await.unwrap_err();
        match err {
            FetchError::Transient { attempts, last_error, .. } => {
                assert_eq!(attempts, 5);
                assert_eq!(last_error, "HTTP 503");
            }
            other => panic!("expected transient error, got {other:?}"),
        }
        assert_eq!(transport.calls(), 5);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::status(404),
            ScriptedTransport::ok(json!({})),
        ]));
        let client = client(transport.clone(), 3, accept_any);

        let err = client.fetch(&FetchRequest::get("http://source/missing")).await.unwrap_err();
        assert!(matches!(err, FetchError::Permanent { status: Some(404), .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_too_many_requests_is_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::status(429),
            Err(TransportError::Timeout),
            ScriptedTransport::ok(json!({"ok": true})),
        ]));
        let client = client(transport.clone(), 3, accept_any);

        let body = client.fetch(&FetchRequest::get("http://source/items")).await.unwrap();
        assert_eq!(body["ok"], json!(true));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_shape_failure_is_permanent() {
        fn needs_data(body: &Value) -> bool {
            body.get("data").is_some()
        }

        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::ok(json!({"unexpected": 1})),
            ScriptedTransport::ok(json!({"data": []})),
        ]));
        let client = client(transport.clone(), 3, needs_data);

        let err = client.fetch(&FetchRequest::get("http://source/items")).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidShape { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_json_success_is_permanent() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(TransportResponse { status: 200, body: None })]));
        let client = client(transport.clone(), 3, accept_any);

        let err = client.fetch(&FetchRequest::get("http://source/items")).await.unwrap_err();
        assert!(matches!(err, FetchError::Permanent { status: None, .. }));
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::per_second(20.0);
        assert_eq!(limiter.min_interval(), Duration::from_millis(50));

        let start = std::time::Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(95));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ceiling(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_ceiling(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_ceiling(4), Duration::from_secs(8));
        assert_eq!(policy.backoff_ceiling(5), Duration::from_secs(10));
        assert_eq!(policy.backoff_ceiling(40), Duration::from_secs(10));

        for attempt in 1..6 {
            let delay = policy.delay_for(attempt);
            let ceiling = policy.backoff_ceiling(attempt);
            assert!(delay >= ceiling / 2 && delay <= ceiling);
        }
    }
}
