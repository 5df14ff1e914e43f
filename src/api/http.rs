//! HTTP transport for the management API
//!
//! Every request goes through [`Transport::send`], which attaches credentials
//! and default headers, classifies the response status and retries transient
//! failures with exponential backoff plus jitter.

use super::auth::{Credentials, TokenSource};
use crate::error::TransportError;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Retry policy for transient failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for a single delay (also caps server retry-after hints)
    pub max_delay_ms: u64,
    /// Upper bound for the sum of all delays within one call
    pub max_total_wait_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            max_total_wait_ms: 120_000,
        }
    }
}

impl RetryPolicy {
    pub fn max_total_wait(&self) -> Duration {
        Duration::from_millis(self.max_total_wait_ms)
    }

    /// Backoff before retry number `retry` (1-based), with `jitter` in `[0, 1)`.
    ///
    /// The exponential part doubles per retry and is capped at `max_delay_ms`;
    /// jitter adds up to half of that again, still capped.
    pub fn backoff(&self, retry: u32, jitter: f64) -> Duration {
        let exp = retry.saturating_sub(1).min(20);
        let raw = self.base_delay_ms.saturating_mul(1u64 << exp);
        let capped = raw.min(self.max_delay_ms);
        let jitter = jitter.clamp(0.0, 1.0);
        let extra = (capped as f64 * jitter / 2.0) as u64;
        Duration::from_millis(capped.saturating_add(extra).min(self.max_delay_ms))
    }

    /// Delay before retry number `retry`, preferring a server hint when present
    fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(Duration::from_millis(self.max_delay_ms)),
            None => self.backoff(retry, rand::thread_rng().gen::<f64>()),
        }
    }
}

/// How a response status is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    Retryable,
    Fatal,
}

pub fn classify(status: StatusCode) -> Classification {
    match status.as_u16() {
        200..=299 => Classification::Success,
        429 | 502 | 503 | 504 => Classification::Retryable,
        _ => Classification::Fatal,
    }
}

/// Parse a `Retry-After` header: delta-seconds or an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// A resource-oriented request relative to the API base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, None)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path, Some(body))
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path, Some(body))
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Anything other than GET changes remote state
    pub fn is_mutating(&self) -> bool {
        self.method != Method::GET
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

/// One HTTP attempt, reported to the caller's recorder
#[derive(Debug, Clone)]
pub struct Attempt {
    pub method: Method,
    pub path: String,
    pub number: u32,
    /// `None` when no response was received (timeout, connection reset)
    pub status: Option<u16>,
    /// Delay before the next attempt, `None` when this attempt was final
    pub retry_in: Option<Duration>,
}

/// Observer for every attempt made by the transport, retries included
pub trait AttemptRecorder: Send + Sync {
    fn record(&self, attempt: &Attempt);
}

/// Recorder that ignores attempts
pub struct NoopRecorder;

impl AttemptRecorder for NoopRecorder {
    fn record(&self, _attempt: &Attempt) {}
}

/// Recorder that counts attempts for a single call
#[derive(Debug, Default)]
pub struct AttemptCounter(AtomicU32);

impl AttemptCounter {
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl AttemptRecorder for AttemptCounter {
    fn record(&self, _attempt: &Attempt) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Failure of one attempt that may be retried
enum Transient {
    RateLimited,
    Unavailable(String),
}

impl Transient {
    fn into_error(self, attempts: u32) -> TransportError {
        match self {
            Self::RateLimited => TransportError::RateLimited { attempts },
            Self::Unavailable(reason) => TransportError::Unavailable { attempts, reason },
        }
    }
}

/// Authenticated HTTP transport with retry and backoff
#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
    tokens: TokenSource,
    policy: RetryPolicy,
}

impl Transport {
    /// Create a transport for `base_url`
    pub fn new(
        base_url: &Url,
        credentials: Credentials,
        accept: &str,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        let accept = HeaderValue::from_str(accept)
            .map_err(|e| TransportError::Decode(format!("invalid accept header: {}", e)))?;
        headers.insert(ACCEPT, accept);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(concat!("atlas-sweep/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Unavailable {
                attempts: 0,
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        let tokens = TokenSource::new(credentials, base_url, client.clone());

        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            tokens,
            policy,
        })
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, retrying transient failures.
    ///
    /// Every attempt is reported to `recorder`. Non-retryable statuses
    /// surface immediately as [`TransportError::Api`].
    pub async fn send(
        &self,
        request: &ApiRequest,
        recorder: &dyn AttemptRecorder,
    ) -> Result<ApiResponse, TransportError> {
        let mut waited = Duration::ZERO;
        let mut number = 0;

        loop {
            number += 1;
            let token = self.tokens.token().await?;
            tracing::debug!("{} {} (attempt {})", request.method, request.path, number);

            let (status, retry_after, transient) = match self.send_once(request, &token).await {
                Ok(response) => {
                    let status = response.status();
                    match classify(status) {
                        Classification::Success => {
                            recorder.record(&self.attempt(request, number, Some(status), None));
                            return read_body(request, status, response).await;
                        }
                        Classification::Fatal => {
                            recorder.record(&self.attempt(request, number, Some(status), None));
                            let body = response.text().await.unwrap_or_default();
                            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
                            let body = sanitize_for_log(&body);
                            tracing::debug!("API error: {} - {}", status, body);
                            if status == StatusCode::UNAUTHORIZED {
                                self.tokens.invalidate().await;
                            }
                            return Err(TransportError::Api {
                                status: status.as_u16(),
                                body,
                            });
                        }
                        Classification::Retryable => {
                            let retry_after = response
                                .headers()
                                .get(RETRY_AFTER)
                                .and_then(|v| v.to_str().ok())
                                .and_then(parse_retry_after);
                            let transient = if status == StatusCode::TOO_MANY_REQUESTS {
                                Transient::RateLimited
                            } else {
                                Transient::Unavailable(format!("status {}", status.as_u16()))
                            };
                            (Some(status), retry_after, transient)
                        }
                    }
                }
                Err(e) => (None, None, Transient::Unavailable(e.to_string())),
            };

            if number >= self.policy.max_attempts {
                recorder.record(&self.attempt(request, number, status, None));
                tracing::warn!(
                    "{} {} giving up after {} attempts",
                    request.method,
                    request.path,
                    number
                );
                return Err(transient.into_error(number));
            }

            let delay = self.policy.delay_for(number, retry_after);
            if waited + delay > self.policy.max_total_wait() {
                recorder.record(&self.attempt(request, number, status, None));
                tracing::warn!(
                    "{} {} retry budget of {:?} exhausted",
                    request.method,
                    request.path,
                    self.policy.max_total_wait()
                );
                return Err(transient.into_error(number));
            }

            recorder.record(&self.attempt(request, number, status, Some(delay)));
            tracing::warn!(
                "{} {} transient failure ({}), retrying in {:?}",
                request.method,
                request.path,
                status.map(|s| s.as_u16().to_string()).unwrap_or_else(|| "no response".into()),
                delay
            );
            tokio::time::sleep(delay).await;
            waited += delay;
        }
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        token: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path))
            .bearer_auth(token);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.send().await
    }

    fn attempt(
        &self,
        request: &ApiRequest,
        number: u32,
        status: Option<StatusCode>,
        retry_in: Option<Duration>,
    ) -> Attempt {
        Attempt {
            method: request.method.clone(),
            path: request.path.clone(),
            number,
            status: status.map(|s| s.as_u16()),
            retry_in,
        }
    }
}

/// Decode a success body. Listings must be JSON; a mutation the server
/// accepted stays a success even when its body is plain text.
async fn read_body(
    request: &ApiRequest,
    status: StatusCode,
    response: reqwest::Response,
) -> Result<ApiResponse, TransportError> {
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) if request.is_mutating() => {
            tracing::debug!("{} {}: unreadable success body: {}", request.method, request.path, e);
            String::new()
        }
        Err(e) => return Err(TransportError::Decode(e.to_string())),
    };

    // Handle empty response
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) if request.is_mutating() => Value::String(sanitize_for_log(&text)),
            Err(e) => return Err(TransportError::Decode(e.to_string())),
        }
    };

    Ok(ApiResponse {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_statuses() {
        assert_eq!(classify(StatusCode::OK), Classification::Success);
        assert_eq!(classify(StatusCode::ACCEPTED), Classification::Success);
        assert_eq!(classify(StatusCode::NO_CONTENT), Classification::Success);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), Classification::Retryable);
        assert_eq!(classify(StatusCode::BAD_GATEWAY), Classification::Retryable);
        assert_eq!(classify(StatusCode::SERVICE_UNAVAILABLE), Classification::Retryable);
        assert_eq!(classify(StatusCode::GATEWAY_TIMEOUT), Classification::Retryable);
        assert_eq!(classify(StatusCode::NOT_FOUND), Classification::Fatal);
        assert_eq!(classify(StatusCode::CONFLICT), Classification::Fatal);
        assert_eq!(classify(StatusCode::INTERNAL_SERVER_ERROR), Classification::Fatal);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            max_total_wait_ms: 10_000,
        };
        assert_eq!(policy.backoff(1, 0.0), Duration::from_millis(100));
        assert_eq!(policy.backoff(2, 0.0), Duration::from_millis(200));
        assert_eq!(policy.backoff(3, 0.0), Duration::from_millis(400));
        assert_eq!(policy.backoff(5, 0.0), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(1, 0.5), Duration::from_millis(125));
        assert_eq!(policy.backoff(40, 0.99), Duration::from_millis(1_000));
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let policy = RetryPolicy {
            max_delay_ms: 2_000,
            ..RetryPolicy::default()
        };
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(60))),
            Duration::from_millis(2_000)
        );
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(1))),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
        // A date in the past means "retry now"
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(200)));
        assert!(sanitized.contains("truncated, 500 bytes total"));
        assert_eq!(sanitize_for_log("a\nb\tc"), "abc");
    }

    #[test]
    fn test_request_builders() {
        let req = ApiRequest::get("/orgs/o1/groups")
            .with_query("pageNum", 2)
            .with_query("itemsPerPage", 500);
        assert!(!req.is_mutating());
        assert_eq!(
            req.query,
            vec![
                ("pageNum".to_string(), "2".to_string()),
                ("itemsPerPage".to_string(), "500".to_string())
            ]
        );
        assert!(ApiRequest::delete("/groups/p1").is_mutating());
        assert!(ApiRequest::patch("/groups/p1/clusters/c1", serde_json::json!({"paused": true})).is_mutating());
    }
}
