//! Upstream fetcher (C3): a single outbound GET with injected headers,
//! a per-attempt timeout, and bounded retries with exponential backoff
//! on transport-level failures.
//!
//! The retry loop itself is decoupled from the real HTTP transport via
//! the [`Transport`] trait so it can be exercised in tests without a
//! network. The shipped [`ReqwestTransport`] wraps a single shared
//! `reqwest::Client`, mirroring the retry-wrapper pattern this codebase
//! has historically used for flaky backends, simplified to the fixed
//! backoff formula this proxy needs (no jitter).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

use crate::errors::{ProxyError, ProxyResult};

/// The body of a [`FetchResponse`]. Wraps the real `reqwest::Response`
/// for production use; tests substitute pre-built bytes so the retry
/// loop can be exercised without a network.
pub enum ResponseBody {
    Upstream(reqwest::Response),
    Fixed(Bytes),
}

impl ResponseBody {
    pub async fn text(self) -> Result<String, TransportError> {
        match self {
            ResponseBody::Upstream(response) => response
                .text()
                .await
                .map_err(|e| TransportError(e.to_string())),
            ResponseBody::Fixed(bytes) => {
                String::from_utf8(bytes.to_vec()).map_err(|e| TransportError(e.to_string()))
            }
        }
    }

    /// A stream of body chunks, forwarded without full buffering.
    pub fn into_byte_stream(self) -> BoxStream<'static, reqwest::Result<Bytes>> {
        match self {
            ResponseBody::Upstream(response) => response.bytes_stream().boxed(),
            ResponseBody::Fixed(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
        }
    }
}

/// The outcome of one successful HTTP attempt (any status code — only
/// transport failures are retried, not HTTP error statuses).
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// The URL that actually delivered the bytes, i.e. after following
    /// redirects. Relative URIs in playlists are resolved against this.
    pub final_url: String,
    pub body: ResponseBody,
}

/// Transport-level failure: connect refused, DNS failure, TLS failure,
/// timeout, connection reset. Never an HTTP status.
#[derive(Debug, Clone)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seam between the retry loop and the actual network call, so tests
/// can supply canned responses/failures without binding a socket.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, url: &str, headers: HeaderMap) -> Result<FetchResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, url: &str, headers: HeaderMap) -> Result<FetchResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(FetchResponse {
            status: response.status(),
            headers: response.headers().clone(),
            final_url: response.url().to_string(),
            body: ResponseBody::Upstream(response),
        })
    }
}

/// Exponential backoff retry parameters, matching `min(500 * 2^attempt, 4000) ms`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub per_attempt_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(18),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(4),
        }
    }
}

/// Delay before the retry following `attempt` (1-indexed): `min(initial * 2^(attempt-1), max)`.
fn calculate_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponential_ms =
        config.initial_backoff.as_millis() as f64 * 2f64.powi((attempt - 1) as i32);
    let capped_ms = exponential_ms.min(config.max_backoff.as_millis() as f64) as u64;
    Duration::from_millis(capped_ms)
}

pub struct UpstreamFetcher {
    transport: Box<dyn Transport>,
    retry: RetryConfig,
}

impl UpstreamFetcher {
    pub fn new(transport: Box<dyn Transport>, retry: RetryConfig) -> Self {
        Self { transport, retry }
    }

    pub fn with_default_client(retry: RetryConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self::new(Box::new(ReqwestTransport::new(client)), retry))
    }

    /// Fetch `url` with `custom_headers` layered over the default
    /// browser-like header set, retrying transport failures.
    pub async fn fetch(
        &self,
        url: &str,
        custom_headers: &HashMap<String, String>,
    ) -> ProxyResult<FetchResponse> {
        let headers = build_headers(url, custom_headers);

        let mut last_error = None;

        for attempt in 1..=self.retry.max_attempts {
            let attempt_result = tokio::time::timeout(
                self.retry.per_attempt_timeout,
                self.transport.execute(url, headers.clone()),
            )
            .await;

            match attempt_result {
                Ok(Ok(response)) => {
                    if attempt > 1 {
                        debug!(url, attempt, "upstream fetch succeeded after retry");
                    }
                    return Ok(response);
                }
                Ok(Err(transport_err)) => {
                    last_error = Some(transport_err.to_string());
                }
                Err(_elapsed) => {
                    last_error = Some(format!(
                        "timed out after {:?}",
                        self.retry.per_attempt_timeout
                    ));
                }
            }

            if attempt < self.retry.max_attempts {
                let delay = calculate_delay(&self.retry, attempt);
                warn!(
                    url,
                    attempt,
                    max_attempts = self.retry.max_attempts,
                    ?delay,
                    error = last_error.as_deref().unwrap_or("unknown"),
                    "upstream fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(ProxyError::upstream_unreachable(
            last_error.unwrap_or_else(|| "unknown transport failure".to_string()),
        ))
    }
}

/// Build the outbound header set: browser-like defaults, then the
/// per-channel custom headers layered on top (custom headers win).
fn build_headers(url: &str, custom_headers: &HashMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let (origin, referer) = origin_and_referer(url);

    let defaults: Vec<(&str, String)> = vec![
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
        ),
        ("Accept", "*/*".to_string()),
        ("Accept-Language", "en-US,en;q=0.9".to_string()),
        ("Accept-Encoding", "gzip, deflate, br".to_string()),
        ("Origin", origin),
        ("Referer", referer),
        ("Connection", "keep-alive".to_string()),
        ("Sec-Fetch-Dest", "empty".to_string()),
        ("Sec-Fetch-Mode", "cors".to_string()),
        ("Sec-Fetch-Site", "cross-site".to_string()),
    ];

    for (name, value) in defaults {
        insert_header(&mut headers, name, &value);
    }

    for (name, value) in custom_headers {
        insert_header(&mut headers, name, value);
    }

    headers
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        headers.insert(name, value);
    }
}

fn origin_and_referer(url: &str) -> (String, String) {
    match Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("");
            let scheme = parsed.scheme();
            let origin = match parsed.port() {
                Some(port) => format!("{scheme}://{host}:{port}"),
                None => format!("{scheme}://{host}"),
            };
            let referer = format!("{origin}/");
            (origin, referer)
        }
        Err(_) => (url.to_string(), url.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyTransport {
        fail_times: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn execute(
            &self,
            url: &str,
            _headers: HeaderMap,
        ) -> Result<FetchResponse, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(TransportError("connection refused".to_string()));
            }
            Ok(FetchResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                final_url: url.to_string(),
                body: ResponseBody::Fixed(Bytes::new()),
            })
        }
    }

    fn fast_retry_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_millis(200),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let transport = FlakyTransport {
            fail_times: 2,
            calls: calls.clone(),
        };
        let fetcher = UpstreamFetcher::new(Box::new(transport), fast_retry_config());
        let result = fetcher.fetch("https://example.com/a", &HashMap::new()).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let transport = FlakyTransport {
            fail_times: 10,
            calls: calls.clone(),
        };
        let fetcher = UpstreamFetcher::new(Box::new(transport), fast_retry_config());
        let result = fetcher.fetch("https://example.com/a", &HashMap::new()).await;
        assert!(matches!(result, Err(ProxyError::UpstreamUnreachable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let config = RetryConfig::default();
        assert_eq!(calculate_delay(&config, 1), Duration::from_millis(500));
        assert_eq!(calculate_delay(&config, 2), Duration::from_millis(1000));
        assert_eq!(calculate_delay(&config, 3), Duration::from_millis(2000));
        assert_eq!(calculate_delay(&config, 4), Duration::from_millis(4000));
        assert_eq!(calculate_delay(&config, 10), Duration::from_millis(4000));
    }

    #[test]
    fn custom_headers_override_defaults() {
        let mut custom = HashMap::new();
        custom.insert("User-Agent".to_string(), "MyPlayer/1.0".to_string());
        let headers = build_headers("https://example.com/a", &custom);
        assert_eq!(headers.get("User-Agent").unwrap(), "MyPlayer/1.0");
    }

    #[test]
    fn origin_and_referer_derived_from_target_url() {
        let (origin, referer) = origin_and_referer("https://cdn.example.com:8443/a/b");
        assert_eq!(origin, "https://cdn.example.com:8443");
        assert_eq!(referer, "https://cdn.example.com:8443/");
    }
}
