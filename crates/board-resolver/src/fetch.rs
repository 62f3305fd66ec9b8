//! Resilient HTTP fetcher.
//!
//! Plain HEAD/GET requests, no rendering. Every attempt waits on the
//! per-domain rate limiter, retries connection failures and 429/5xx with
//! exponential backoff, and records the full redirect chain so the
//! classifier can look at every hop.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{Method, StatusCode};
use tracing::debug;
use url::Url;

use crate::canonical::{canonicalize, is_http_url};
use crate::config::{self, ResolverConfig};
use crate::rate_limit::DomainRateLimiter;
use crate::types::{RedirectResult, ResolverResult};

/// Statuses worth another attempt.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Retry budget for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay after attempt `n` (0-based) is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Body of a bounded fetch. `body` is empty when nothing usable came back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedBody {
    pub body: String,
    pub final_url: String,
}

impl FetchedBody {
    fn empty(final_url: impl Into<String>) -> Self {
        Self {
            body: String::new(),
            final_url: final_url.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("exceeded {0} redirects")]
    TooManyRedirects(usize),
    #[error("invalid redirect target: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

struct Hops {
    final_url: String,
    chain: Vec<String>,
    status: u16,
}

/// HTTP client for seed resolution.
#[derive(Clone)]
pub struct Fetcher {
    /// Never follows redirects; used hop by hop to record chains.
    client: reqwest::Client,
    /// Follows up to `max_redirects` on its own; used for body fetches.
    follow_client: reqwest::Client,
    limiter: Arc<DomainRateLimiter>,
    max_redirects: usize,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(config: &ResolverConfig) -> ResolverResult<Self> {
        let limiter = Arc::new(DomainRateLimiter::new(config.per_domain_rps));
        Self::with_limiter(config, limiter)
    }

    /// Build a fetcher that shares an existing rate limiter.
    pub fn with_limiter(
        config: &ResolverConfig,
        limiter: Arc<DomainRateLimiter>,
    ) -> ResolverResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(config::ACCEPT));

        let builder = || {
            reqwest::Client::builder()
                .timeout(config.request_timeout())
                .connect_timeout(config.connect_timeout())
                .user_agent(config.user_agent.as_str())
                .default_headers(headers.clone())
        };

        let client = builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let follow_client = builder()
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            follow_client,
            limiter,
            max_redirects: config.max_redirects,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Follow `url`'s redirects, HEAD first and GET if HEAD fails outright.
    ///
    /// Never errors: transport failure is reported through
    /// [`RedirectResult::ok`]. An HTTP error status still counts as a
    /// successful resolution.
    pub async fn resolve_redirects(&self, url: &str) -> RedirectResult {
        let normalized = canonicalize(url);
        if normalized.is_empty() {
            return RedirectResult::failed(url, url, Vec::new(), "HEAD", "empty url");
        }
        if !is_http_url(&normalized) {
            return RedirectResult::failed(
                url,
                normalized.clone(),
                vec![normalized],
                "HEAD",
                "unsupported url",
            );
        }

        let mut last_error = String::new();
        for method in [Method::HEAD, Method::GET] {
            match self.follow(method.clone(), &normalized).await {
                Ok(hops) => {
                    return RedirectResult {
                        requested_url: normalized,
                        final_url: hops.final_url,
                        chain: hops.chain,
                        status_code: hops.status,
                        method: method.to_string(),
                        error: String::new(),
                    };
                }
                Err(e) => {
                    debug!("{method} {normalized} failed: {e}");
                    last_error = e.to_string();
                }
            }
        }

        RedirectResult::failed(
            normalized.clone(),
            normalized.clone(),
            vec![normalized],
            "GET",
            last_error,
        )
    }

    /// Rate-limited streamed GET of an HTML, XML or JSON document.
    ///
    /// Stops reading once `max_bytes` have arrived and returns at most that
    /// many bytes. Other content types and HTTP errors yield an empty body.
    pub async fn fetch_html(&self, url: &str, max_bytes: usize) -> FetchedBody {
        let normalized = canonicalize(url);
        if normalized.is_empty() {
            return FetchedBody::default();
        }
        if !is_http_url(&normalized) {
            return FetchedBody::empty(normalized);
        }

        self.limiter.wait(&normalized).await;
        let response = match self.follow_client.get(&normalized).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("GET {normalized} failed: {e}");
                return FetchedBody::empty(normalized);
            }
        };
        if let Err(e) = response.error_for_status_ref() {
            debug!("GET {normalized} returned error status: {e}");
            return FetchedBody::empty(normalized);
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !is_document_type(&content_type) {
            debug!("skipping {final_url}: content-type {content_type:?}");
            return FetchedBody::empty(final_url);
        }

        let mut response = response;
        let mut bytes: Vec<u8> = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    bytes.extend_from_slice(&chunk);
                    if bytes.len() >= max_bytes {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("reading {final_url} failed: {e}");
                    return FetchedBody::empty(normalized);
                }
            }
        }
        bytes.truncate(max_bytes);

        FetchedBody {
            body: String::from_utf8_lossy(&bytes).into_owned(),
            final_url,
        }
    }

    /// Walk redirects manually so every hop is recorded and rate limited.
    async fn follow(&self, method: Method, start: &str) -> Result<Hops, FetchError> {
        let mut current = Url::parse(start)?;
        let mut chain: Vec<String> = Vec::new();

        loop {
            let response = self.send_with_retries(method.clone(), current.as_str()).await?;
            let status = response.status();
            chain.push(current.to_string());

            let next = redirect_target(&current, status, response.headers());
            match next {
                Some(next) => {
                    if chain.len() > self.max_redirects {
                        return Err(FetchError::TooManyRedirects(self.max_redirects));
                    }
                    current = next;
                }
                None => {
                    return Ok(Hops {
                        final_url: current.to_string(),
                        chain,
                        status: status.as_u16(),
                    });
                }
            }
        }
    }

    async fn send_with_retries(
        &self,
        method: Method,
        url: &str,
    ) -> Result<reqwest::Response, FetchError> {
        let mut attempt = 0u32;
        loop {
            let last_attempt = attempt + 1 >= self.retry.attempts;
            self.limiter.wait(url).await;

            match self.client.request(method.clone(), url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if RETRYABLE_STATUSES.contains(&status) && !last_attempt {
                        debug!("{method} {url} returned {status}, retrying (attempt {attempt})");
                        tokio::time::sleep(self.retry.delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && !last_attempt => {
                    debug!("{method} {url} failed: {e}, retrying (attempt {attempt})");
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn redirect_target(current: &Url, status: StatusCode, headers: &HeaderMap) -> Option<Url> {
    if !status.is_redirection() {
        return None;
    }
    let location = headers.get(LOCATION)?.to_str().ok()?.trim();
    if location.is_empty() {
        return None;
    }
    let next = current.join(location).ok()?;
    matches!(next.scheme(), "http" | "https").then_some(next)
}

fn is_document_type(content_type: &str) -> bool {
    content_type.contains("text/html") || content_type.contains("xml") || content_type.contains("json")
}

/// Up to three spellings of `url`: itself, the opposite scheme, and the
/// opposite `www.` state. Empty for anything that is not an http(s) URL.
pub fn url_variants(url: &str) -> Vec<String> {
    let normalized = canonicalize(url);
    if normalized.is_empty() || !is_http_url(&normalized) {
        return Vec::new();
    }
    let Ok(parsed) = Url::parse(&normalized) else {
        return Vec::new();
    };

    let mut candidates = vec![normalized.clone()];

    let mut alt_scheme = parsed.clone();
    let flipped = if parsed.scheme() == "http" { "https" } else { "http" };
    if alt_scheme.set_scheme(flipped).is_ok() {
        candidates.push(alt_scheme.to_string());
    }

    let host = parsed.host_str().unwrap_or("");
    let alt_host = match host.strip_prefix("www.") {
        Some(bare) => bare.to_string(),
        None => format!("www.{host}"),
    };
    let mut alt_www = parsed.clone();
    if alt_www.set_host(Some(&alt_host)).is_ok() {
        candidates.push(alt_www.to_string());
    }

    let mut variants: Vec<String> = Vec::with_capacity(3);
    for candidate in candidates {
        let c = canonicalize(&candidate);
        if !c.is_empty() && !variants.contains(&c) {
            variants.push(c);
        }
    }
    variants
}
