//! Resolver configuration.
//!
//! Built once (usually via [`ResolverConfig::from_env`]) and handed by
//! reference to the fetcher, resolver and batch orchestrator.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::types::{ResolverError, ResolverResult};

/// User agent sent with every request.
pub const USER_AGENT: &str = "BoardResolver/0.1 (+https://github.com/radiobyline/board-resolver)";

/// Accept header sent with every request.
pub const ACCEPT: &str = "text/html, application/xhtml+xml, application/xml;q=0.9, */*;q=0.8";

/// Upper bound on the connect timeout, regardless of the request timeout.
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Longest accepted cache TTL, in days.
pub const MAX_CACHE_TTL_DAYS: u64 = 36_500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Maximum number of seed resolutions in flight at once.
    pub global_concurrency: usize,
    /// Requests per second allowed against one registrable domain. `<= 0` disables limiting.
    pub per_domain_rps: f64,
    pub request_timeout_secs: u64,
    pub max_redirects: usize,
    pub max_html_bytes: usize,
    pub cache_ttl_days: u64,
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            global_concurrency: 80,
            per_domain_rps: 1.0,
            request_timeout_secs: 10,
            max_redirects: 8,
            max_html_bytes: 350_000,
            cache_ttl_days: 45,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl ResolverConfig {
    /// Read overrides from the process environment on top of the defaults.
    pub fn from_env() -> ResolverResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ResolverConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> ResolverResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            global_concurrency: parse_or(&lookup, "GLOBAL_CONCURRENCY", defaults.global_concurrency)?,
            per_domain_rps: parse_or(&lookup, "PER_DOMAIN_RPS", defaults.per_domain_rps)?,
            request_timeout_secs: parse_or(
                &lookup,
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_secs,
            )?,
            max_redirects: parse_or(&lookup, "MAX_REDIRECTS", defaults.max_redirects)?,
            max_html_bytes: parse_or(&lookup, "MAX_HTML_BYTES", defaults.max_html_bytes)?,
            cache_ttl_days: parse_or(&lookup, "DISCOVERY_CACHE_TTL_DAYS", defaults.cache_ttl_days)?,
            user_agent: defaults.user_agent,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot drive the resolver.
    pub fn validate(&self) -> ResolverResult<()> {
        if self.global_concurrency == 0 || self.global_concurrency > Semaphore::MAX_PERMITS {
            return Err(ResolverError::Config(format!(
                "GLOBAL_CONCURRENCY={} must be between 1 and {}",
                self.global_concurrency,
                Semaphore::MAX_PERMITS
            )));
        }
        let rps = self.per_domain_rps;
        if !rps.is_finite() || (rps > 0.0 && Duration::try_from_secs_f64(1.0 / rps).is_err()) {
            return Err(ResolverError::Config(format!(
                "PER_DOMAIN_RPS={rps} is not a usable request rate"
            )));
        }
        if self.cache_ttl_days > MAX_CACHE_TTL_DAYS {
            return Err(ResolverError::Config(format!(
                "DISCOVERY_CACHE_TTL_DAYS={} exceeds {MAX_CACHE_TTL_DAYS}",
                self.cache_ttl_days
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        self.request_timeout().min(MAX_CONNECT_TIMEOUT)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_days.saturating_mul(SECS_PER_DAY))
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> ResolverResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ResolverError::Config(format!("{key}={raw:?}: {e}"))),
        _ => Ok(default),
    }
}
