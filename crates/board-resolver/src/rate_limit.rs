//! Per-domain request spacing.
//!
//! Each registrable domain owns a "next allowed instant" behind its own async
//! mutex, so callers for one domain queue behind each other while callers for
//! other domains proceed untouched.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Slowest spacing the limiter will enforce. Lower rates are clamped to it.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default)]
pub struct DomainRateLimiter {
    /// `None` means unlimited.
    interval: Option<Duration>,
    slots: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl DomainRateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let interval = (requests_per_second.is_finite() && requests_per_second > 0.0).then(|| {
            Duration::try_from_secs_f64(1.0 / requests_per_second)
                .map_or(MAX_INTERVAL, |d| d.min(MAX_INTERVAL))
        });
        Self {
            interval,
            slots: DashMap::new(),
        }
    }

    #[cfg(test)]
    fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Wait until a request to `url`'s registrable domain may be issued.
    pub async fn wait(&self, url: &str) {
        let Some(interval) = self.interval else {
            return;
        };
        let key = domain_key(url);
        // Clone the slot out so the map shard is not held across the await.
        let slot = self
            .slots
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut next_allowed = slot.lock().await;
        if let Some(at) = *next_allowed {
            if at > Instant::now() {
                tokio::time::sleep_until(at).await;
            }
        }
        *next_allowed = Some(Instant::now() + interval);
    }
}

/// Rate-limit bucket for `url`: the last two host labels.
///
/// `jobs.example.com` and `example.com` share a bucket; a single-label host
/// is its own bucket. Unparseable input lands in the empty bucket.
pub fn domain_key(url: &str) -> String {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_default();
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }
    labels[labels.len() - 2..].join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_key_groups_subdomains() {
        assert_eq!(domain_key("https://jobs.example.com/x"), "example.com");
        assert_eq!(domain_key("https://example.com/"), "example.com");
        assert_eq!(domain_key("https://a.b.Town.ON.ca/"), "on.ca");
        assert_eq!(domain_key("http://localhost:8080/"), "localhost");
        assert_eq!(domain_key("garbage"), "");
    }

    #[test]
    fn test_non_positive_rate_is_unlimited() {
        assert_eq!(DomainRateLimiter::new(0.0).interval(), None);
        assert_eq!(DomainRateLimiter::new(-3.0).interval(), None);
        assert_eq!(DomainRateLimiter::new(f64::NAN).interval(), None);
        assert_eq!(
            DomainRateLimiter::new(4.0).interval(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_tiny_rate_is_clamped() {
        assert_eq!(DomainRateLimiter::new(1e-30).interval(), Some(MAX_INTERVAL));
        assert_eq!(DomainRateLimiter::new(f64::MIN_POSITIVE).interval(), Some(MAX_INTERVAL));
        assert_eq!(DomainRateLimiter::new(1e-6).interval(), Some(MAX_INTERVAL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_domain_requests_are_spaced() {
        let limiter = DomainRateLimiter::new(2.0);
        let start = Instant::now();
        for _ in 0..4 {
            limiter.wait("https://jobs.example.com/a").await;
        }
        // (N - 1) / R = 3 / 2
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_get_distinct_slots() {
        let limiter = Arc::new(DomainRateLimiter::new(10.0));
        let start = Instant::now();
        let mut handles = Vec::new();
        for i in 0..5 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                let sub = if i % 2 == 0 { "www" } else { "careers" };
                limiter.wait(&format!("https://{sub}.example.com/")).await;
                Instant::now()
            }));
        }
        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();
        for pair in finished.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_domains_do_not_block_each_other() {
        let limiter = DomainRateLimiter::new(1.0);
        limiter.wait("https://a.example.com/").await;
        let start = Instant::now();
        tokio::join!(
            limiter.wait("https://other.org/"),
            limiter.wait("https://third.net/"),
        );
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_never_sleeps() {
        let limiter = DomainRateLimiter::new(0.0);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.wait("https://example.com/").await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
