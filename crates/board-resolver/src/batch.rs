//! Batch orchestrator: resolve many organizations' seeds concurrently.
//!
//! Seeds are deduplicated by canonical URL before anything is scheduled, so
//! organizations sharing a board cost one resolution. Every unique seed runs
//! in its own task; cache lookups happen outside the concurrency bound and
//! only real resolutions hold a permit.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::ResolutionCache;
use crate::canonical::canonicalize;
use crate::config::ResolverConfig;
use crate::resolver::{Resolution, Resolver};
use crate::types::{ResolutionResult, ResolverResult, SeedRecord, Stage, StageCounts};

/// A seed whose task died instead of producing a result. It still gets a
/// `task_failed` manual-review entry in [`BatchReport::results`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: String,
    pub message: String,
}

/// One organization joined to the result for its seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub organization_id: String,
    pub claimed_jobs_url: String,
    pub result: ResolutionResult,
}

/// Aggregated outcome of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub input_rows: usize,
    pub unique_seeds: usize,
    pub stage_counts: StageCounts,
    /// Canonical seed URL to result.
    pub results: BTreeMap<String, ResolutionResult>,
    pub failures: Vec<SeedFailure>,
}

impl BatchReport {
    pub fn result_for(&self, seed_url: &str) -> Option<&ResolutionResult> {
        self.results.get(&canonicalize(seed_url))
    }

    /// Pair every input record with its result, in input order.
    ///
    /// Records whose seed is empty or invalid were never scheduled and get an
    /// `invalid_input` manual-review result here.
    pub fn assignments(&self, seeds: &[SeedRecord]) -> Vec<Assignment> {
        seeds
            .iter()
            .map(|seed| {
                let result = self.result_for(&seed.claimed_jobs_url).cloned().unwrap_or_else(|| {
                    ResolutionResult::manual_review(
                        &seed.claimed_jobs_url,
                        seed.claimed_jobs_url.as_str(),
                        0.0,
                        "invalid_input",
                        "jobs_url missing or invalid",
                    )
                });
                Assignment {
                    organization_id: seed.organization_id.clone(),
                    claimed_jobs_url: seed.claimed_jobs_url.clone(),
                    result,
                }
            })
            .collect()
    }
}

struct SeedOutcome {
    result: ResolutionResult,
    stage: Stage,
}

/// Fans seeds out over a bounded set of concurrent resolutions.
pub struct BatchOrchestrator {
    resolver: Arc<Resolver>,
    cache: Arc<dyn ResolutionCache>,
    semaphore: Arc<Semaphore>,
    ttl: Duration,
    limit: Option<usize>,
}

impl BatchOrchestrator {
    pub fn new(config: &ResolverConfig, cache: Arc<dyn ResolutionCache>) -> ResolverResult<Self> {
        let resolver = Arc::new(Resolver::new(config)?);
        Ok(Self::with_resolver(config, resolver, cache))
    }

    pub fn with_resolver(
        config: &ResolverConfig,
        resolver: Arc<Resolver>,
        cache: Arc<dyn ResolutionCache>,
    ) -> Self {
        Self {
            resolver,
            cache,
            semaphore: Arc::new(Semaphore::new(
                config.global_concurrency.clamp(1, Semaphore::MAX_PERMITS),
            )),
            ttl: config.cache_ttl(),
            limit: None,
        }
    }

    /// Only consider the first `limit` input rows.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Resolve every unique seed and wait for all of them.
    pub async fn run(&self, seeds: &[SeedRecord]) -> BatchReport {
        let rows = match self.limit {
            Some(limit) => &seeds[..limit.min(seeds.len())],
            None => seeds,
        };

        // canonical seed -> first raw spelling seen
        let mut unique: Vec<(String, String)> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for record in rows {
            let key = canonicalize(&record.claimed_jobs_url);
            if !key.is_empty() && seen.insert(key.clone()) {
                unique.push((key, record.claimed_jobs_url.clone()));
            }
        }

        info!(
            "Resolving {} unique seeds from {} rows (concurrency {})",
            unique.len(),
            rows.len(),
            self.semaphore.available_permits()
        );

        let handles: Vec<(String, String, JoinHandle<SeedOutcome>)> = unique
            .into_iter()
            .map(|(key, raw)| {
                let task = self.spawn_seed(key.clone(), raw.clone());
                (key, raw, task)
            })
            .collect();

        let mut report = BatchReport {
            input_rows: rows.len(),
            unique_seeds: handles.len(),
            ..BatchReport::default()
        };

        for (key, raw, handle) in handles {
            match handle.await {
                Ok(outcome) => {
                    report.stage_counts.record(outcome.stage);
                    report.results.insert(key, outcome.result);
                }
                Err(e) => {
                    warn!("Resolution task for {} failed: {}", key, e);
                    let message = e.to_string();
                    report.stage_counts.record(Stage::ManualReview);
                    report.results.insert(
                        key.clone(),
                        ResolutionResult::manual_review(
                            &raw,
                            key.as_str(),
                            0.0,
                            "task_failed",
                            message.as_str(),
                        ),
                    );
                    report.failures.push(SeedFailure { seed: key, message });
                }
            }
        }

        info!(
            "Batch complete: {} resolved, {} failed, {} from cache",
            report.results.len(),
            report.failures.len(),
            report.stage_counts.cache
        );
        report
    }

    fn spawn_seed(&self, key: String, raw: String) -> JoinHandle<SeedOutcome> {
        let resolver = Arc::clone(&self.resolver);
        let cache = Arc::clone(&self.cache);
        let semaphore = Arc::clone(&self.semaphore);
        let ttl = self.ttl;

        tokio::spawn(async move {
            let lookup = {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                on_blocking_pool(move || cache.get(&key)).await
            };
            match lookup {
                Ok(Some(entry)) => {
                    return SeedOutcome {
                        result: entry.result,
                        stage: Stage::Cache,
                    };
                }
                Ok(None) => {}
                Err(e) => warn!("Cache lookup for {} failed: {}", key, e),
            }

            // The semaphore is never closed.
            let _permit = semaphore.acquire_owned().await.ok();
            let Resolution { result, stage } = resolver.resolve(&raw).await;

            let stored = result.clone();
            let write_key = key.clone();
            if let Err(e) = on_blocking_pool(move || cache.put(&write_key, &stored, ttl)).await {
                warn!("Cache write for {} failed: {}", key, e);
            }
            SeedOutcome { result, stage }
        })
    }
}

/// Run a store call off the async workers. A panic inside `f` unwinds into
/// the calling task.
async fn on_blocking_pool<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::types::SourceType;

    fn record(org: &str, url: &str) -> SeedRecord {
        SeedRecord {
            organization_id: org.to_string(),
            claimed_jobs_url: url.to_string(),
        }
    }

    fn orchestrator(cache: Arc<dyn ResolutionCache>) -> BatchOrchestrator {
        let config = ResolverConfig {
            per_domain_rps: 0.0,
            global_concurrency: 4,
            ..ResolverConfig::default()
        };
        BatchOrchestrator::new(&config, cache).unwrap()
    }

    #[tokio::test]
    async fn test_dedupes_and_skips_invalid_seeds() {
        let cache = Arc::new(MemoryCache::new());
        let seeds = vec![
            record("a", "https://town.myworkdayjobs.com/External/"),
            record("b", "HTTPS://TOWN.myworkdayjobs.com/External?utm_source=x"),
            record("c", ""),
            record("d", "https://example.ca/careers.pdf"),
        ];

        let report = orchestrator(cache.clone()).run(&seeds).await;
        assert_eq!(report.input_rows, 4);
        assert_eq!(report.unique_seeds, 2);
        assert_eq!(report.stage_counts.pattern, 1);
        assert_eq!(report.stage_counts.pdf, 1);
        assert_eq!(report.stage_counts.total(), 2);
        assert_eq!(cache.len(), 2);

        let assignments = report.assignments(&seeds);
        assert_eq!(assignments.len(), 4);
        assert_eq!(assignments[0].result, assignments[1].result);
        assert_eq!(assignments[0].result.jobs_source_type, SourceType::AtsWorkday);
        // first raw spelling wins
        assert_eq!(
            assignments[1].result.seed_url,
            "https://town.myworkdayjobs.com/External/"
        );
        assert_eq!(assignments[2].result.discovered_via, "invalid_input");
        assert!(assignments[2].result.manual_review);
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() {
        let cache: Arc<dyn ResolutionCache> = Arc::new(MemoryCache::new());
        let seeds = vec![record("a", "https://town.taleo.net/careersection/1")];
        let batch = orchestrator(cache);

        let first = batch.run(&seeds).await;
        assert_eq!(first.stage_counts.pattern, 1);

        let second = batch.run(&seeds).await;
        assert_eq!(second.stage_counts.cache, 1);
        assert_eq!(second.stage_counts.total(), 1);
        assert_eq!(second.results, first.results);
    }

    #[tokio::test]
    async fn test_repeated_seeds_collapse_to_unique_boards() {
        let cache = Arc::new(MemoryCache::new());
        let seeds: Vec<SeedRecord> = (0..1000)
            .map(|i| {
                let board = i % 10;
                let url = if i % 2 == 0 {
                    format!("https://town{board}.myworkdayjobs.com/External/")
                } else {
                    format!("HTTPS://TOWN{board}.myworkdayjobs.com/External?utm_source=row{i}")
                };
                record(&format!("org-{i}"), &url)
            })
            .collect();

        let report = orchestrator(cache.clone()).run(&seeds).await;
        assert_eq!(report.input_rows, 1000);
        assert_eq!(report.unique_seeds, 10);
        assert_eq!(report.stage_counts.pattern, 10);
        assert_eq!(report.stage_counts.total(), 10);
        assert_eq!(cache.len(), 10);

        let assignments = report.assignments(&seeds);
        assert_eq!(assignments.len(), 1000);
        assert_eq!(assignments[7].result, assignments[997].result);
        assert!(assignments
            .iter()
            .all(|a| a.result.jobs_source_type == SourceType::AtsWorkday));
    }

    #[tokio::test]
    async fn test_oversized_concurrency_is_clamped() {
        let config = ResolverConfig {
            per_domain_rps: 0.0,
            global_concurrency: usize::MAX,
            ..ResolverConfig::default()
        };
        let batch = BatchOrchestrator::new(&config, Arc::new(MemoryCache::new())).unwrap();
        assert_eq!(batch.semaphore.available_permits(), Semaphore::MAX_PERMITS);

        let report = batch
            .run(&[record("a", "https://city.icims.com/jobs")])
            .await;
        assert_eq!(report.stage_counts.pattern, 1);
    }

    #[tokio::test]
    async fn test_limit_applies_to_input_rows() {
        let cache = Arc::new(MemoryCache::new());
        let seeds = vec![
            record("a", "https://town.taleo.net/careersection/1"),
            record("b", "https://city.icims.com/jobs"),
        ];
        let report = orchestrator(cache).with_limit(Some(1)).run(&seeds).await;
        assert_eq!(report.input_rows, 1);
        assert_eq!(report.unique_seeds, 1);
        assert!(report.result_for("https://city.icims.com/jobs").is_none());
    }
}
