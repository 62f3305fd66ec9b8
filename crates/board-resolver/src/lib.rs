//! Board Resolver: turn stale or malformed jobs-page URLs into canonical,
//! classified job-board endpoints.

pub mod batch;
pub mod cache;
pub mod candidates;
pub mod canonical;
pub mod classify;
pub mod config;
pub mod fetch;
pub mod rate_limit;
pub mod resolver;
pub mod sitemap;
pub mod types;

pub use batch::{Assignment, BatchOrchestrator, BatchReport, SeedFailure};
pub use cache::{Board, CacheEntry, MemoryCache, ResolutionCache, SqliteCache};
pub use candidates::{detect_html_list, extract_candidates, rank_candidates};
pub use canonical::canonicalize;
pub use classify::{classify_chain, classify_url};
pub use config::ResolverConfig;
pub use fetch::{url_variants, FetchedBody, Fetcher, RetryPolicy};
pub use rate_limit::DomainRateLimiter;
pub use resolver::{Resolution, Resolver};
pub use types::*;
