//! Resolution state machine: seed URL to canonical, classified job board.
//!
//! A strict linear decision tree. Each stage runs at most once per seed and
//! the first stage that produces an answer ends the run:
//!
//! 1. invalid input
//! 2. direct URL pattern
//! 3. redirect chain over the seed's URL variants
//! 4. final URL is a PDF
//! 5. landing page candidates, then flat listing detection
//! 6. sitemap hints
//! 7. unresolved fallback

use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use crate::candidates::{detect_html_list, extract_candidates, rank_candidates};
use crate::canonical::canonicalize;
use crate::classify::{classify_chain, classify_url};
use crate::config::ResolverConfig;
use crate::fetch::{url_variants, Fetcher};
use crate::sitemap::job_hints;
use crate::types::{
    ClassificationHit, RedirectResult, ResolutionResult, ResolverResult, SourceType, Stage,
};

/// Candidates per landing page whose redirect chains are followed.
const TOP_CANDIDATES: usize = 3;

const HTML_CONFIDENCE_CAP: f64 = 0.92;
const CANDIDATE_PDF_CONFIDENCE: f64 = 0.78;
const HTML_LIST_CONFIDENCE: f64 = 0.68;
const SITEMAP_CONFIDENCE_CAP: f64 = 0.88;
const FAILED_REQUEST_CONFIDENCE: f64 = 0.2;
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// A seed's result together with the stage that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub result: ResolutionResult,
    pub stage: Stage,
}

impl Resolution {
    fn new(result: ResolutionResult, stage: Stage) -> Self {
        Self { result, stage }
    }

    /// Stage for a rule-backed result: PDF answers always count as `Pdf`.
    fn from_hit(result: ResolutionResult, stage: Stage) -> Self {
        let stage = if result.jobs_source_type == SourceType::Pdf {
            Stage::Pdf
        } else {
            stage
        };
        Self { result, stage }
    }
}

/// Runs the decision tree for one seed at a time.
#[derive(Clone)]
pub struct Resolver {
    fetcher: Arc<Fetcher>,
    max_html_bytes: usize,
}

impl Resolver {
    pub fn new(config: &ResolverConfig) -> ResolverResult<Self> {
        let fetcher = Fetcher::new(config)?;
        Ok(Self::with_fetcher(Arc::new(fetcher), config.max_html_bytes))
    }

    pub fn with_fetcher(fetcher: Arc<Fetcher>, max_html_bytes: usize) -> Self {
        Self {
            fetcher,
            max_html_bytes,
        }
    }

    /// Resolve one seed. Never fails: network trouble ends in a
    /// manual-review result instead.
    pub async fn resolve(&self, seed_url: &str) -> Resolution {
        let resolution = self.run_stages(seed_url).await;
        info!(
            "Resolved {} -> {} ({}, {:.2}, via {})",
            seed_url,
            resolution.result.canonical_jobs_url,
            resolution.result.jobs_source_type,
            resolution.result.confidence,
            resolution.result.discovered_via
        );
        resolution
    }

    async fn run_stages(&self, seed_url: &str) -> Resolution {
        // ── Stage 1: invalid input ──
        let seed = canonicalize(seed_url);
        if seed.is_empty() {
            return Resolution::new(
                ResolutionResult::manual_review(
                    seed_url,
                    seed_url,
                    0.0,
                    "invalid_input",
                    "jobs_url missing or invalid",
                ),
                Stage::ManualReview,
            );
        }

        // ── Stage 2: direct pattern ──
        if let Some(hit) = classify_url(&seed) {
            return Resolution::from_hit(
                ResolutionResult::from_hit(seed_url, seed.as_str(), &hit, "url_pattern"),
                Stage::Pattern,
            );
        }

        // ── Stage 3: redirect chain ──
        let Some(redirect) = self.first_reachable_variant(&seed).await else {
            return Resolution::new(
                ResolutionResult::manual_review(
                    seed_url,
                    seed.as_str(),
                    FAILED_REQUEST_CONFIDENCE,
                    "failed_request",
                    "all URL variants failed",
                ),
                Stage::ManualReview,
            );
        };
        if let Some(hit) = classify_chain(&redirect.chain).filter(|h| !h.is_pdf()) {
            return Resolution::new(
                ResolutionResult::from_hit(
                    seed_url,
                    canonicalize(&redirect.final_url),
                    &hit,
                    "redirect_chain",
                ),
                Stage::Redirect,
            );
        }

        // ── Stage 4: final URL is a PDF ──
        let final_url = canonicalize(&redirect.final_url);
        if let Some(hit) = classify_url(&final_url).filter(ClassificationHit::is_pdf) {
            return Resolution::new(
                ResolutionResult::from_hit(seed_url, final_url.as_str(), &hit, "redirect_pdf")
                    .with_notes("final URL is PDF"),
                Stage::Pdf,
            );
        }

        // ── Stage 5: landing page ──
        let page = self.fetcher.fetch_html(&final_url, self.max_html_bytes).await;
        let page_url = if page.final_url.is_empty() {
            final_url.clone()
        } else {
            canonicalize(&page.final_url)
        };
        if !page.is_empty() {
            if let Some(resolution) = self.resolve_from_page(seed_url, &page.body, &page_url).await {
                return resolution;
            }
        }

        // ── Stage 6: sitemap ──
        if let Some(resolution) = self.resolve_from_sitemap(seed_url, &final_url).await {
            return resolution;
        }

        // ── Stage 7: unresolved ──
        Resolution::new(
            ResolutionResult::manual_review(
                seed_url,
                final_url,
                FALLBACK_CONFIDENCE,
                "fallback_unknown",
                "unable to classify; requires manual review",
            ),
            Stage::ManualReview,
        )
    }

    /// The first variant that resolves at all. Later stages only ever see
    /// this one result.
    async fn first_reachable_variant(&self, seed: &str) -> Option<RedirectResult> {
        for variant in url_variants(seed) {
            let redirect = self.fetcher.resolve_redirects(&variant).await;
            if redirect.ok() {
                return Some(redirect);
            }
            debug!("variant {} unreachable: {}", variant, redirect.error);
        }
        None
    }

    async fn resolve_from_page(
        &self,
        seed_url: &str,
        html: &str,
        page_url: &str,
    ) -> Option<Resolution> {
        let candidates = rank_candidates(extract_candidates(html, page_url), page_url);
        debug!("{} candidates on {}", candidates.len(), page_url);

        for candidate in candidates.iter().take(TOP_CANDIDATES) {
            let chain = self.fetcher.resolve_redirects(&candidate.url).await;
            if !chain.ok() {
                continue;
            }
            let via = format!("html_{}", candidate.origin);
            let landed = canonicalize(&chain.final_url);

            if let Some(hit) = classify_chain(&chain.chain).filter(|h| !h.is_pdf()) {
                let notes = format!("{} via {}", hit.reason, candidate.origin);
                let capped = hit.confidence.min(HTML_CONFIDENCE_CAP);
                return Some(Resolution::new(
                    ResolutionResult::from_hit(seed_url, landed, &hit, via)
                        .with_confidence(capped)
                        .with_notes(notes),
                    Stage::Html,
                ));
            }

            if let Some(hit) = classify_url(&landed).filter(ClassificationHit::is_pdf) {
                return Some(Resolution::new(
                    ResolutionResult::from_hit(seed_url, landed, &hit, via)
                        .with_confidence(CANDIDATE_PDF_CONFIDENCE)
                        .with_notes("candidate link resolved to PDF"),
                    Stage::Pdf,
                ));
            }
        }

        if detect_html_list(&candidates) {
            let hit = ClassificationHit {
                jobs_source_type: SourceType::HtmlList,
                adapter: "html_list".to_string(),
                confidence: HTML_LIST_CONFIDENCE,
                reason: "job-like links found on landing page".to_string(),
            };
            return Some(Resolution::new(
                ResolutionResult::from_hit(seed_url, page_url, &hit, "html_parse"),
                Stage::HtmlList,
            ));
        }

        None
    }

    async fn resolve_from_sitemap(&self, seed_url: &str, final_url: &str) -> Option<Resolution> {
        let sitemap_url = sitemap_url_for(final_url)?;
        let sitemap = self.fetcher.fetch_html(&sitemap_url, self.max_html_bytes).await;
        if sitemap.is_empty() {
            return None;
        }

        for hint in job_hints(&sitemap.body) {
            let chain = self.fetcher.resolve_redirects(&hint).await;
            if !chain.ok() {
                continue;
            }
            if let Some(hit) = classify_chain(&chain.chain) {
                let capped = hit.confidence.min(SITEMAP_CONFIDENCE_CAP);
                return Some(Resolution::from_hit(
                    ResolutionResult::from_hit(
                        seed_url,
                        canonicalize(&chain.final_url),
                        &hit,
                        "sitemap_hint",
                    )
                    .with_confidence(capped),
                    Stage::Sitemap,
                ));
            }
        }
        None
    }
}

/// `{scheme}://{host[:port]}/sitemap.xml` for the origin of `url`.
fn sitemap_url_for(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str()?;
    Some(format!("{}/sitemap.xml", parsed.origin().ascii_serialization()))
}
