//! Core data types for seed resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of job source a resolved URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    AtsWorkday,
    AtsTaleo,
    AtsIcims,
    AtsNeogov,
    AtsUltipro,
    AtsAdp,
    Pdf,
    HtmlList,
    Unknown,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::AtsWorkday => "ats_workday",
            SourceType::AtsTaleo => "ats_taleo",
            SourceType::AtsIcims => "ats_icims",
            SourceType::AtsNeogov => "ats_neogov",
            SourceType::AtsUltipro => "ats_ultipro",
            SourceType::AtsAdp => "ats_adp",
            SourceType::Pdf => "pdf",
            SourceType::HtmlList => "html_list",
            SourceType::Unknown => "unknown",
        }
    }

    /// Parse the snake_case form written by [`SourceType::as_str`].
    /// Anything unrecognised maps to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value {
            "ats_workday" => SourceType::AtsWorkday,
            "ats_taleo" => SourceType::AtsTaleo,
            "ats_icims" => SourceType::AtsIcims,
            "ats_neogov" => SourceType::AtsNeogov,
            "ats_ultipro" => SourceType::AtsUltipro,
            "ats_adp" => SourceType::AtsAdp,
            "pdf" => SourceType::Pdf,
            "html_list" => SourceType::HtmlList,
            _ => SourceType::Unknown,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classifier rule match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationHit {
    pub jobs_source_type: SourceType,
    pub adapter: String,
    pub confidence: f64,
    pub reason: String,
}

impl ClassificationHit {
    pub fn is_pdf(&self) -> bool {
        self.jobs_source_type == SourceType::Pdf
    }
}

/// Where on a page a candidate link was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    Anchor,
    FormAction,
    MetaRefresh,
}

impl OriginKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OriginKind::Anchor => "anchor",
            OriginKind::FormAction => "form_action",
            OriginKind::MetaRefresh => "meta_refresh",
        }
    }
}

impl fmt::Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound link-like target extracted from a fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLink {
    /// Canonical form of the resolved target.
    pub url: String,
    pub anchor_text: String,
    pub origin: OriginKind,
}

/// Outcome of following a URL's redirects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectResult {
    pub requested_url: String,
    pub final_url: String,
    /// Every URL visited, starting with the requested one and ending with `final_url`.
    pub chain: Vec<String>,
    /// 0 when no response was obtained.
    pub status_code: u16,
    pub method: String,
    /// Transport failure description; empty on success.
    pub error: String,
}

impl RedirectResult {
    /// A response was obtained without transport error. The status itself
    /// is not inspected: a 403 at the end of a chain is still usable.
    pub fn ok(&self) -> bool {
        self.error.is_empty() && self.status_code > 0
    }

    pub(crate) fn failed(
        requested_url: impl Into<String>,
        final_url: impl Into<String>,
        chain: Vec<String>,
        method: &str,
        error: impl Into<String>,
    ) -> Self {
        Self {
            requested_url: requested_url.into(),
            final_url: final_url.into(),
            chain,
            status_code: 0,
            method: method.to_string(),
            error: error.into(),
        }
    }
}

/// The engine's per-seed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub seed_url: String,
    pub canonical_jobs_url: String,
    pub jobs_source_type: SourceType,
    pub adapter: String,
    pub confidence: f64,
    pub discovered_via: String,
    pub notes: String,
    pub manual_review: bool,
}

impl ResolutionResult {
    /// A result backed by a specific classifier rule.
    pub fn from_hit(
        seed_url: &str,
        canonical_jobs_url: impl Into<String>,
        hit: &ClassificationHit,
        discovered_via: impl Into<String>,
    ) -> Self {
        Self {
            seed_url: seed_url.to_string(),
            canonical_jobs_url: canonical_jobs_url.into(),
            jobs_source_type: hit.jobs_source_type,
            adapter: hit.adapter.clone(),
            confidence: hit.confidence.clamp(0.0, 1.0),
            discovered_via: discovered_via.into(),
            notes: hit.reason.clone(),
            manual_review: false,
        }
    }

    /// An unclassified outcome that needs a human to confirm it.
    pub fn manual_review(
        seed_url: &str,
        canonical_jobs_url: impl Into<String>,
        confidence: f64,
        discovered_via: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            seed_url: seed_url.to_string(),
            canonical_jobs_url: canonical_jobs_url.into(),
            jobs_source_type: SourceType::Unknown,
            adapter: "generic".to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            discovered_via: discovered_via.into(),
            notes: notes.into(),
            manual_review: true,
        }
    }

    pub(crate) fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub(crate) fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// The stage that produced a seed's final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cache,
    Pattern,
    Redirect,
    Html,
    Sitemap,
    HtmlList,
    Pdf,
    ManualReview,
}

/// Per-run tally of which stage settled each seed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub cache: usize,
    pub pattern: usize,
    pub redirect: usize,
    pub html: usize,
    pub sitemap: usize,
    pub html_list: usize,
    pub pdf: usize,
    pub manual_review: usize,
}

impl StageCounts {
    pub fn record(&mut self, stage: Stage) {
        let slot = match stage {
            Stage::Cache => &mut self.cache,
            Stage::Pattern => &mut self.pattern,
            Stage::Redirect => &mut self.redirect,
            Stage::Html => &mut self.html,
            Stage::Sitemap => &mut self.sitemap,
            Stage::HtmlList => &mut self.html_list,
            Stage::Pdf => &mut self.pdf,
            Stage::ManualReview => &mut self.manual_review,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.cache
            + self.pattern
            + self.redirect
            + self.html
            + self.sitemap
            + self.html_list
            + self.pdf
            + self.manual_review
    }
}

/// One organization's claimed jobs page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRecord {
    pub organization_id: String,
    pub claimed_jobs_url: String,
}

/// Errors that can occur in the resolver library.
#[derive(thiserror::Error, Debug)]
pub enum ResolverError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ResolverResult<T> = Result<T, ResolverError>;
