//! URL pattern classifier.
//!
//! An ordered list of (pattern, hit) rules covering the applicant tracking
//! systems we know how to poll. The first matching rule wins, so rules that
//! overlap must stay in precedence order.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::canonical::canonicalize;
use crate::types::{ClassificationHit, SourceType};

/// Confidence given to a bare PDF target.
pub const PDF_CONFIDENCE: f64 = 0.75;

/// Floor applied when a hit only appears after at least one redirect.
const INDIRECT_FLOOR: f64 = 0.85;
const INDIRECT_PENALTY: f64 = 0.05;

/// Words that make a URL or its anchor text look job-related.
pub const JOB_KEYWORDS: [&str; 9] = [
    "job",
    "jobs",
    "career",
    "careers",
    "employment",
    "opportunity",
    "opportunities",
    "vacancy",
    "vacancies",
];

/// One classifier rule, tested against the host and against `host + path`.
pub struct AtsRule {
    pattern: Regex,
    source_type: SourceType,
    adapter: &'static str,
    confidence: f64,
    reason: &'static str,
}

impl AtsRule {
    fn new(
        pattern: &str,
        source_type: SourceType,
        adapter: &'static str,
        reason: &'static str,
    ) -> Self {
        Self {
            pattern: Regex::new(&format!("(?i){pattern}")).expect("ATS rule regex is valid"),
            source_type,
            adapter,
            confidence: 0.98,
            reason,
        }
    }

    fn matches(&self, host: &str, host_and_path: &str) -> bool {
        self.pattern.is_match(host) || self.pattern.is_match(host_and_path)
    }

    fn hit(&self) -> ClassificationHit {
        ClassificationHit {
            jobs_source_type: self.source_type,
            adapter: self.adapter.to_string(),
            confidence: self.confidence,
            reason: self.reason.to_string(),
        }
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }
}

/// The rule table, in precedence order.
pub fn ats_rules() -> &'static [AtsRule] {
    static RULES: OnceLock<Vec<AtsRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            AtsRule::new(
                r"(?:^|\.)myworkdayjobs\.com$|/wday/cxs/",
                SourceType::AtsWorkday,
                "workday",
                "matched workday domain/path",
            ),
            AtsRule::new(
                r"(?:^|\.)taleo\.net$|careersection|candidateexperience",
                SourceType::AtsTaleo,
                "taleo",
                "matched taleo/oracle careers pattern",
            ),
            AtsRule::new(
                r"(?:^|\.)icims\.com$|jobs\.icims\.com",
                SourceType::AtsIcims,
                "icims",
                "matched icims domain",
            ),
            AtsRule::new(
                r"governmentjobs\.com|(?:^|\.)neogov\.com$",
                SourceType::AtsNeogov,
                "neogov",
                "matched neogov/governmentjobs",
            ),
            AtsRule::new(
                r"recruiting\.ultipro\.(?:ca|com)|ukg|ultipro",
                SourceType::AtsUltipro,
                "ultipro",
                "matched ultipro/ukg recruiting",
            ),
            AtsRule::new(
                r"workforcenow\.adp\.com|adp\.com/.*/recruit",
                SourceType::AtsAdp,
                "adp",
                "matched adp recruitment path",
            ),
        ]
    })
}

/// Classify a single URL by host and path.
pub fn classify_url(url: &str) -> Option<ClassificationHit> {
    classify_with(ats_rules(), url)
}

fn classify_with(rules: &[AtsRule], url: &str) -> Option<ClassificationHit> {
    let normalized = canonicalize(url);
    if normalized.is_empty() {
        return None;
    }
    let parsed = Url::parse(&normalized).ok()?;
    let host = parsed.host_str().unwrap_or("");
    let path = parsed.path();
    let host_and_path = format!("{host}{path}");

    if let Some(rule) = rules.iter().find(|r| r.matches(host, &host_and_path)) {
        return Some(rule.hit());
    }

    if path.to_ascii_lowercase().ends_with(".pdf") {
        return Some(ClassificationHit {
            jobs_source_type: SourceType::Pdf,
            adapter: "pdf".to_string(),
            confidence: PDF_CONFIDENCE,
            reason: "pdf path detected".to_string(),
        });
    }

    None
}

/// Classify a redirect chain: the first hit anywhere in the chain wins, but a
/// hit that needed at least one redirect loses some confidence.
pub fn classify_chain<S: AsRef<str>>(chain: &[S]) -> Option<ClassificationHit> {
    chain.iter().enumerate().find_map(|(idx, url)| {
        let hit = classify_url(url.as_ref())?;
        if idx == 0 {
            return Some(hit);
        }
        Some(ClassificationHit {
            confidence: INDIRECT_FLOOR.max(hit.confidence - INDIRECT_PENALTY),
            reason: format!("redirect chain: {}", hit.reason),
            ..hit
        })
    })
}

/// True when the URL or its anchor text mentions a job keyword.
pub fn looks_like_job_link(url: &str, anchor_text: &str) -> bool {
    let target = format!("{url} {anchor_text}").to_lowercase();
    JOB_KEYWORDS.iter().any(|word| target.contains(word))
}
