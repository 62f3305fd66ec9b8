//! Candidate link extraction and ranking.
//!
//! A landing page is usually a front door to the real job board. We collect
//! every outbound target the page offers (anchors, form actions, meta
//! refreshes), then order them so the most board-like ones are tried first.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::canonical::{canonicalize, host_of, is_http_url};
use crate::classify::{classify_url, looks_like_job_link};
use crate::types::{CandidateLink, OriginKind};

// ── Scoring weights ─────────────────────────────────────────────────────────

const SCORE_CLASSIFIED: i32 = 100;
const SCORE_JOB_KEYWORD: i32 = 35;
const SCORE_OFF_DOMAIN: i32 = 20;
const SCORE_APPLY_WORD: i32 = 10;
const SCORE_META_REFRESH: i32 = 8;
const SCORE_FORM_ACTION: i32 = 6;

const APPLY_WORDS: [&str; 3] = ["apply", "recruit", "vacancy"];

/// Job-looking candidates needed before a page counts as a listing itself.
const HTML_LIST_THRESHOLD: usize = 2;

fn meta_refresh_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)url\s*=\s*['"]?([^'"\s>]+)"#).expect("meta refresh regex is valid")
    })
}

/// Extract anchors, form actions and meta-refresh targets from `html`.
///
/// Targets are resolved against `base_url`, canonicalized and deduplicated
/// (first occurrence wins). Anything that is not an absolute http(s) URL with
/// a host is dropped.
pub fn extract_candidates(html: &str, base_url: &str) -> Vec<CandidateLink> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    let mut raw: Vec<(String, String, OriginKind)> = Vec::new();

    let anchor_sel = Selector::parse("a[href]").expect("anchor selector is valid");
    for element in document.select(&anchor_sel) {
        let href = element.value().attr("href").unwrap_or("").trim();
        if href.is_empty() {
            continue;
        }
        let text = element
            .text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        raw.push((resolve(base.as_ref(), href), text, OriginKind::Anchor));
    }

    let form_sel = Selector::parse("form[action]").expect("form selector is valid");
    for element in document.select(&form_sel) {
        let action = element.value().attr("action").unwrap_or("").trim();
        if action.is_empty() {
            continue;
        }
        raw.push((resolve(base.as_ref(), action), String::new(), OriginKind::FormAction));
    }

    let meta_sel = Selector::parse("meta[http-equiv]").expect("meta selector is valid");
    for element in document.select(&meta_sel) {
        let equiv = element.value().attr("http-equiv").unwrap_or("");
        if !equiv.trim().eq_ignore_ascii_case("refresh") {
            continue;
        }
        let content = element.value().attr("content").unwrap_or("");
        if let Some(target) = meta_refresh_re().captures(content).and_then(|c| c.get(1)) {
            raw.push((
                resolve(base.as_ref(), target.as_str().trim()),
                String::new(),
                OriginKind::MetaRefresh,
            ));
        }
    }

    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|(url, anchor_text, origin)| {
            let normalized = canonicalize(&url);
            if normalized.is_empty() || !is_http_url(&normalized) {
                return None;
            }
            seen.insert(normalized.clone()).then_some(CandidateLink {
                url: normalized,
                anchor_text,
                origin,
            })
        })
        .collect()
}

fn resolve(base: Option<&Url>, href: &str) -> String {
    match base {
        Some(base) => base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}

/// Relevance score for one candidate relative to the page it came from.
pub fn score_candidate(candidate: &CandidateLink, base_host: &str) -> i32 {
    let url = candidate.url.to_lowercase();
    let mut score = 0;

    if classify_url(&candidate.url).is_some() {
        score += SCORE_CLASSIFIED;
    }
    if looks_like_job_link(&url, &candidate.anchor_text) {
        score += SCORE_JOB_KEYWORD;
    }
    // Municipalities often outsource hosting, so off-domain links are more
    // likely to be the real board.
    if let Some(host) = host_of(&candidate.url) {
        if host != base_host {
            score += SCORE_OFF_DOMAIN;
        }
    }
    if APPLY_WORDS.iter().any(|w| url.contains(w)) {
        score += SCORE_APPLY_WORD;
    }
    score += match candidate.origin {
        OriginKind::MetaRefresh => SCORE_META_REFRESH,
        OriginKind::FormAction => SCORE_FORM_ACTION,
        OriginKind::Anchor => 0,
    };

    score
}

/// Sort candidates by descending score. Ties keep extraction order.
pub fn rank_candidates(candidates: Vec<CandidateLink>, base_url: &str) -> Vec<CandidateLink> {
    let base_host = host_of(base_url).unwrap_or_default();
    let mut scored: Vec<(i32, CandidateLink)> = candidates
        .into_iter()
        .map(|c| (score_candidate(&c, &base_host), c))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, c)| c).collect()
}

/// True when the page itself looks like a flat job listing.
pub fn detect_html_list(candidates: &[CandidateLink]) -> bool {
    candidates
        .iter()
        .filter(|c| looks_like_job_link(&c.url, &c.anchor_text))
        .count()
        >= HTML_LIST_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://town.example.ca/";

    #[test]
    fn test_extracts_all_origin_kinds() {
        let html = r#"<html><head>
            <meta http-equiv="Refresh" content="5; URL='https://town.taleo.net/careersection/1'">
          </head><body>
            <a href="/employment/"> Current <b>Job</b> Postings </a>
            <form action="search.php?utm_source=x"><input name="q"></form>
          </body></html>"#;

        let candidates = extract_candidates(html, BASE);
        assert_eq!(candidates.len(), 3);

        assert_eq!(candidates[0].url, "https://town.example.ca/employment");
        assert_eq!(candidates[0].anchor_text, "Current Job Postings");
        assert_eq!(candidates[0].origin, OriginKind::Anchor);

        assert_eq!(candidates[1].url, "https://town.example.ca/search.php");
        assert_eq!(candidates[1].origin, OriginKind::FormAction);

        assert_eq!(candidates[2].url, "https://town.taleo.net/careersection/1");
        assert_eq!(candidates[2].origin, OriginKind::MetaRefresh);
    }

    #[test]
    fn test_dedupes_and_drops_non_http() {
        let html = r##"
            <a href="https://Town.example.ca/jobs/">Jobs</a>
            <a href="/jobs?utm_campaign=x">Jobs again</a>
            <form action="/jobs"></form>
            <a href="mailto:hr@town.example.ca">Email HR</a>
            <a href="javascript:void(0)">Menu</a>
            <a href="">Empty</a>
            <a href="#top">Top</a>
        "##;

        let candidates = extract_candidates(html, BASE);
        let urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://town.example.ca/jobs", "https://town.example.ca/"]);
        assert_eq!(candidates[0].anchor_text, "Jobs");
    }

    #[test]
    fn test_ranking_prefers_classified_off_domain_links() {
        let candidates = vec![
            CandidateLink {
                url: "https://town.example.ca/parks".into(),
                anchor_text: "Parks".into(),
                origin: OriginKind::Anchor,
            },
            CandidateLink {
                url: "https://town.example.ca/careers".into(),
                anchor_text: "Careers".into(),
                origin: OriginKind::Anchor,
            },
            CandidateLink {
                url: "https://town.myworkdayjobs.com/External".into(),
                anchor_text: "Apply".into(),
                origin: OriginKind::Anchor,
            },
        ];

        let ranked = rank_candidates(candidates, BASE);
        assert_eq!(ranked[0].url, "https://town.myworkdayjobs.com/External");
        assert_eq!(ranked[1].url, "https://town.example.ca/careers");
        assert_eq!(ranked[2].url, "https://town.example.ca/parks");
    }

    #[test]
    fn test_score_components() {
        let base_host = "town.example.ca";
        let meta = CandidateLink {
            url: "https://other.org/recruit".into(),
            anchor_text: String::new(),
            origin: OriginKind::MetaRefresh,
        };
        // off-domain + apply word + meta refresh
        assert_eq!(score_candidate(&meta, base_host), 20 + 10 + 8);

        let form = CandidateLink {
            url: "https://town.example.ca/vacancy".into(),
            anchor_text: String::new(),
            origin: OriginKind::FormAction,
        };
        // keyword + apply word + form action
        assert_eq!(score_candidate(&form, base_host), 35 + 10 + 6);
    }

    #[test]
    fn test_ranking_is_stable_for_ties() {
        let candidates: Vec<CandidateLink> = ["a", "b", "c"]
            .iter()
            .map(|p| CandidateLink {
                url: format!("https://town.example.ca/{p}"),
                anchor_text: String::new(),
                origin: OriginKind::Anchor,
            })
            .collect();
        let ranked = rank_candidates(candidates.clone(), BASE);
        assert_eq!(ranked, candidates);
    }

    #[test]
    fn test_detect_html_list() {
        let html = r#"
            <a href="/jobs/clerk">Clerk</a>
            <a href="/news">Seasonal Opportunities</a>
            <a href="/parks">Parks</a>"#;
        assert!(detect_html_list(&extract_candidates(html, BASE)));

        let html = r#"<a href="/jobs/clerk">Clerk</a><a href="/parks">Parks</a>"#;
        assert!(!detect_html_list(&extract_candidates(html, BASE)));
    }
}
