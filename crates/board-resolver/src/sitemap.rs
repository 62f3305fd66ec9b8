//! Parse sitemap.xml and sitemap index files for job-page hints.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::canonical::canonicalize;

/// Sitemap `<loc>` hints considered per seed.
pub const MAX_SITEMAP_HINTS: usize = 3;

/// Substrings that mark a sitemap location as job-related.
const HINT_KEYWORDS: [&str; 4] = ["job", "career", "employment", "opportun"];

/// Collect every `<loc>` inside `<url>` or `<sitemap>` elements, in document order.
///
/// Bodies are fetched under a byte budget and may be cut off mid-element, so
/// a parse error ends the scan and keeps whatever was read before it.
pub fn parse_locs(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut locs = Vec::new();
    let mut in_entry = false;
    let mut in_loc = false;
    let mut current_loc = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                match e.local_name().as_ref() {
                    b"url" | b"sitemap" => {
                        in_entry = true;
                        current_loc.clear();
                    }
                    b"loc" => in_loc = in_entry,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"loc" => in_loc = false,
                    b"url" | b"sitemap" if in_entry => {
                        if !current_loc.is_empty() {
                            locs.push(current_loc.clone());
                        }
                        in_entry = false;
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) if in_loc => {
                if let Ok(text) = e.unescape() {
                    current_loc.push_str(text.trim());
                }
            }
            Ok(Event::CData(e)) if in_loc => {
                current_loc.push_str(String::from_utf8_lossy(&e).trim());
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!("sitemap parse stopped after {} locs: {e}", locs.len());
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    locs
}

/// Up to [`MAX_SITEMAP_HINTS`] canonical, deduplicated job-looking locations.
pub fn job_hints(xml: &str) -> Vec<String> {
    let mut hints: Vec<String> = Vec::new();
    for loc in parse_locs(xml) {
        let normalized = canonicalize(&loc);
        if normalized.is_empty() || hints.contains(&normalized) {
            continue;
        }
        let lower = normalized.to_lowercase();
        if HINT_KEYWORDS.iter().any(|k| lower.contains(k)) {
            hints.push(normalized);
            if hints.len() == MAX_SITEMAP_HINTS {
                break;
            }
        }
    }
    hints
}
