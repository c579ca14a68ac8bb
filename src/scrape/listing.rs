//! Search-results listing page parsing.
//!
//! A listing page carries up to one page worth of record links plus the
//! catalog's own total result count, which the scraper reads once at start
//! to derive the page range.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Path marker identifying a record-report link.
pub const RECORD_LINK_MARKER: &str = "si_public_record_report.cfm";

/// Compiles a regex at static init; panics on invalid pattern.
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static RANGE_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?i)records?\s+\d[\d,]*\s*(?:to|through|-|–)\s*\d[\d,]*\s+of\s+([\d,]+)")
});
static OF_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)\bof\s+([\d,]+)\s+records?\b"));

/// Extracts record-report links from a listing page, absolutized against
/// `base` and deduplicated in document order.
#[must_use]
pub fn parse_record_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return links;
    };
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !href.contains(RECORD_LINK_MARKER) {
            continue;
        }
        let Ok(absolute) = base.join(href) else {
            continue;
        };
        let absolute = absolute.to_string();
        if seen.insert(absolute.clone()) {
            links.push(absolute);
        }
    }
    links
}

/// Extracts the catalog's reported total result count from a listing page.
///
/// Recognizes both "Records 1 to 25 of 54,321" and "of 54,321 records"
/// phrasings. Returns `None` when no count is present; the scraper then
/// falls back to the requested page range.
#[must_use]
pub fn parse_result_count(html: &str) -> Option<usize> {
    let captures = RANGE_COUNT_RE
        .captures(html)
        .or_else(|| OF_COUNT_RE.captures(html))?;
    captures
        .get(1)?
        .as_str()
        .replace(',', "")
        .parse::<usize>()
        .ok()
}
