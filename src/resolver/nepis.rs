//! Resolver for the NEPIS document host.
//!
//! NEPIS links are indirect: the catalog links to a viewer URL, and the real
//! downloadable asset is only reachable through the host's "popup" display
//! mode. Resolution fetches the popup variant of the URL and scans its markup
//! for the asset link, which may be a plain anchor or sit inside a
//! script-generated pattern. Anything the scan cannot find fails closed —
//! the task is reported unresolved rather than guessed at.
//!
//! The host enforces an hourly request budget, so every popup fetch goes
//! through the rate limiter under this host's own (stricter) interval.

use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::download::{HttpClient, RateLimiter};

use super::{ResolveError, Resolver};

/// The indirect document host.
pub const NEPIS_HOST: &str = "nepis.epa.gov";

/// Query value selecting the popup display mode (`p|f`, percent-encoded).
const POPUP_DISPLAY: &str = "p%7Cf";

/// Marker phrases indicating the document is only available through a
/// contact channel (matched case-insensitively).
const CONTACT_MARKERS: [&str; 2] = [
    "national technical information service",
    "contact the program officer",
];

/// Compiles a regex at static init; panics on invalid pattern.
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static DISPLAY_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)Display=[^&]*"));
static DOCKEY_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)Dockey=([A-Z0-9]+)"));
static DOCKEY_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)/([A-Z0-9]{8,})\.(?:pdf|txt)"));
static ZYPDF_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?i)(https?://[^"'<>\s]*ZyActionD=ZyPDF[^"'<>\s]*)"#)
});
static ZYNET_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?i)/Exe/ZyNET\.exe/[A-Z0-9]+\.(?:txt|pdf)[^"'<>\s]*"#)
});

/// Returns true if the URL points at the indirect document host.
#[must_use]
pub fn is_nepis_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(NEPIS_HOST)))
        .unwrap_or(false)
}

/// Extracts the document key from any NEPIS URL form.
///
/// Handles both the `Dockey=` query parameter and key-bearing path segments
/// like `/P100GNGT.TXT`. The key is uppercased for stability.
#[must_use]
pub fn extract_dockey(url: &str) -> Option<String> {
    if let Some(caps) = DOCKEY_PARAM_RE.captures(url) {
        return caps.get(1).map(|m| m.as_str().to_uppercase());
    }
    DOCKEY_PATH_RE
        .captures(url)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_uppercase()))
}

/// Constructs the popup variant of a NEPIS URL.
///
/// Replaces any existing `Display=` value with the popup mode, or appends it
/// when the URL carries no display parameter.
#[must_use]
pub fn popup_url(url: &str) -> String {
    if DISPLAY_PARAM_RE.is_match(url) {
        DISPLAY_PARAM_RE
            .replace(url, format!("Display={POPUP_DISPLAY}"))
            .into_owned()
    } else {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}Display={POPUP_DISPLAY}")
    }
}

/// Reconstructs the host's publication-number search URL for a document key.
///
/// Used by the manual-fallback artifact so a human can pull up the document
/// even when the stored viewer link has gone stale.
#[must_use]
pub fn search_url(dockey: &str) -> String {
    format!(
        "https://nepis.epa.gov/Exe/ZyNET.exe/{dockey}.txt?ZyActionD=ZyDocument&Client=EPA\
         &Index=1991%20Thru%201994%7C2011%20Thru%202015%7C2006%20Thru%202010%7C2016%20Thru%202020\
         %7C1995%20Thru%201999%7C1976%20Thru%201980%7C1981%20Thru%201985%7C2000%20Thru%202005\
         %7C1986%20Thru%201990%7CPrior%20to%201976\
         &Docs=&Query={dockey}&Time=&EndTime=&SearchMethod=2&TocRestrict=n&Toc=&TocEntry=\
         &QField=pubnumber%5E%22{dockey}%22&QFieldYear=&QFieldMonth=&QFieldDay=\
         &UseQField=pubnumber&IntQFieldOp=1&ExtQFieldOp=1&XmlQuery="
    )
}

/// Returns the contact-only marker contained in the page, if any.
fn find_contact_marker(html: &str) -> Option<&'static str> {
    let lowered = html.to_lowercase();
    CONTACT_MARKERS
        .iter()
        .find(|marker| lowered.contains(*marker))
        .copied()
}

/// Scans popup markup for the downloadable asset URL.
///
/// Tried in order: an anchor labeled PDF, any pdf-bearing anchor href, the
/// `ZyDocument` to `ZyPDF` action transformation of the popup URL itself, an
/// absolute `ZyPDF` URL in the page source, and a raw viewer path in the
/// page source.
fn extract_asset_url(html: &str, popup: &Url) -> Option<String> {
    let popup_str = popup.as_str();
    let document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse("a[href]") {
        // Anchors whose visible text names the asset.
        for element in document.select(&selector) {
            let text: String = element.text().collect::<String>().trim().to_string();
            if !text.to_uppercase().contains("PDF") {
                continue;
            }
            if let Some(asset) = usable_href(element.value().attr("href"), popup, popup_str) {
                debug!(asset = %asset, "asset link found via labeled anchor");
                return Some(asset);
            }
        }

        // Any anchor whose href itself looks like a pdf link.
        for element in document.select(&selector) {
            let href = element.value().attr("href").unwrap_or("");
            if !href.to_lowercase().contains("pdf") {
                continue;
            }
            if let Some(asset) = usable_href(Some(href), popup, popup_str) {
                debug!(asset = %asset, "asset link found via pdf-bearing href");
                return Some(asset);
            }
        }
    }

    // The viewer serves the asset by swapping the action parameter.
    if popup_str.contains("ZyActionD=ZyDocument") {
        let transformed = popup_str.replace("ZyActionD=ZyDocument", "ZyActionD=ZyPDF");
        debug!(asset = %transformed, "asset link constructed via action transformation");
        return Some(transformed);
    }

    // Script-generated patterns embedded in the page source.
    if let Some(caps) = ZYPDF_URL_RE.captures(html) {
        if let Some(m) = caps.get(1) {
            debug!(asset = m.as_str(), "asset link found in page source");
            return Some(m.as_str().to_string());
        }
    }
    if let Some(m) = ZYNET_PATH_RE.find(html) {
        if let Ok(joined) = popup.join(m.as_str()) {
            debug!(asset = %joined, "asset path found in page source");
            return Some(joined.to_string());
        }
    }

    None
}

/// Absolutizes an anchor href, rejecting placeholders and self-links.
fn usable_href(href: Option<&str>, popup: &Url, popup_str: &str) -> Option<String> {
    let href = href?.trim();
    if href.is_empty() || href == "#" || href.to_lowercase().starts_with("javascript:") {
        return None;
    }
    let absolute = if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        popup.join(href).ok()?.to_string()
    };
    (absolute != popup_str).then_some(absolute)
}

/// Resolver for the indirect document host.
///
/// Fetches the popup variant of the task URL through the rate limiter and
/// extracts the asset link from its markup. Fails closed: contact-only
/// documents and pages without an asset link are reported unresolved and
/// never retried within the run.
pub struct NepisResolver {
    client: HttpClient,
    rate_limiter: Arc<RateLimiter>,
    host: String,
}

impl NepisResolver {
    /// Creates a resolver for the production host.
    #[must_use]
    pub fn new(client: HttpClient, rate_limiter: Arc<RateLimiter>) -> Self {
        Self::with_host(client, rate_limiter, NEPIS_HOST)
    }

    /// Creates a resolver claiming a custom host (used by integration tests).
    #[must_use]
    pub fn with_host(client: HttpClient, rate_limiter: Arc<RateLimiter>, host: &str) -> Self {
        Self {
            client,
            rate_limiter,
            host: host.to_ascii_lowercase(),
        }
    }
}

impl std::fmt::Debug for NepisResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NepisResolver")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for NepisResolver {
    fn name(&self) -> &'static str {
        "nepis"
    }

    fn can_handle(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(&self.host)))
            .unwrap_or(false)
    }

    #[tracing::instrument(skip(self), fields(resolver = "nepis", url = %url))]
    async fn resolve(&self, url: &str) -> Result<String, ResolveError> {
        let popup = popup_url(url);
        let popup_parsed =
            Url::parse(&popup).map_err(|e| ResolveError::popup_fetch(url, e.to_string()))?;

        self.rate_limiter.acquire(&popup).await;
        let body = self
            .client
            .fetch_text(&popup)
            .await
            .map_err(|e| ResolveError::popup_fetch(url, e.to_string()))?;

        if let Some(marker) = find_contact_marker(&body) {
            debug!(marker, "popup page flags contact-based retrieval");
            return Err(ResolveError::contact_only(url, marker));
        }

        extract_asset_url(&body, &popup_parsed).ok_or_else(|| ResolveError::no_asset_link(url))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const VIEWER_URL: &str = "https://nepis.epa.gov/Exe/ZyNET.exe/P100GNGT.TXT?ZyActionD=ZyDocument&Client=EPA&Display=hpfr";

    // --- is_nepis_url / extract_dockey ---

    #[test]
    fn test_is_nepis_url_by_host() {
        assert!(is_nepis_url(VIEWER_URL));
        assert!(is_nepis_url("https://NEPIS.EPA.GOV/Exe/ZyNET.exe/X.TXT"));
        assert!(!is_nepis_url("https://example.com/nepis.epa.gov/fake"));
        assert!(!is_nepis_url("not a url"));
    }

    #[test]
    fn test_extract_dockey_from_query_param() {
        assert_eq!(
            extract_dockey("https://nepis.epa.gov/Exe/ZyNET.exe?Dockey=P100GNGT.txt"),
            Some("P100GNGT".to_string())
        );
    }

    #[test]
    fn test_extract_dockey_from_path() {
        assert_eq!(extract_dockey(VIEWER_URL), Some("P100GNGT".to_string()));
        assert_eq!(
            extract_dockey("https://nepis.epa.gov/docs/p100gngt.pdf"),
            Some("P100GNGT".to_string())
        );
    }

    #[test]
    fn test_extract_dockey_absent() {
        assert_eq!(extract_dockey("https://nepis.epa.gov/Exe/ZyNET.exe"), None);
        // Short segments are not document keys.
        assert_eq!(extract_dockey("https://nepis.epa.gov/a/b.pdf"), None);
    }

    // --- popup_url ---

    #[test]
    fn test_popup_url_replaces_existing_display() {
        let popup = popup_url(VIEWER_URL);
        assert!(popup.contains("Display=p%7Cf"));
        assert!(!popup.contains("Display=hpfr"));
    }

    #[test]
    fn test_popup_url_appends_when_no_display() {
        let popup = popup_url("https://nepis.epa.gov/Exe/ZyNET.exe/X.TXT?Client=EPA");
        assert!(popup.ends_with("&Display=p%7Cf"));

        let popup = popup_url("https://nepis.epa.gov/Exe/ZyNET.exe/X.TXT");
        assert!(popup.ends_with("?Display=p%7Cf"));
    }

    #[test]
    fn test_search_url_carries_dockey() {
        let url = search_url("P100GNGT");
        assert!(url.contains("/P100GNGT.txt"));
        assert!(url.contains("Query=P100GNGT"));
        assert!(url.contains("UseQField=pubnumber"));
    }

    // --- extract_asset_url ---

    fn popup() -> Url {
        Url::parse("https://nepis.epa.gov/Exe/ZyNET.exe/P100GNGT.TXT?Client=EPA&Display=p%7Cf")
            .unwrap()
    }

    #[test]
    fn test_extract_asset_from_labeled_anchor() {
        let html = r##"<html><body>
            <a href="#">Get This Item</a>
            <a href="/Exe/ZyPURL.cgi?Dockey=P100GNGT.TXT">PDF</a>
        </body></html>"##;
        let asset = extract_asset_url(html, &popup()).unwrap();
        assert_eq!(asset, "https://nepis.epa.gov/Exe/ZyPURL.cgi?Dockey=P100GNGT.TXT");
    }

    #[test]
    fn test_extract_asset_skips_javascript_and_placeholder_anchors() {
        let html = r##"<html><body>
            <a href="javascript:ZyShowPDF('hardcopy',event)">PDF</a>
            <a href="#">PDF</a>
            <a href="https://nepis.epa.gov/files/P100GNGT.pdf">PDF version</a>
        </body></html>"##;
        let asset = extract_asset_url(html, &popup()).unwrap();
        assert_eq!(asset, "https://nepis.epa.gov/files/P100GNGT.pdf");
    }

    #[test]
    fn test_extract_asset_from_pdf_bearing_href() {
        let html = r#"<html><body>
            <a href="/download/P100GNGT.pdf">download the document</a>
        </body></html>"#;
        let asset = extract_asset_url(html, &popup()).unwrap();
        assert_eq!(asset, "https://nepis.epa.gov/download/P100GNGT.pdf");
    }

    #[test]
    fn test_extract_asset_via_action_transformation() {
        let popup = Url::parse(
            "https://nepis.epa.gov/Exe/ZyNET.exe/P100GNGT.TXT?ZyActionD=ZyDocument&Display=p%7Cf",
        )
        .unwrap();
        let asset = extract_asset_url("<html><body>viewer</body></html>", &popup).unwrap();
        assert!(asset.contains("ZyActionD=ZyPDF"));
        assert!(!asset.contains("ZyActionD=ZyDocument"));
    }

    #[test]
    fn test_extract_asset_from_embedded_zypdf_url() {
        let html = r#"<html><script>
            function ZyShowPDF(kind, ev) {
                window.open("https://nepis.epa.gov/Exe/ZyPDF.cgi/P100GNGT.PDF?ZyActionD=ZyPDF&Dockey=P100GNGT.PDF");
            }
        </script></html>"#;
        let asset = extract_asset_url(html, &popup()).unwrap();
        assert!(asset.contains("ZyActionD=ZyPDF"));
    }

    #[test]
    fn test_extract_asset_from_viewer_path_in_source() {
        let html = r#"<html><script>
            var doc = '/Exe/ZyNET.exe/P100GNGT.txt?ZyActionL=Later';
        </script></html>"#;
        let asset = extract_asset_url(html, &popup()).unwrap();
        assert!(asset.starts_with("https://nepis.epa.gov/Exe/ZyNET.exe/P100GNGT.txt"));
    }

    #[test]
    fn test_extract_asset_none_when_nothing_matches() {
        let html = "<html><body><p>Nothing to see.</p></body></html>";
        assert_eq!(extract_asset_url(html, &popup()), None);
    }

    #[test]
    fn test_extract_asset_rejects_self_link() {
        let popup = popup();
        let html = format!(r#"<html><body><a href="{popup}">PDF</a></body></html>"#);
        assert_eq!(extract_asset_url(&html, &popup), None);
    }

    // --- contact markers ---

    #[test]
    fn test_find_contact_marker_program_officer() {
        let html = "<html><body>Please contact the Program Officer for a copy.</body></html>";
        assert_eq!(find_contact_marker(html), Some("contact the program officer"));
    }

    #[test]
    fn test_find_contact_marker_ntis() {
        let html =
            "<html><body>Available from the National Technical Information Service.</body></html>";
        assert_eq!(
            find_contact_marker(html),
            Some("national technical information service")
        );
    }

    #[test]
    fn test_find_contact_marker_absent() {
        assert_eq!(find_contact_marker("<html><body>PDF</body></html>"), None);
    }
}
