//! Record page parsing: title, document type, and download URLs.

use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use crate::index::DocumentType;

/// Site suffix stripped from page titles.
const TITLE_SUFFIX: &str = " | US EPA";

/// Query parameter on record URLs carrying the document type.
const TYPE_PARAM: &str = "timstype";

/// File-download endpoint of the catalog.
pub const DOWNLOAD_ENDPOINT_MARKER: &str = "si_public_file_download.cfm";

/// Extensions that mark a URL as a downloadable file.
pub const DOWNLOAD_EXTENSIONS: [&str; 12] = [
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".tar", ".gz", ".csv",
    ".txt",
];

/// Everything extracted from one record page.
#[derive(Debug, Clone)]
pub struct RecordPage {
    /// Record title with the site suffix stripped.
    pub title: String,
    /// Document type, taken from the record URL's type parameter.
    pub category: DocumentType,
    /// Download URLs in document order, deduplicated.
    pub download_urls: Vec<String>,
}

/// Parses a record page.
///
/// The title comes from the `<title>` tag, the document type from the
/// record URL itself, and the download URLs from every anchor on the page
/// that points at an actual file rather than another webpage.
#[must_use]
pub fn parse_record_page(html: &str, record_url: &str, base: &Url) -> RecordPage {
    let document = Html::parse_document(html);

    RecordPage {
        title: extract_title(&document),
        category: category_from_url(record_url),
        download_urls: extract_download_urls(&document, base),
    }
}

/// Returns true if the URL is a direct download link (not a webpage).
#[must_use]
pub fn is_download_url(url: &str) -> bool {
    let lowered = url.to_lowercase();

    // The catalog's file-download endpoint.
    if lowered.contains(DOWNLOAD_ENDPOINT_MARKER) {
        return true;
    }

    // A bare extension match on the whole URL.
    if DOWNLOAD_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
        return true;
    }

    // An extension inside the path, tolerating trailing query parameters.
    if let Ok(parsed) = Url::parse(&lowered) {
        let path = parsed.path();
        return DOWNLOAD_EXTENSIONS.iter().any(|ext| path.contains(ext));
    }

    false
}

fn extract_title(document: &Html) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .map(|element| {
            element
                .text()
                .collect::<String>()
                .trim()
                .trim_end_matches(TITLE_SUFFIX)
                .trim()
                .to_string()
        })
        .unwrap_or_default()
}

fn category_from_url(record_url: &str) -> DocumentType {
    Url::parse(record_url)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k.eq_ignore_ascii_case(TYPE_PARAM))
                .map(|(_, v)| DocumentType::new(&v))
        })
        .unwrap_or_else(DocumentType::uncategorized)
}

fn extract_download_urls(document: &Html, base: &Url) -> Vec<String> {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return urls;
    };
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(absolute) = base.join(href) else {
            continue;
        };
        let absolute = absolute.to_string();
        if is_download_url(&absolute) && seen.insert(absolute.clone()) {
            urls.push(absolute);
        }
    }
    urls
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://catalog.test/si/").unwrap()
    }

    #[test]
    fn test_is_download_url_endpoint() {
        assert!(is_download_url(
            "https://catalog.test/si/si_public_file_download.cfm?p_download_id=1"
        ));
    }

    #[test]
    fn test_is_download_url_extensions() {
        assert!(is_download_url("https://files.test/report.pdf"));
        assert!(is_download_url("https://files.test/DATA.XLSX"));
        assert!(is_download_url("https://files.test/doc.pdf?version=2"));
        assert!(!is_download_url("https://files.test/about.html"));
        assert!(!is_download_url("https://files.test/records"));
    }

    #[test]
    fn test_parse_record_page_title_strips_site_suffix() {
        let html = "<html><head><title>Lake Erie Sediment Survey | US EPA</title></head><body></body></html>";
        let page = parse_record_page(
            html,
            "https://catalog.test/si/si_public_record_report.cfm?dirEntryId=1",
            &base(),
        );
        assert_eq!(page.title, "Lake Erie Sediment Survey");
    }

    #[test]
    fn test_parse_record_page_category_from_url_param() {
        let page = parse_record_page(
            "<html><body></body></html>",
            "https://catalog.test/si/si_public_record_report.cfm?dirEntryId=1&timstype=Published+Report",
            &base(),
        );
        assert_eq!(page.category.as_str(), "PUBLISHED REPORT");
    }

    #[test]
    fn test_parse_record_page_category_defaults_to_uncategorized() {
        let page = parse_record_page(
            "<html><body></body></html>",
            "https://catalog.test/si/si_public_record_report.cfm?dirEntryId=1",
            &base(),
        );
        assert_eq!(page.category, DocumentType::uncategorized());
    }

    #[test]
    fn test_parse_record_page_collects_only_download_links() {
        let html = r#"<html>
            <head><title>Survey | US EPA</title></head>
            <body>
              <a href="si_public_file_download.cfm?p_download_id=77">Download</a>
              <a href="https://files.test/appendix.pdf">Appendix</a>
              <a href="https://files.test/appendix.pdf">Appendix again</a>
              <a href="related_page.cfm?x=1">Related page</a>
              <a href="https://elsewhere.test/about.html">About</a>
            </body></html>"#;
        let page = parse_record_page(
            html,
            "https://catalog.test/si/si_public_record_report.cfm?dirEntryId=1",
            &base(),
        );
        assert_eq!(
            page.download_urls,
            vec![
                "https://catalog.test/si/si_public_file_download.cfm?p_download_id=77",
                "https://files.test/appendix.pdf",
            ]
        );
    }

    #[test]
    fn test_parse_record_page_empty_body() {
        let page = parse_record_page(
            "<html><body></body></html>",
            "https://catalog.test/si/si_public_record_report.cfm?dirEntryId=1",
            &base(),
        );
        assert!(page.title.is_empty());
        assert!(page.download_urls.is_empty());
    }
}
