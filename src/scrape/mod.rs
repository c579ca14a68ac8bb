//! Index scraper: paginated catalog listing into the CSV index.
//!
//! The scraper walks a range of search-result pages (fixed page size), pulls
//! the record links off each page, fetches every record page, and appends one
//! [`Record`] per entry — metadata plus every download URL found. It is
//! purely additive and performs no downloads.
//!
//! Error policy: a listing or record page that fails to fetch or parse is
//! logged and skipped; the scrape keeps going. The page count is derived
//! once from the catalog's own reported result count at scrape start and is
//! not re-validated per page.

pub mod listing;
pub mod record_page;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::{HttpClient, RateLimiter};
use crate::index::{DocumentType, Index, Record};
use listing::{parse_record_links, parse_result_count};
use record_page::parse_record_page;

/// Records per listing page in the reference deployment.
pub const PAGE_SIZE: usize = 25;

/// Default catalog base URL.
pub const DEFAULT_BASE_URL: &str = "https://cfpub.epa.gov/si/";

/// Document types excluded from the index by default.
pub const DEFAULT_EXCLUDED_TYPES: [&str; 1] = ["JOURNAL"];

/// Errors that abort a scrape before it starts.
///
/// Per-page failures are recovered and counted in [`ScrapeStats`], never
/// raised.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The requested page range is empty or inverted.
    #[error("invalid page range {start}..={end}: start must be >= 1 and <= end")]
    InvalidPageRange {
        /// First page requested.
        start: usize,
        /// Last page requested.
        end: usize,
    },

    /// The configured base URL does not parse.
    #[error("invalid catalog base URL: {url}")]
    BaseUrl {
        /// The offending URL string.
        url: String,
    },
}

/// Scrape run configuration.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Catalog base URL; listing and record links resolve against it.
    pub base_url: String,
    /// First listing page (1-based, inclusive).
    pub start_page: usize,
    /// Last listing page (inclusive); clamped to the catalog's own count.
    pub end_page: usize,
    /// Document types to skip (normalized uppercase).
    pub excluded_types: Vec<String>,
    /// Stop after this many records, for bounded test runs.
    pub max_records: Option<usize>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            start_page: 1,
            end_page: 10,
            excluded_types: DEFAULT_EXCLUDED_TYPES
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
            max_records: None,
        }
    }
}

impl ScrapeConfig {
    fn is_excluded(&self, category: &DocumentType) -> bool {
        self.excluded_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(category.as_str()))
    }
}

/// Counters for one scrape run.
#[derive(Debug, Default)]
pub struct ScrapeStats {
    /// Listing pages fetched successfully.
    pub pages_fetched: usize,
    /// Listing pages skipped after fetch or parse failure.
    pub pages_failed: usize,
    /// Records written to the index.
    pub records_scraped: usize,
    /// Records skipped because their type is excluded.
    pub records_excluded: usize,
    /// Record pages skipped after fetch failure.
    pub records_failed: usize,
    /// Records that carry at least one download URL.
    pub with_downloads: usize,
    /// Total download URLs found.
    pub total_urls: usize,
    /// Record counts per document type.
    pub per_type: std::collections::BTreeMap<String, usize>,
}

impl ScrapeStats {
    /// Records that carry no download URL.
    #[must_use]
    pub fn without_downloads(&self) -> usize {
        self.records_scraped - self.with_downloads
    }

    /// Logs the end-of-run summary at info level.
    pub fn log(&self) {
        info!(
            pages_fetched = self.pages_fetched,
            pages_failed = self.pages_failed,
            records = self.records_scraped,
            excluded = self.records_excluded,
            record_failures = self.records_failed,
            with_downloads = self.with_downloads,
            without_downloads = self.without_downloads(),
            total_urls = self.total_urls,
            "scrape complete"
        );
        for (doc_type, count) in &self.per_type {
            debug!(doc_type = %doc_type, count, "document type count");
        }
    }
}

/// Paginated catalog scraper.
#[derive(Debug)]
pub struct IndexScraper {
    client: HttpClient,
    rate_limiter: Arc<RateLimiter>,
    config: ScrapeConfig,
}

impl IndexScraper {
    /// Creates a scraper over the given client, pacer, and configuration.
    #[must_use]
    pub fn new(client: HttpClient, rate_limiter: Arc<RateLimiter>, config: ScrapeConfig) -> Self {
        Self {
            client,
            rate_limiter,
            config,
        }
    }

    /// Runs the scrape and returns the index plus run counters.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] only for invalid configuration; page-level
    /// failures are recovered and counted.
    #[instrument(skip(self), fields(start = self.config.start_page, end = self.config.end_page))]
    pub async fn scrape(&self) -> Result<(Index, ScrapeStats), ScrapeError> {
        let config = &self.config;
        if config.start_page < 1 || config.end_page < config.start_page {
            return Err(ScrapeError::InvalidPageRange {
                start: config.start_page,
                end: config.end_page,
            });
        }
        let base = Url::parse(&config.base_url).map_err(|_| ScrapeError::BaseUrl {
            url: config.base_url.clone(),
        })?;

        let mut index = Index::new();
        let mut stats = ScrapeStats::default();
        let mut end_page = config.end_page;

        let mut page = config.start_page;
        'pages: while page <= end_page {
            if self.reached_record_cap(&index) {
                info!(max_records = ?config.max_records, "record cap reached");
                break;
            }

            let start_index = (page - 1) * PAGE_SIZE;
            let page_url = listing_url(&base, start_index);

            self.rate_limiter.acquire(page_url.as_str()).await;
            let html = match self.client.fetch_text(page_url.as_str()).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(page, error = %e, "listing page failed; skipping");
                    stats.pages_failed += 1;
                    page += 1;
                    continue;
                }
            };
            stats.pages_fetched += 1;

            // Derive the effective page range once, from the catalog's own
            // reported result count.
            if page == config.start_page {
                if let Some(total) = parse_result_count(&html) {
                    let total_pages = total.div_ceil(PAGE_SIZE);
                    if total_pages < end_page {
                        info!(
                            reported_records = total,
                            total_pages, "clamping page range to catalog's reported count"
                        );
                        end_page = total_pages;
                    }
                } else {
                    debug!(page, "no result count on listing page; using requested range");
                }
            }

            let links = parse_record_links(&html, &base);
            if links.is_empty() {
                info!(page, "no record links on page; treating as end of results");
                break;
            }
            debug!(page, records = links.len(), "listing page parsed");

            for record_url in links {
                if self.reached_record_cap(&index) {
                    info!(max_records = ?config.max_records, "record cap reached");
                    break 'pages;
                }
                if let Some(record) = self.scrape_record(&record_url, &base, &mut stats).await {
                    stats.records_scraped += 1;
                    *stats
                        .per_type
                        .entry(record.category.as_str().to_string())
                        .or_default() += 1;
                    if !record.downloads.is_empty() {
                        stats.with_downloads += 1;
                        stats.total_urls += record.downloads.len();
                    }
                    index.push(record);
                }
            }

            page += 1;
        }

        stats.log();
        Ok((index, stats))
    }

    /// Fetches and parses one record page; `None` means skipped (excluded
    /// type or recovered failure).
    async fn scrape_record(
        &self,
        record_url: &str,
        base: &Url,
        stats: &mut ScrapeStats,
    ) -> Option<Record> {
        self.rate_limiter.acquire(record_url).await;
        let html = match self.client.fetch_text(record_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %record_url, error = %e, "record page failed; skipping");
                stats.records_failed += 1;
                return None;
            }
        };

        let page = parse_record_page(&html, record_url, base);
        if self.config.is_excluded(&page.category) {
            debug!(url = %record_url, category = %page.category, "excluded document type");
            stats.records_excluded += 1;
            return None;
        }

        debug!(
            url = %record_url,
            title = %page.title,
            downloads = page.download_urls.len(),
            "record scraped"
        );
        Some(Record::new(
            record_url.to_string(),
            page.title,
            page.category,
            page.download_urls,
        ))
    }

    fn reached_record_cap(&self, index: &Index) -> bool {
        self.config
            .max_records
            .is_some_and(|cap| index.len() >= cap)
    }
}

/// Builds the search-results URL for one page offset.
fn listing_url(base: &Url, start_index: usize) -> Url {
    let mut url = base
        .join("si_public_search_results.cfm")
        .unwrap_or_else(|_| base.clone());
    url.query_pairs_mut()
        .append_pair("simplesearch", "0")
        .append_pair("showcriteria", "2")
        .append_pair("sortby", "pubDate")
        .append_pair("searchAll", "")
        .append_pair("startIndex", &start_index.to_string())
        .append_pair("displayIt", "Yes");
    url
}
