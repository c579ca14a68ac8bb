//! Record data model and the CSV index artifact.
//!
//! The index is the sole hand-off between scraping and downloading: one row
//! per catalog record, fixed metadata columns followed by auto-detected
//! download-URL columns. Because the number of URL columns is data-dependent,
//! rows are read and written as raw CSV records rather than serde structs.
//!
//! # Column Layout
//!
//! ```text
//! original_url, title, document_type, download_count, download_url_1, ..., download_url_N
//! ```
//!
//! A record that carries fewer URLs than the widest record in the index has
//! empty trailing cells; a column present in the header is never dropped.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;
use tracing::warn;
use url::Url;

/// Name prefix that identifies a download-URL column (case-insensitive).
pub const URL_COLUMN_PREFIX: &str = "download_url";

/// Upper bound on detected URL columns per index.
pub const MAX_URL_COLUMNS: usize = 32;

/// Fixed metadata columns preceding the URL columns.
pub const FIXED_COLUMNS: [&str; 4] = ["original_url", "title", "document_type", "download_count"];

/// Query parameter on record-page URLs that carries the stable entry identifier.
const RECORD_ID_PARAM: &str = "dirEntryId";

/// Document types the reference catalog publishes. Anything else is carried
/// through verbatim; an empty type is `UNCATEGORIZED`.
pub const KNOWN_DOCUMENT_TYPES: &[&str] = &[
    "ASSESSMENT DOCUMENT",
    "BOOK",
    "BOOK CHAPTER",
    "COMMUNICATION PRODUCT",
    "CRITERIA DOCUMENT",
    "DATA/SOFTWARE",
    "EPA PUBLISHED PROCEEDINGS",
    "ETV DOCUMENT",
    "EXTRAMURAL DOCUMENT",
    "IRIS ASSESSMENT",
    "JOURNAL",
    "NEWSLETTER",
    "NEWSLETTER ARTICLE",
    "NON-EPA PUBLISHED PROCEEDINGS",
    "PAPER IN EPA PROCEEDINGS",
    "PAPER IN NON-EPA PROCEEDINGS",
    "PRESENTATION",
    "PUBLISHED REPORT",
    "RISK ASSESSMENT GUIDELINES",
    "SCIENCE ACTIVITY",
    "SITE DOCUMENT",
    "SUMMARY",
    "UNCATEGORIZED",
];

/// Errors for reading or writing the index artifact.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Underlying CSV read/write failure.
    #[error("CSV error for {path}: {source}")]
    Csv {
        /// The index file involved.
        path: String,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// The index header is missing required metadata columns.
    #[error("index {path} is missing required column '{column}'")]
    MissingColumn {
        /// The index file involved.
        path: String,
        /// The missing column name.
        column: String,
    },

    /// No URL columns were found (neither detected nor supplied).
    #[error("index {path} has no '{URL_COLUMN_PREFIX}*' columns and no override was given")]
    NoUrlColumns {
        /// The index file involved.
        path: String,
    },

    /// An override column name does not exist in the header.
    #[error("override column '{column}' not present in index {path}")]
    UnknownOverrideColumn {
        /// The index file involved.
        path: String,
        /// The unknown column name.
        column: String,
    },
}

impl IndexError {
    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Document-type category of a record.
///
/// The catalog's categories are free-form uppercase labels; values are
/// normalized to uppercase on construction and an empty label maps to
/// [`DocumentType::uncategorized`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentType(String);

impl DocumentType {
    /// Normalizes a raw label into a document type.
    #[must_use]
    pub fn new(label: &str) -> Self {
        let normalized = label.trim().to_uppercase();
        if normalized.is_empty() {
            Self::uncategorized()
        } else {
            Self(normalized)
        }
    }

    /// The type assigned to records without a category.
    #[must_use]
    pub fn uncategorized() -> Self {
        Self("UNCATEGORIZED".to_string())
    }

    /// The normalized label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this label is one the reference catalog publishes.
    #[must_use]
    pub fn is_known(&self) -> bool {
        KNOWN_DOCUMENT_TYPES.contains(&self.0.as_str())
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One populated URL cell of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadUrl {
    /// The CSV column the URL came from (e.g. `download_url_2`).
    pub column: String,
    /// The download URL.
    pub url: String,
}

/// One catalog entry: metadata plus zero or more download URLs.
///
/// Immutable after scraping; a record with no URLs still occupies an index
/// row and simply contributes no download tasks.
#[derive(Debug, Clone)]
pub struct Record {
    /// Stable identifier: the entry id from the record-page URL, or the full
    /// URL when no id parameter is present.
    pub id: String,
    /// The record-page URL.
    pub url: String,
    /// Record title, free text.
    pub title: String,
    /// Document-type category.
    pub category: DocumentType,
    /// Populated URL cells in column order.
    pub downloads: Vec<DownloadUrl>,
}

impl Record {
    /// Builds a record from scraped fields, deriving the stable id from the
    /// record-page URL.
    #[must_use]
    pub fn new(url: String, title: String, category: DocumentType, urls: Vec<String>) -> Self {
        let downloads = urls
            .into_iter()
            .enumerate()
            .map(|(i, u)| DownloadUrl {
                column: format!("{URL_COLUMN_PREFIX}_{}", i + 1),
                url: u,
            })
            .collect();
        Self {
            id: record_id_from_url(&url),
            url,
            title,
            category,
            downloads,
        }
    }
}

/// Extracts the stable record identifier from a record-page URL.
///
/// Falls back to the full URL when the entry-id query parameter is absent or
/// the URL does not parse, so every record still has a usable identifier.
#[must_use]
pub fn record_id_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k.eq_ignore_ascii_case(RECORD_ID_PARAM))
                .map(|(_, v)| v.into_owned())
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| url.to_string())
}

/// The ordered collection of records backing one harvest run.
#[derive(Debug, Default)]
pub struct Index {
    records: Vec<Record>,
}

impl Index {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. The index is append-only; rows are never rewritten.
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// The records in scrape order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keeps only the first `cap` records, for bounded test runs.
    pub fn truncate(&mut self, cap: usize) {
        self.records.truncate(cap);
    }

    /// The widest URL count across all records, capped at [`MAX_URL_COLUMNS`].
    #[must_use]
    pub fn max_url_count(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.downloads.len())
            .max()
            .unwrap_or(0)
            .min(MAX_URL_COLUMNS)
    }

    /// Writes the index as CSV with fixed metadata columns plus one
    /// `download_url_N` column per URL slot in use.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Csv`] on any write failure.
    pub fn write_csv(&self, path: &Path) -> Result<(), IndexError> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| IndexError::csv(path, e))?;

        let url_columns = self.max_url_count();
        let mut header: Vec<String> = FIXED_COLUMNS.iter().map(|c| (*c).to_string()).collect();
        for i in 1..=url_columns {
            header.push(format!("{URL_COLUMN_PREFIX}_{i}"));
        }
        writer
            .write_record(&header)
            .map_err(|e| IndexError::csv(path, e))?;

        for record in &self.records {
            let mut row: Vec<String> = vec![
                record.url.clone(),
                record.title.clone(),
                record.category.as_str().to_string(),
                record.downloads.len().min(MAX_URL_COLUMNS).to_string(),
            ];
            for i in 0..url_columns {
                row.push(
                    record
                        .downloads
                        .get(i)
                        .map(|d| d.url.clone())
                        .unwrap_or_default(),
                );
            }
            writer
                .write_record(&row)
                .map_err(|e| IndexError::csv(path, e))?;
        }

        writer
            .flush()
            .map_err(|e| IndexError::csv(path, csv::Error::from(e)))?;
        Ok(())
    }

    /// Reads an index CSV, auto-detecting URL columns by the name-prefix
    /// convention, or using `column_override` when supplied.
    ///
    /// Detection is performed once from the header and applied uniformly to
    /// every row; an empty cell is an absent URL, not a missing column.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the file cannot be parsed, required
    /// metadata columns are missing, an override names an unknown column, or
    /// no URL column exists at all.
    pub fn read_csv(path: &Path, column_override: &[String]) -> Result<Self, IndexError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| IndexError::csv(path, e))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| IndexError::csv(path, e))?
            .iter()
            .map(str::to_string)
            .collect();

        let col = |name: &str| -> Result<usize, IndexError> {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| IndexError::MissingColumn {
                    path: path.display().to_string(),
                    column: name.to_string(),
                })
        };
        let url_col = col("original_url")?;
        let title_col = col("title")?;
        let type_col = col("document_type")?;

        let url_columns = detect_url_columns(&headers, column_override, path)?;

        let mut index = Self::new();
        for (row_number, row) in reader.records().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(row = row_number + 2, error = %e, "skipping malformed index row");
                    continue;
                }
            };

            let cell = |i: usize| row.get(i).unwrap_or("").trim().to_string();
            let record_url = cell(url_col);
            let downloads: Vec<DownloadUrl> = url_columns
                .iter()
                .filter_map(|(name, i)| {
                    let value = cell(*i);
                    (!value.is_empty()).then(|| DownloadUrl {
                        column: name.clone(),
                        url: value,
                    })
                })
                .collect();

            index.push(Record {
                id: record_id_from_url(&record_url),
                url: record_url,
                title: cell(title_col),
                category: DocumentType::new(&cell(type_col)),
                downloads,
            });
        }

        Ok(index)
    }
}

/// Resolves the URL columns of a header: either the caller's override list or
/// every header cell starting with [`URL_COLUMN_PREFIX`], capped at
/// [`MAX_URL_COLUMNS`].
fn detect_url_columns(
    headers: &[String],
    column_override: &[String],
    path: &Path,
) -> Result<Vec<(String, usize)>, IndexError> {
    let mut columns = Vec::new();

    if column_override.is_empty() {
        for (i, header) in headers.iter().enumerate() {
            if header.to_lowercase().starts_with(URL_COLUMN_PREFIX) {
                columns.push((header.clone(), i));
            }
        }
    } else {
        let mut seen = HashSet::new();
        for name in column_override {
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            let i = headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| IndexError::UnknownOverrideColumn {
                    path: path.display().to_string(),
                    column: name.clone(),
                })?;
            columns.push((headers[i].clone(), i));
        }
    }

    if columns.is_empty() {
        return Err(IndexError::NoUrlColumns {
            path: path.display().to_string(),
        });
    }
    if columns.len() > MAX_URL_COLUMNS {
        warn!(
            detected = columns.len(),
            cap = MAX_URL_COLUMNS,
            "URL column count exceeds cap; extra columns ignored"
        );
        columns.truncate(MAX_URL_COLUMNS);
    }
    Ok(columns)
}
