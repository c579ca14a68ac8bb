//! HTTP client wrapper for page fetches and streaming file downloads.
//!
//! One client is created per run and reused for every request, taking
//! advantage of connection pooling. Downloads stream to disk under the exact
//! path the caller supplies — filename decisions are made up front by the
//! naming pass, never here.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, MIN_BINARY_BYTES, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// File extensions whose payloads must not be HTML pages. `.bin` covers
/// names derived from opaque download endpoints.
const BINARY_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".tar", ".gz", ".bin",
];

/// HTTP client for catalog pages and file downloads.
///
/// # Example
///
/// ```no_run
/// use harvester_core::download::HttpClient;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let bytes = client
///     .download_to_path("https://example.com/paper.pdf", Path::new("./archive/paper.pdf"))
///     .await?;
/// println!("wrote {bytes} bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with default timeouts (30s connect, 5min read).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied timeouts.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_harvest_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Fetches a URL and returns its body as text.
    ///
    /// Used for listing pages, record pages, and popup pages.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` for invalid URLs, network failures, timeouts,
    /// and non-success statuses.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_text(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.send_get(url).await?;
        response
            .text()
            .await
            .map_err(|e| DownloadError::network(url, e))
    }

    /// Streams a URL's bytes to the exact destination path.
    ///
    /// The first chunk is validated against the destination's extension: an
    /// HTML payload for a binary name, a `.pdf` without the `%PDF` magic, or
    /// a suspiciously small binary payload all fail the task, and the
    /// partial file is removed.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` for invalid URLs, network failures, timeouts,
    /// non-success statuses, payload validation failures, and IO errors.
    #[must_use = "download result reports bytes written"]
    #[instrument(skip(self), fields(url = %url, dest = %dest.display()))]
    pub async fn download_to_path(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        debug!("starting download");
        let response = self.send_get(url).await?;

        let expect_binary = expects_binary(dest);
        let expect_pdf = has_extension(dest, ".pdf");

        let mut file = File::create(dest)
            .await
            .map_err(|e| DownloadError::io(dest.to_path_buf(), e))?;
        let mut writer = BufWriter::new(&mut file);
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;
        let mut first_chunk = true;

        let mut failure: Option<DownloadError> = None;
        while let Some(chunk_result) = stream.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(e) => {
                    failure = Some(DownloadError::network(url, e));
                    break;
                }
            };
            if chunk.is_empty() {
                continue;
            }

            if first_chunk {
                first_chunk = false;
                if expect_binary && looks_like_html(&chunk) {
                    failure = Some(DownloadError::invalid_payload(
                        url,
                        "HTML page returned where a binary file was expected",
                    ));
                    break;
                }
                if expect_pdf && !chunk.starts_with(b"%PDF") {
                    failure = Some(DownloadError::invalid_payload(url, "missing %PDF header"));
                    break;
                }
            }

            if let Err(e) = writer.write_all(&chunk).await {
                failure = Some(DownloadError::io(dest.to_path_buf(), e));
                break;
            }
            bytes_written += chunk.len() as u64;
        }

        if failure.is_none() {
            if let Err(e) = writer.flush().await {
                failure = Some(DownloadError::io(dest.to_path_buf(), e));
            }
        }

        if failure.is_none() && expect_binary && bytes_written < MIN_BINARY_BYTES {
            failure = Some(DownloadError::invalid_payload(
                url,
                format!("payload too small to be a document ({bytes_written} bytes)"),
            ));
        }
        if failure.is_none() && bytes_written == 0 {
            failure = Some(DownloadError::invalid_payload(url, "empty response body"));
        }

        if let Some(error) = failure {
            drop(writer);
            drop(file);
            debug!(path = %dest.display(), "cleaning up partial file after error");
            let _ = tokio::fs::remove_file(dest).await;
            return Err(error);
        }

        info!(path = %dest.display(), bytes = bytes_written, "download complete");
        Ok(bytes_written)
    }

    async fn send_get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Returns true if the destination name promises a binary document.
fn expects_binary(dest: &Path) -> bool {
    BINARY_EXTENSIONS.iter().any(|ext| has_extension(dest, ext))
}

fn has_extension(dest: &Path, extension: &str) -> bool {
    dest.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.to_lowercase().ends_with(extension))
}

/// Returns true if the chunk opens like an HTML document.
fn looks_like_html(chunk: &[u8]) -> bool {
    let head = &chunk[..chunk.len().min(256)];
    let lowered = head.to_ascii_lowercase();
    lowered
        .windows(5)
        .any(|w| w == b"<html" || w == b"<!doc")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_expects_binary_by_extension() {
        assert!(expects_binary(Path::new("/tmp/paper.pdf")));
        assert!(expects_binary(Path::new("/tmp/Paper.PDF")));
        assert!(expects_binary(Path::new("/tmp/archive.zip")));
        assert!(expects_binary(Path::new("/tmp/download_523376.bin")));
        assert!(!expects_binary(Path::new("/tmp/data.csv")));
        assert!(!expects_binary(Path::new("/tmp/readme.txt")));
        assert!(!expects_binary(Path::new("/tmp/noext")));
    }

    #[test]
    fn test_looks_like_html_variants() {
        assert!(looks_like_html(b"<html><body>hi</body></html>"));
        assert!(looks_like_html(b"\n  <!DOCTYPE html><html>"));
        assert!(!looks_like_html(b"%PDF-1.7 stuff"));
        assert!(!looks_like_html(b""));
    }

    #[tokio::test]
    async fn test_download_writes_exact_destination() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        let body = vec![b'x'; 200];
        Mock::given(method("GET"))
            .and(path("/data.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/data.csv", server.uri());
        let dest = dir.path().join("renamed_data.csv");

        let bytes = client.download_to_path(&url, &dest).await.unwrap();
        assert_eq!(bytes, 200);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_download_404_is_error_and_leaves_no_file() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/missing.pdf", server.uri());
        let dest = dir.path().join("missing.pdf");

        let result = client.download_to_path(&url, &dest).await;
        assert!(matches!(result, Err(DownloadError::HttpStatus { status: 404, .. })));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_download_html_for_pdf_fails_and_cleans_up() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"<html><body>Not the file you wanted</body></html>".to_vec()),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/doc.pdf", server.uri());
        let dest = dir.path().join("doc.pdf");

        let result = client.download_to_path(&url, &dest).await;
        assert!(matches!(result, Err(DownloadError::InvalidPayload { .. })), "{result:?}");
        assert!(!dest.exists(), "partial file must be removed");
    }

    #[tokio::test]
    async fn test_download_pdf_without_magic_fails() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'z'; 500]))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/doc.pdf", server.uri());
        let dest = dir.path().join("doc.pdf");

        let result = client.download_to_path(&url, &dest).await;
        assert!(matches!(result, Err(DownloadError::InvalidPayload { .. })));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_download_tiny_binary_payload_fails() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        let mut body = b"%PDF".to_vec();
        body.extend_from_slice(b"tiny");
        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/doc.pdf", server.uri());
        let dest = dir.path().join("doc.pdf");

        let result = client.download_to_path(&url, &dest).await;
        assert!(matches!(result, Err(DownloadError::InvalidPayload { .. })));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_small_text_payload_is_accepted() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/notes.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"short note".to_vec()))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/notes.txt", server.uri());
        let dest = dir.path().join("notes.txt");

        let bytes = client.download_to_path(&url, &dest).await.unwrap();
        assert_eq!(bytes, 10);
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_text_returns_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hello</html>"))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let body = client
            .fetch_text(&format!("{}/page", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<html>hello</html>");
    }

    #[tokio::test]
    async fn test_fetch_text_non_success_status_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let result = client.fetch_text(&format!("{}/gone", server.uri())).await;
        assert!(matches!(result, Err(DownloadError::HttpStatus { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_any_io() {
        let dir = TempDir::new().unwrap();
        let client = HttpClient::new();

        let result = client
            .download_to_path("not-a-valid-url", &dir.path().join("x.bin"))
            .await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }
}
