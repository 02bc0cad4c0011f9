//! File fetcher: downloads a remote document into the scratch directory.
//!
//! One attempt per call, no retries. The body is streamed to disk so large PDFs
//! never sit in memory in full.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};
use url::Url;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const READ_TIMEOUT_SECS: u64 = 120;

/// Name used when the URL path has no usable last segment.
pub const FALLBACK_FILE_NAME: &str = "document.pdf";

/// Extension given to documents whose link and headers name none.
const DEFAULT_EXTENSION: &str = "pdf";

/// Content types the provider can index, mapped to the extension it expects.
const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("application/msword", "doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "pptx",
    ),
    ("text/plain", "txt"),
    ("text/markdown", "md"),
    ("text/html", "html"),
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("network error downloading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} downloading {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A transient local copy of a remote document.
///
/// The file is deleted by [`DownloadedFile::remove`], or on drop if it was never removed.
#[derive(Debug)]
pub struct DownloadedFile {
    local_path: PathBuf,
    file_name: String,
    removed: bool,
}

impl DownloadedFile {
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Name the document should carry when uploaded.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Deletes the local artifact. Errors are logged and ignored.
    pub async fn remove(mut self) {
        self.removed = true;
        if let Err(e) = tokio::fs::remove_file(&self.local_path).await {
            warn!("Failed to delete scratch file {}: {e}", self.local_path.display());
        } else {
            debug!("Deleted scratch file {}", self.local_path.display());
        }
    }
}

impl Drop for DownloadedFile {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_file(&self.local_path);
        }
    }
}

/// Downloads documents into a process-local scratch directory.
#[derive(Clone)]
pub struct FileFetcher {
    client: Client,
    scratch_dir: PathBuf,
}

impl FileFetcher {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Downloads `url` to `<scratch_dir>/<local_name>`, overwriting any existing file.
    ///
    /// `upload_name` is carried on the returned handle for the provider upload. When it
    /// has no extension, the response headers decide one (see [`resolve_upload_name`]).
    pub async fn fetch(
        &self,
        url: &str,
        local_name: &str,
        upload_name: &str,
    ) -> Result<DownloadedFile, FetchError> {
        let parsed = parse_document_url(url)?;

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|source| FetchError::Io {
                path: self.scratch_dir.clone(),
                source,
            })?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let upload_name = resolve_upload_name(upload_name, response.headers());
        let local_path = self.scratch_dir.join(local_name);
        let io_err = |source: std::io::Error| FetchError::Io {
            path: local_path.clone(),
            source,
        };

        let file = File::create(&local_path).await.map_err(io_err)?;
        // Owned from here on so every early return below cleans up the partial file.
        let downloaded = DownloadedFile {
            local_path: local_path.clone(),
            file_name: upload_name,
            removed: false,
        };

        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?;
            writer.write_all(&chunk).await.map_err(io_err)?;
            bytes_written += chunk.len() as u64;
        }
        writer.flush().await.map_err(io_err)?;

        info!(
            "Downloaded {} bytes from {url} to {}",
            bytes_written,
            local_path.display()
        );
        Ok(downloaded)
    }
}

/// Parses a document link. Only absolute http(s) URLs are accepted.
pub fn parse_document_url(raw: &str) -> Result<Url, FetchError> {
    let invalid = || FetchError::InvalidUrl {
        url: raw.to_string(),
    };
    let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(invalid()),
    }
}

/// Derives an upload file name from the last path segment of a URL.
pub fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last())
        .and_then(sanitize_file_name)
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Gives an extensionless upload name the extension the server reports.
///
/// Order: the `Content-Disposition` file name if it carries an extension, then the
/// extension mapped from `Content-Type`, then `.pdf`.
pub fn resolve_upload_name(upload_name: &str, headers: &HeaderMap) -> String {
    if extension(upload_name).is_some() {
        return upload_name.to_string();
    }

    if let Some(name) = disposition_file_name(headers) {
        if extension(&name).is_some() {
            return name;
        }
    }

    let ext = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().to_ascii_lowercase())
        .and_then(|mime| {
            CONTENT_TYPE_EXTENSIONS
                .iter()
                .find(|(known, _)| *known == mime)
                .map(|(_, ext)| *ext)
        })
        .unwrap_or(DEFAULT_EXTENSION);

    format!("{upload_name}.{ext}")
}

/// File name from `Content-Disposition`, preferring the RFC 5987 `filename*` form.
fn disposition_file_name(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    let mut plain = None;
    let mut extended = None;

    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            // filename*=UTF-8''grant%20nofo.pdf
            "filename*" => {
                extended = raw
                    .split_once("''")
                    .map(|(_, encoded)| encoded)
                    .and_then(sanitize_file_name);
            }
            "filename" => plain = sanitize_file_name(raw.trim().trim_matches('"')),
            _ => {}
        }
    }

    extended.or(plain)
}

/// Percent-decodes `raw` and keeps only characters safe in a file name.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let cleaned: String = urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    let trimmed = cleaned.trim_matches('.');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn extension(name: &str) -> Option<&str> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
}
