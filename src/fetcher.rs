//! Remote content fetching
//!
//! [`ContentFetcher`] answers two questions about a pull location: does
//! anything live there, and what are its bytes. [`HttpFetcher`] implements it
//! over HTTP(S) with bounded requests and retry on transient failures.

use crate::config::FetchConfig;
use crate::error::{Error, FetchError, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, RANGE};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

/// A remote file downloaded to a temporary location
///
/// The temporary file is deleted when this value is dropped.
#[derive(Debug)]
pub struct DownloadedFile {
    /// Temporary file holding the downloaded bytes
    pub file: NamedTempFile,
    /// File name reported by the server or taken from the URL
    pub filename: String,
}

impl DownloadedFile {
    /// Location of the temporary file
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Retrieves remote resources to local temporary files
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Whether anything exists at `url`
    async fn remote_file_exists(&self, url: &str) -> Result<bool>;

    /// Download `url` to a temporary file
    async fn download(&self, url: &str) -> Result<DownloadedFile>;
}

/// HTTP(S) implementation of [`ContentFetcher`]
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
    temp_dir: PathBuf,
}

impl HttpFetcher {
    /// Create a fetcher that downloads into `temp_dir`
    pub fn new(config: FetchConfig, temp_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to create HTTP client: {}", e),
                key: Some("fetch".to_string()),
            })?;

        Ok(Self {
            client,
            config,
            temp_dir: temp_dir.into(),
        })
    }

    fn parse_url(url: &str) -> Result<url::Url> {
        url::Url::parse(url).map_err(|e| {
            Error::Fetch(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })
        })
    }

    async fn probe(&self, url: &url::Url) -> Result<bool> {
        let response = self.client.head(url.clone()).send().await?;
        let status = response.status();

        if status == StatusCode::METHOD_NOT_ALLOWED {
            // Some mirrors refuse HEAD; ask for a single byte instead
            let response = self
                .client
                .get(url.clone())
                .header(RANGE, "bytes=0-0")
                .send()
                .await?;
            return Self::classify(url, response.status());
        }

        Self::classify(url, status)
    }

    fn classify(url: &url::Url, status: StatusCode) -> Result<bool> {
        if status.is_success() || status.is_redirection() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            Ok(false)
        } else {
            Err(Error::Fetch(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }))
        }
    }

    async fn fetch_once(&self, url: &url::Url) -> Result<DownloadedFile> {
        let mut response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(Error::Fetch(FetchError::RemoteMissing {
                url: url.to_string(),
            }));
        }
        if !status.is_success() {
            return Err(Error::Fetch(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        let filename = filename_from_response(&response, url);

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let temp = tempfile::Builder::new()
            .prefix("pull-")
            .tempfile_in(&self.temp_dir)?;
        let mut out = tokio::fs::File::from_std(temp.reopen()?);

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;

        tracing::debug!(url = %url, filename = %filename, bytes = written, "download complete");

        Ok(DownloadedFile {
            file: temp,
            filename,
        })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn remote_file_exists(&self, url: &str) -> Result<bool> {
        let parsed = Self::parse_url(url)?;
        with_retry(&self.config.retry, || self.probe(&parsed)).await
    }

    async fn download(&self, url: &str) -> Result<DownloadedFile> {
        let parsed = Self::parse_url(url)?;
        with_retry(&self.config.retry, || self.fetch_once(&parsed)).await
    }
}

/// Pick a file name from `Content-Disposition`, falling back to the URL path
///
/// Unlike a display name, the extension is kept: the parser uses it to guess
/// the format.
fn filename_from_response(response: &reqwest::Response, url: &url::Url) -> String {
    if let Some(value) = response.headers().get(CONTENT_DISPOSITION)
        && let Ok(value) = value.to_str()
        && let Some(name) = filename_from_disposition(value)
    {
        return name;
    }

    if let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        return urlencoding::decode(last)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| last.to_string());
    }

    "download".to_string()
}

fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for part in value.split(';').map(str::trim) {
        if let Some(encoded) = part.strip_prefix("filename*=") {
            // charset'lang'percent-encoded
            let encoded = encoded.rsplit('\'').next().unwrap_or(encoded);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                return Some(decoded.into_owned());
            }
        } else if let Some(name) = part.strip_prefix("filename=") {
            let name = name.trim_matches('"');
            if !name.is_empty() {
                plain = Some(name.to_string());
            }
        }
    }
    plain
}
