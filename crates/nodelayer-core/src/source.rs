use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::error::LayerError;

pub const DEFAULT_DIST_URL: &str = "https://nodejs.org/dist";

const INDEX_FILE: &str = "index.json";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One row of the remote `index.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexEntry {
    pub version: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub lts: LtsMarker,
    #[serde(default)]
    pub files: Vec<String>,
}

/// The index stores `false` for non-LTS releases and the codename otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LtsMarker {
    Flag(bool),
    Codename(String),
}

impl Default for LtsMarker {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl LtsMarker {
    #[must_use]
    pub fn codename(&self) -> Option<&str> {
        match self {
            Self::Codename(name) if !name.trim().is_empty() => Some(name),
            _ => None,
        }
    }
}

/// Read-only access to the Node.js distribution server.
///
/// Paths are relative to the distribution root, e.g.
/// `v22.12.0/SHASUMS256.txt`.
#[async_trait]
pub trait DistSource: Send + Sync {
    async fn fetch_index(&self) -> Result<Vec<IndexEntry>, LayerError>;

    async fn fetch_text(&self, path: &str) -> Result<String, LayerError>;

    /// Stream `path` into `dest`, returning the number of bytes written.
    async fn download(&self, path: &str, dest: &Path) -> Result<u64, LayerError>;
}

#[derive(Debug, Clone)]
pub struct HttpDistSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDistSource {
    /// Build a source with its own HTTP client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LayerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(format!("nodelayer/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| LayerError::network_request_from("build http client", error))?;

        Ok(Self::with_client(client, base_url))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn get(
        &self,
        operation: &'static str,
        url: &str,
    ) -> Result<reqwest::Response, LayerError> {
        debug!("GET {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| LayerError::network_request_from(operation, error))?;

        if !response.status().is_success() {
            return Err(LayerError::HttpStatus {
                operation,
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl DistSource for HttpDistSource {
    async fn fetch_index(&self) -> Result<Vec<IndexEntry>, LayerError> {
        let url = self.url(INDEX_FILE);
        self.get("fetch version index", &url)
            .await?
            .json()
            .await
            .map_err(|error| LayerError::network_parse_from("fetch version index", error))
    }

    async fn fetch_text(&self, path: &str) -> Result<String, LayerError> {
        let url = self.url(path);
        self.get("fetch checksums", &url)
            .await?
            .text()
            .await
            .map_err(|error| LayerError::network_parse_from("fetch checksums", error))
    }

    async fn download(&self, path: &str, dest: &Path) -> Result<u64, LayerError> {
        use futures_util::StreamExt;

        let url = self.url(path);
        let response = self.get("download distribution", &url).await?;

        let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
            LayerError::io_with_path("failed to create download file", dest, &error)
        })?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|error| LayerError::network_request_from("download distribution", error))?;
            file.write_all(&chunk).await.map_err(|error| {
                LayerError::io_with_path("failed to write download data", dest, &error)
            })?;
            downloaded += chunk.len() as u64;
        }

        file.flush().await.map_err(|error| {
            LayerError::io_with_path("failed to flush download file", dest, &error)
        })?;

        info!("Downloaded {url}: {downloaded} bytes");
        Ok(downloaded)
    }
}
