//! Object storage access for monitoring logs and submission files
//!
//! Fetchers turn a URI into bytes. The workflow report only depends on the
//! [`ObjectFetcher`] trait, so tests and other backends can plug in their own.

use crate::error::{CromwellError, Result};
use crate::observability::ToolMetrics;
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Default public endpoint for Google Cloud Storage downloads
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

/// Fetch the full content behind a URI
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

/// A `gs://bucket/object` location split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsPath {
    pub bucket: String,
    pub object: String,
}

impl GsPath {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri.strip_prefix("gs://").ok_or_else(|| CromwellError::Storage {
            uri: uri.to_string(),
            reason: "not a gs:// URI".to_string(),
        })?;

        let (bucket, object) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(CromwellError::Storage {
                uri: uri.to_string(),
                reason: "missing bucket name".to_string(),
            });
        }

        Ok(Self {
            bucket: bucket.to_string(),
            object: object.to_string(),
        })
    }
}

/// Fetcher for `gs://`, `http(s)://`, `file://` and plain local paths
pub struct StorageFetcher {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    metrics: ToolMetrics,
}

impl StorageFetcher {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
            token: None,
            metrics: ToolMetrics::new(),
        })
    }

    /// Authenticate storage downloads with an OAuth bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// HTTPS download URL for a bucket object, each path segment encoded
    pub fn object_url(&self, path: &GsPath) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| CromwellError::Storage {
                uri: self.endpoint.to_string(),
                reason: "storage endpoint cannot be a base URL".to_string(),
            })?
            .pop_if_empty()
            .push(&path.bucket)
            .extend(path.object.split('/'));
        Ok(url)
    }

    async fn fetch_http(&self, uri: &str, url: Url, authenticated: bool) -> Result<Vec<u8>> {
        let mut request = self.client.get(url);
        if authenticated {
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(CromwellError::Storage {
                uri: uri.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn fetch_local(&self, uri: &str, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| CromwellError::Storage {
                uri: uri.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ObjectFetcher for StorageFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        let started = Instant::now();

        let bytes = if uri.starts_with("gs://") {
            let path = GsPath::parse(uri)?;
            let url = self.object_url(&path)?;
            self.fetch_http(uri, url, true).await?
        } else if uri.starts_with("http://") || uri.starts_with("https://") {
            self.fetch_http(uri, Url::parse(uri)?, false).await?
        } else if let Some(path) = uri.strip_prefix("file://") {
            self.fetch_local(uri, Path::new(path)).await?
        } else {
            self.fetch_local(uri, Path::new(uri)).await?
        };

        self.metrics
            .observe_fetch_latency(started.elapsed().as_secs_f64());
        debug!(uri = %uri, bytes = bytes.len(), "Fetched object");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_split_gs_path() {
        let path = GsPath::parse("gs://bucket/scaling/align/monitoring.log").unwrap();
        assert_eq!(path.bucket, "bucket");
        assert_eq!(path.object, "scaling/align/monitoring.log");
    }

    #[test]
    fn test_reject_non_gs_path() {
        assert!(GsPath::parse("s3://bucket/key").is_err());
        assert!(GsPath::parse("gs:///key").is_err());
    }

    #[test]
    fn test_object_url_encodes_segments() {
        let fetcher = StorageFetcher::new("https://storage.example.com/").unwrap();
        let path = GsPath::parse("gs://bucket/dir/call 1/monitoring.log").unwrap();
        let url = fetcher.object_url(&path).unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.example.com/bucket/dir/call%201/monitoring.log"
        );
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Total Memory (MB): 1700\n").unwrap();

        let fetcher = StorageFetcher::new(DEFAULT_STORAGE_ENDPOINT).unwrap();
        let path = file.path().to_string_lossy().to_string();
        assert_eq!(fetcher.fetch(&path).await.unwrap(), b"Total Memory (MB): 1700\n");

        let uri = format!("file://{}", path);
        assert_eq!(fetcher.fetch(&uri).await.unwrap().len(), 24);
    }

    #[tokio::test]
    async fn test_fetch_missing_file_is_storage_error() {
        let fetcher = StorageFetcher::new(DEFAULT_STORAGE_ENDPOINT).unwrap();
        let err = fetcher.fetch("/definitely/not/here.log").await.unwrap_err();
        assert!(matches!(err, CromwellError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_fetch_gs_object_over_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bucket/align/monitoring.log")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body("* Memory usage (MB): 12\n")
            .create_async()
            .await;

        let fetcher = StorageFetcher::new(&server.url()).unwrap().with_token("secret");
        let bytes = fetcher.fetch("gs://bucket/align/monitoring.log").await.unwrap();

        assert_eq!(bytes, b"* Memory usage (MB): 12\n");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_http_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/bucket/missing.log")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = StorageFetcher::new(&server.url()).unwrap();
        let err = fetcher.fetch("gs://bucket/missing.log").await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
