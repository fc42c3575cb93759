//! Remote dataset endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{CACHE_CONTROL, ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use shelflife_core::TransportError;
use tracing::debug;

/// Response body delivered piece by piece.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// A successful `GET` of the dataset, body not yet consumed.
pub struct DatasetResponse {
    pub etag: Option<String>,
    /// Length declared by the server, if any.
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for DatasetResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetResponse")
            .field("etag", &self.etag)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Outcome of a metadata-only probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResponse {
    /// 304: the resource still matches the token sent.
    NotModified,
    /// 2xx, with whatever ETag the server returned.
    Modified { etag: Option<String> },
    /// Any other status.
    Status(u16),
}

/// Source of the product dataset.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Conditional metadata request carrying the previous ETag, if any.
    async fn probe(&self, etag: Option<&str>) -> Result<ProbeResponse, TransportError>;

    /// Start a full fetch. Non-2xx statuses are errors.
    async fn fetch(&self) -> Result<DatasetResponse, TransportError>;
}

/// [`DatasetSource`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDatasetSource {
    client: reqwest::Client,
    url: String,
}

impl HttpDatasetSource {
    /// Build a client for `url`. Without a timeout the HTTP stack's own
    /// behaviour applies.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| TransportError::Unreachable {
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn unreachable(err: reqwest::Error) -> TransportError {
    TransportError::Unreachable {
        reason: err.to_string(),
    }
}

fn header_etag(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl DatasetSource for HttpDatasetSource {
    async fn probe(&self, etag: Option<&str>) -> Result<ProbeResponse, TransportError> {
        let mut request = self.client.head(&self.url).header(CACHE_CONTROL, "no-cache");
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request.send().await.map_err(unreachable)?;
        let status = response.status();
        debug!(status = status.as_u16(), "dataset probe answered");

        Ok(if status == StatusCode::NOT_MODIFIED {
            ProbeResponse::NotModified
        } else if status.is_success() {
            ProbeResponse::Modified {
                etag: header_etag(response.headers()),
            }
        } else {
            ProbeResponse::Status(status.as_u16())
        })
    }

    async fn fetch(&self) -> Result<DatasetResponse, TransportError> {
        let response = self.client.get(&self.url).send().await.map_err(unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let etag = header_etag(response.headers());
        let content_length = response.content_length();
        debug!(?etag, ?content_length, "dataset fetch started");

        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map(|bytes| bytes.to_vec()).map_err(|e| TransportError::Body {
                    received: 0,
                    reason: e.to_string(),
                })
            })
            .boxed();

        Ok(DatasetResponse {
            etag,
            content_length,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn test_header_etag() {
        let mut headers = HeaderMap::new();
        assert_eq!(header_etag(&headers), None);
        headers.insert(ETAG, HeaderValue::from_static("\"abc\""));
        assert_eq!(header_etag(&headers).as_deref(), Some("\"abc\""));
    }

    #[test]
    fn test_new_without_timeout() {
        let source = HttpDatasetSource::new("https://example.test/data.json", None)
            .expect("client should build");
        assert_eq!(source.url(), "https://example.test/data.json");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let source = HttpDatasetSource::new(
            "http://127.0.0.1:9/data.json",
            Some(Duration::from_millis(500)),
        )
        .expect("client should build");
        let err = source.probe(None).await.expect_err("nothing listens on port 9");
        assert!(matches!(err, TransportError::Unreachable { .. }));
    }
}
