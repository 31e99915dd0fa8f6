use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Bytes fetched from an external location, with the MIME type the remote
/// end reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedContent {
    pub bytes: Bytes,
    pub mime_type: Option<String>,
}

/// Reads content referenced by URL.
pub trait ContentFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> StoreResult<FetchedContent>;
}

// ---------------------------------------------------------------------------
// HttpContentFetcher
// ---------------------------------------------------------------------------

/// Blocking HTTP fetcher with a connect timeout.
pub struct HttpContentFetcher {
    client: reqwest::blocking::Client,
}

impl HttpContentFetcher {
    pub fn new(connect_timeout: Duration) -> StoreResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| StoreError::Fetch {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl ContentFetcher for HttpContentFetcher {
    fn fetch(&self, url: &str) -> StoreResult<FetchedContent> {
        let fetch_err = |message: String| StoreError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| fetch_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP status {status}")));
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().map_err(|e| fetch_err(e.to_string()))?;
        debug!(url, len = bytes.len(), "fetched external content");
        Ok(FetchedContent { bytes, mime_type })
    }
}

// ---------------------------------------------------------------------------
// InMemoryContentFetcher
// ---------------------------------------------------------------------------

/// Fetcher serving canned responses; records every URL requested.
#[derive(Default)]
pub struct InMemoryContentFetcher {
    responses: RwLock<HashMap<String, FetchedContent>>,
    requests: RwLock<Vec<String>>,
}

impl InMemoryContentFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` with `mime_type` for `url`.
    pub fn insert(&self, url: impl Into<String>, mime_type: &str, bytes: impl Into<Bytes>) {
        self.responses.write().expect("lock poisoned").insert(
            url.into(),
            FetchedContent {
                bytes: bytes.into(),
                mime_type: Some(mime_type.to_string()),
            },
        );
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.read().expect("lock poisoned").clone()
    }
}

impl ContentFetcher for InMemoryContentFetcher {
    fn fetch(&self, url: &str) -> StoreResult<FetchedContent> {
        self.requests
            .write()
            .expect("lock poisoned")
            .push(url.to_string());
        self.responses
            .read()
            .expect("lock poisoned")
            .get(url)
            .cloned()
            .ok_or_else(|| StoreError::Fetch {
                url: url.to_string(),
                message: "no such resource".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_fetcher_serves_and_records() {
        let fetcher = InMemoryContentFetcher::new();
        fetcher.insert("http://example.org/a", "text/plain", "abc");

        let got = fetcher.fetch("http://example.org/a").unwrap();
        assert_eq!(&got.bytes[..], b"abc");
        assert_eq!(got.mime_type.as_deref(), Some("text/plain"));

        assert!(fetcher.fetch("http://example.org/missing").is_err());
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[test]
    fn http_fetcher_builds() {
        assert!(HttpContentFetcher::new(Duration::from_secs(5)).is_ok());
    }
}
