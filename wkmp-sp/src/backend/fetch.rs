//! Byte fetcher for graph-backend sources
//!
//! `http://` and `https://` sources go through reqwest; anything else is read
//! from the local filesystem (`file://` prefix optional). Inline `data:`
//! sources never reach the fetcher.

use super::{BackendFuture, FetchRequest, Fetcher};
use crate::error::BackendError;
use futures::FutureExt;
use reqwest::Method;
use tracing::debug;

/// Fetcher backed by reqwest and tokio fs
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with a default client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fetcher sharing an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: FetchRequest) -> BackendFuture<Vec<u8>> {
        let client = self.client.clone();
        async move {
            if is_remote(&request.url) {
                fetch_remote(&client, request).await
            } else {
                fetch_local(&request.url).await
            }
        }
        .boxed()
    }
}

fn is_remote(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

async fn fetch_remote(
    client: &reqwest::Client,
    request: FetchRequest,
) -> Result<Vec<u8>, BackendError> {
    let method = Method::from_bytes(request.options.method.as_bytes()).map_err(|e| {
        BackendError::Fetch {
            status: None,
            reason: format!("invalid method {}: {}", request.options.method, e),
        }
    })?;

    if request.options.with_credentials {
        // reqwest has no per-request credentials mode; cookies follow the client config
        debug!("with_credentials requested for {}", request.url);
    }

    let mut builder = client.request(method, &request.url);
    for (name, value) in &request.options.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.send().await.map_err(|e| BackendError::Fetch {
        status: None,
        reason: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::Fetch {
            status: Some(status.as_u16()),
            reason: status.canonical_reason().unwrap_or("error").to_string(),
        });
    }

    let bytes = response.bytes().await.map_err(|e| BackendError::Fetch {
        status: None,
        reason: e.to_string(),
    })?;
    Ok(bytes.to_vec())
}

async fn fetch_local(url: &str) -> Result<Vec<u8>, BackendError> {
    let path = url.strip_prefix("file://").unwrap_or(url);
    tokio::fs::read(path).await.map_err(|e| BackendError::Fetch {
        status: (e.kind() == std::io::ErrorKind::NotFound).then_some(404),
        reason: format!("{}: {}", path, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FetchOptions;
    use std::io::Write;

    #[test]
    fn test_remote_detection() {
        assert!(is_remote("https://cdn.example.com/a.mp3"));
        assert!(is_remote("HTTP://cdn.example.com/a.mp3"));
        assert!(!is_remote("/srv/sounds/a.mp3"));
        assert!(!is_remote("file:///srv/sounds/a.mp3"));
    }

    #[tokio::test]
    async fn test_local_file_fetch() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RIFF1234").unwrap();

        let fetcher = HttpFetcher::new();
        let bytes = fetcher
            .fetch(FetchRequest {
                url: format!("file://{}", file.path().display()),
                options: FetchOptions::default(),
            })
            .await
            .unwrap();
        assert_eq!(bytes, b"RIFF1234");
    }

    #[tokio::test]
    async fn test_missing_local_file_reports_404() {
        let fetcher = HttpFetcher::new();
        let err = fetcher
            .fetch(FetchRequest {
                url: "/definitely/not/here.wav".to_string(),
                options: FetchOptions::default(),
            })
            .await
            .unwrap_err();
        match err {
            BackendError::Fetch { status, .. } => assert_eq!(status, Some(404)),
            other => panic!("Expected Fetch error, got {:?}", other),
        }
    }
}
