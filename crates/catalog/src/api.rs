//! REST client for the catalog status endpoint.
//!
//! Wraps `GET {catalog_url}` using [`reqwest`]. Any failure here is the
//! "catalog unavailable" condition that aborts a run.

use std::time::Duration;

use async_trait::async_trait;

use crate::models::CatalogSnapshot;

/// Per-request timeout for the status endpoint.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the catalog REST layer.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The catalog returned a non-2xx status code.
    #[error("Catalog API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The body was not a valid deployment snapshot.
    #[error("Invalid catalog response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Source of the current deployment snapshot.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn fetch_status(&self) -> Result<CatalogSnapshot, CatalogError>;
}

/// HTTP client for the catalog service.
pub struct CatalogApi {
    client: reqwest::Client,
    status_url: String,
}

impl CatalogApi {
    /// * `status_url` - Full status endpoint, e.g. `https://api.ndif.us/status`.
    pub fn new(status_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            status_url,
        }
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, status_url: String) -> Self {
        Self { client, status_url }
    }

    /// Ensure the response has a success status code, or capture status and
    /// body as [`CatalogError::ApiError`].
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, CatalogError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CatalogError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelCatalog for CatalogApi {
    async fn fetch_status(&self) -> Result<CatalogSnapshot, CatalogError> {
        tracing::debug!(url = %self.status_url, "Fetching catalog status");

        let response = self
            .client
            .get(&self.status_url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        // Decode separately so a malformed body is reported as such.
        let bytes = response.bytes().await?;
        let snapshot: CatalogSnapshot = serde_json::from_slice(&bytes)?;

        tracing::debug!(deployments = snapshot.deployments.len(), "Catalog status fetched");
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned HTTP response and return the URL to hit.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{addr}/status")
    }

    #[tokio::test]
    async fn fetches_and_decodes_snapshot() {
        let url = serve_once(
            "200 OK",
            r#"{"deployments":{"openai-community/gpt2":{"deployment_level":"HOT","application_state":"RUNNING"}}}"#,
        )
        .await;

        let snapshot = CatalogApi::new(url).fetch_status().await.expect("fetch");
        assert_eq!(snapshot.deployments.len(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let url = serve_once("503 Service Unavailable", "down for maintenance").await;
        let err = CatalogApi::new(url).fetch_status().await.unwrap_err();
        assert_matches!(err, CatalogError::ApiError { status: 503, ref body } if body == "down for maintenance");
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let url = serve_once("200 OK", "<html>oops</html>").await;
        let err = CatalogApi::new(url).fetch_status().await.unwrap_err();
        assert_matches!(err, CatalogError::Decode(_));
    }

    #[tokio::test]
    async fn unreachable_host_is_request_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let err = CatalogApi::new(format!("http://{addr}/status"))
            .fetch_status()
            .await
            .unwrap_err();
        assert_matches!(err, CatalogError::Request(_));
    }
}
