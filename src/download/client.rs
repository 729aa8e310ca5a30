//! HTTP client wrapper for probing and fetching candidate files.
//!
//! [`HttpClient`] issues the two requests the download step needs: an
//! optional `HEAD` probe whose headers feed the gate's early check, and the
//! authoritative `GET` whose body is read into memory with a hard byte cap.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, Method, Response};
use tracing::{debug, instrument};
use url::Url;

use super::constants::MAX_PREALLOCATED_BODY;
use super::error::DownloadError;
use super::gate::{Rejection, ResponseMeta};
use crate::config::PipelineConfig;
use crate::user_agent;

/// HTTP client shared by every download worker.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client with the timeouts and TLS policy of `config`.
    ///
    /// # Errors
    ///
    /// Returns the underlying `reqwest::Error` if the TLS backend or the
    /// system proxy configuration cannot be initialised.
    pub fn new(config: &PipelineConfig) -> Result<Self, reqwest::Error> {
        let client = build_client(
            config.connect_timeout,
            config.fetch_timeout,
            config.accept_invalid_certs,
        )?;
        Ok(Self { client })
    }

    /// Sends a `HEAD` request and returns the declared metadata.
    ///
    /// # Errors
    ///
    /// Any failure, including a non-success status, is returned as a
    /// [`DownloadError`]. Callers treat it as "probe unavailable".
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn probe(&self, url: &str) -> Result<ResponseMeta, DownloadError> {
        let response = self.send_request(Method::HEAD, url).await?;
        let meta = ResponseMeta::from_headers(response.headers());
        debug!(
            content_length = ?meta.content_length,
            content_type = ?meta.content_type,
            "probe answered"
        );
        Ok(meta)
    }

    /// Sends the `GET` request and returns the response once headers arrive.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`], [`DownloadError::Network`],
    /// [`DownloadError::Timeout`] or [`DownloadError::HttpStatus`].
    pub async fn get(&self, url: &str) -> Result<Response, DownloadError> {
        self.send_request(Method::GET, url).await
    }

    async fn send_request(&self, method: Method, url: &str) -> Result<Response, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        let response = self
            .client
            .request(method, parsed)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

/// Reads a response body into memory, aborting once `max_size` bytes arrive.
///
/// A body that reaches the limit is a [`Rejection::TooLarge`] no matter what
/// `Content-Length` claimed; nothing read so far is kept.
///
/// # Errors
///
/// Returns [`DownloadError::Rejected`] when the cap is hit and
/// [`DownloadError::Network`] / [`DownloadError::Timeout`] if the stream fails.
pub async fn read_capped_body(
    response: Response,
    url: &str,
    max_size: u64,
) -> Result<Vec<u8>, DownloadError> {
    let reserve = response
        .content_length()
        .and_then(|len| usize::try_from(len).ok())
        .map_or(0, |len| len.min(MAX_PREALLOCATED_BODY));
    let mut body = Vec::with_capacity(reserve);
    let mut stream = response.bytes_stream();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;
        let received = (body.len() + chunk.len()) as u64;
        if received >= max_size {
            debug!(received, max_size, "body reached size limit, aborting");
            return Err(DownloadError::rejected(
                url,
                Rejection::TooLarge {
                    size: received,
                    max: max_size,
                },
            ));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

fn build_client(
    connect_timeout: Option<Duration>,
    fetch_timeout: Option<Duration>,
    accept_invalid_certs: bool,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .gzip(true)
        .user_agent(user_agent::default_user_agent());
    if let Some(timeout) = connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(timeout) = fetch_timeout {
        builder = builder.timeout(timeout);
    }
    if accept_invalid_certs {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder.build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn client_with_timeout(timeout: Option<Duration>) -> HttpClient {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig::new(temp.path().join("blobs"), temp.path().join("index.csv"))
            .with_fetch_timeout(timeout);
        HttpClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_probe_returns_declared_metadata() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("HEAD"))
            .and(path("/tool.exe"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/octet-stream")
                    .insert_header("Content-Length", "1234"),
            )
            .mount(&mock_server)
            .await;

        let client = client_with_timeout(None);
        let meta = client
            .probe(&format!("{}/tool.exe", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(meta.media_type().as_deref(), Some("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_probe_non_success_is_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&mock_server)
            .await;

        let client = client_with_timeout(None);
        let result = client
            .probe(&format!("{}/tool.exe", mock_server.uri()))
            .await;

        assert!(matches!(
            result,
            Err(DownloadError::HttpStatus { status: 405, .. })
        ));
    }

    #[tokio::test]
    async fn test_get_404_is_http_status_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/missing.exe"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = client_with_timeout(None);
        let result = client
            .get(&format!("{}/missing.exe", mock_server.uri()))
            .await;

        match result {
            Err(DownloadError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_invalid_url() {
        let client = client_with_timeout(None);
        let result = client.get("not-a-valid-url").await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_get_rejects_non_http_scheme() {
        let client = client_with_timeout(None);
        let result = client.get("ftp://example.com/tool.exe").await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_read_capped_body_returns_bytes_under_limit() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/small.exe"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7_u8; 999]))
            .mount(&mock_server)
            .await;

        let client = client_with_timeout(None);
        let url = format!("{}/small.exe", mock_server.uri());
        let response = client.get(&url).await.unwrap();
        let body = read_capped_body(response, &url, 1000).await.unwrap();

        assert_eq!(body.len(), 999);
    }

    #[tokio::test]
    async fn test_read_capped_body_aborts_at_limit() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/big.exe"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0_u8; 4096]))
            .mount(&mock_server)
            .await;

        let client = client_with_timeout(None);
        let url = format!("{}/big.exe", mock_server.uri());
        let response = client.get(&url).await.unwrap();
        let result = read_capped_body(response, &url, 1000).await;

        match result {
            Err(DownloadError::Rejected {
                rejection: Rejection::TooLarge { size, max },
                ..
            }) => {
                assert!(size >= 1000);
                assert_eq!(max, 1000);
            }
            other => panic!("Expected TooLarge rejection, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_timeout_maps_to_timeout_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/slow.exe"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"data")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let client = client_with_timeout(Some(Duration::from_secs(1)));
        let result = client.get(&format!("{}/slow.exe", mock_server.uri())).await;

        assert!(
            matches!(result, Err(DownloadError::Timeout { .. })),
            "expected timeout, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn test_requests_carry_tool_user_agent() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/ua.exe"))
            .and(wiremock::matchers::header(
                "User-Agent",
                user_agent::default_user_agent().as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_with_timeout(None);
        let result = client.get(&format!("{}/ua.exe", mock_server.uri())).await;
        assert!(result.is_ok(), "UA header must match: {result:?}");
    }
}
