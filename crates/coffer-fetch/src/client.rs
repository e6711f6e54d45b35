//! HTTP byte source backed by reqwest.

use crate::{ByteSource, FetchResponse};
use async_trait::async_trait;
use coffer_types::JobError;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use std::time::Duration;

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout, covering the whole transfer.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            // Attachments can be large, so the transfer gets a generous budget.
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("coffer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// [`ByteSource`] over HTTP(S) with connection pooling.
///
/// The client performs no retries: failures are classified and reported, and
/// the caller decides whether to try again.
#[derive(Debug, Clone)]
pub struct HttpByteSource {
    client: Client,
    config: ClientConfig,
}

impl HttpByteSource {
    /// Creates a new source with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: ClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()?;
        Ok(Self { client, config })
    }

    /// Creates a source with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self, reqwest::Error> {
        Self::new(ClientConfig::default())
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }
}

/// Maps a reqwest failure onto the job error taxonomy.
fn classify(error: &reqwest::Error) -> JobError {
    if let Some(status) = error.status() {
        return JobError::http(status.as_u16(), error.to_string());
    }
    if error.is_builder() {
        // A malformed URL will not get better on retry.
        return JobError::Io(error.to_string());
    }
    JobError::Transport(error.to_string())
}

#[async_trait]
impl ByteSource for HttpByteSource {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, JobError> {
        tracing::debug!(url, "fetching");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let status = response.status();
        tracing::debug!(url, status = status.as_u16(), "response received");
        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map_err(|e| classify(&e))
            .boxed();

        Ok(FetchResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            content_length,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.user_agent.starts_with("coffer/"));
    }

    #[tokio::test]
    async fn test_client_creation() {
        let source = HttpByteSource::with_defaults();
        assert!(source.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_url_is_not_retryable() {
        let source = HttpByteSource::with_defaults().unwrap();
        let err = source.fetch("not a url").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_refused_connection_is_transient() {
        let source = HttpByteSource::with_defaults().unwrap();
        // Bind and drop a listener to find a port nothing is listening on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = source
            .fetch(&format!("http://127.0.0.1:{port}/"))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Transport(_)));
        assert!(err.is_retryable());
    }
}
