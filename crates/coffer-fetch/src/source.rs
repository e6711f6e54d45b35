//! Where downloaded bytes come from.

use async_trait::async_trait;
use bytes::Bytes;
use coffer_types::JobError;
use futures::stream::BoxStream;
use std::fmt;

/// Body of a fetched resource.
pub type ByteStream = BoxStream<'static, Result<Bytes, JobError>>;

/// Response to a [`ByteSource::fetch`].
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Status reason phrase, used as the error message for failures.
    pub reason: String,
    /// Length of the body as announced by the remote, if any.
    pub content_length: Option<u64>,
    /// The body.
    pub body: ByteStream,
}

impl FetchResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Converts a non-success response into its error.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Http`] carrying the status if it is not 2xx.
    pub fn error_for_status(self) -> Result<Self, JobError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(JobError::http(self.status, self.reason))
        }
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Fetches remote resources.
#[async_trait]
pub trait ByteSource: fmt::Debug + Send + Sync {
    /// Starts fetching `url`.
    ///
    /// A response with a non-success status is returned as-is; only failures
    /// to obtain a response at all are errors.
    async fn fetch(&self, url: &str) -> Result<FetchResponse, JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn response(status: u16) -> FetchResponse {
        FetchResponse {
            status,
            reason: "Not Found".to_string(),
            content_length: None,
            body: futures::stream::empty().boxed(),
        }
    }

    #[test]
    fn test_error_for_status() {
        assert!(response(200).error_for_status().is_ok());
        assert!(response(204).error_for_status().is_ok());

        let err = response(404).error_for_status().unwrap_err();
        assert_eq!(err, JobError::http(404, "Not Found"));
        assert!(!err.is_retryable());
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Serves a fixed response, counting how often it is fetched.
    #[derive(Debug)]
    pub(crate) struct StaticSource {
        status: u16,
        chunks: Vec<Bytes>,
        chunk_delay: Duration,
        gate: Option<Arc<Notify>>,
        fetches: AtomicUsize,
    }

    impl StaticSource {
        pub(crate) fn ok(content: &[u8], chunk_size: usize) -> Self {
            Self {
                status: 200,
                chunks: content
                    .chunks(chunk_size.max(1))
                    .map(Bytes::copy_from_slice)
                    .collect(),
                chunk_delay: Duration::ZERO,
                gate: None,
                fetches: AtomicUsize::new(0),
            }
        }

        pub(crate) fn status(status: u16) -> Self {
            Self {
                status,
                ..Self::ok(b"", 1)
            }
        }

        /// Sleeps before yielding each chunk.
        pub(crate) fn with_chunk_delay(mut self, delay: Duration) -> Self {
            self.chunk_delay = delay;
            self
        }

        /// Holds every response until `gate` is notified.
        pub(crate) fn with_gate(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        pub(crate) fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ByteSource for StaticSource {
        async fn fetch(&self, _url: &str) -> Result<FetchResponse, JobError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let delay = self.chunk_delay;
            let length = self.chunks.iter().map(|chunk| chunk.len() as u64).sum();
            let body = futures::stream::iter(self.chunks.clone())
                .then(move |chunk| async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok::<_, JobError>(chunk)
                })
                .boxed();
            Ok(FetchResponse {
                status: self.status,
                reason: if self.status == 200 { "OK" } else { "Error" }.to_string(),
                content_length: Some(length),
                body,
            })
        }
    }
}
