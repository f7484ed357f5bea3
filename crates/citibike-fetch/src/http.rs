//! Minimal HTTP abstraction so the cache manager can be exercised against
//! in-memory clients in tests.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};

/// Response body as a stream of chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, HttpError>> + Send>>;

/// An HTTP failure, classified by status for retry decisions.
#[derive(Debug, Clone)]
pub struct HttpError {
    /// HTTP status when the server answered; `None` for transport errors.
    pub status: Option<u16>,
    pub message: String,
}

impl HttpError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Transport errors and server-side (5xx) statuses are worth retrying;
    /// client errors such as a 404 are not.
    pub fn is_transient(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => status >= 500,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for HttpError {}

/// A successfully opened response: advertised length plus the body stream.
pub struct HttpResponse {
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

/// Asynchronous HTTP client seam.
///
/// The production implementation is [`ReqwestClient`]; tests substitute
/// in-memory clients that serve canned bodies or scripted failures.
pub trait HttpClient: Send + Sync {
    fn get(
        &self,
        url: &str,
    ) -> impl Future<Output = std::result::Result<HttpResponse, HttpError>> + Send;
}

/// Production client backed by `reqwest`.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> std::result::Result<HttpResponse, HttpError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HttpError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError {
                status: Some(status.as_u16()),
                message: format!("GET {url}"),
            });
        }

        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map_err(|e| HttpError::transport(e.to_string()))
            .boxed();
        Ok(HttpResponse {
            content_length,
            body,
        })
    }
}
