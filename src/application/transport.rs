// Transport port for Nightscout HTTP calls
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

/// A bearer-authenticated GET.
#[derive(Clone, PartialEq)]
pub struct ApiRequest {
    pub url: String,
    pub bearer: String,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn new(url: String, bearer: String, timeout: Duration) -> Self {
        Self { url, bearer, timeout }
    }
}

// Credentials stay out of logs
impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("url", &self.url)
            .field("bearer", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failures that happen before an HTTP status is available.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network is down")]
    Offline,
    #[error("server unreachable")]
    Unreachable,
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the request and return the raw status and body.
    async fn get(&self, request: &ApiRequest) -> Result<HttpReply, TransportError>;
}
