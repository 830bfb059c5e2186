// Error kinds surfaced by the fetch pipeline
use std::time::Duration;

use super::transport::TransportError;

/// Fetch failures. The `Display` text is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("You are currently offline. Please check your network connection.")]
    Offline,

    #[error("The server is not responding. Check your nightscout site address.")]
    ServerUnreachable,

    #[error("Access denied by the server (status 403): {detail}")]
    Unauthorized { detail: String },

    #[error("The requested resource was not found on the server (status 404): {url}")]
    NotFound { url: String },

    #[error("The request could not be completed because the server returned an error (status {status}): {detail}")]
    ClientError { status: u16, detail: String },

    #[error("The server encountered an error and could not complete the request (status {status}).")]
    ServerError { status: u16 },

    #[error("Request timeout reached: {timeout_ms} ms.")]
    Timeout { timeout_ms: u64 },

    #[error("The server response could not be understood: {0}")]
    MalformedResponse(String),

    #[error("No glucose readings were returned by the server.")]
    NoData,

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Authorization failed: {0}")]
    Auth(#[source] Box<FetchError>),

    #[error("An unknown error occurred: {0}")]
    Unknown(String),
}

impl FetchError {
    /// Classify a non-OK HTTP status.
    pub fn from_status(status: u16, url: &str, detail: String) -> Self {
        match status {
            0 => FetchError::ServerUnreachable,
            403 => FetchError::Unauthorized { detail },
            404 => FetchError::NotFound {
                url: url.to_string(),
            },
            400..=499 => FetchError::ClientError { status, detail },
            500..=599 => FetchError::ServerError { status },
            _ => FetchError::Unknown(format!("unexpected status {}: {}", status, detail)),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Unauthorized { .. })
    }

    pub fn auth(cause: FetchError) -> Self {
        match cause {
            // Nothing to wrap, the request never left
            FetchError::ConfigInvalid(_) => cause,
            other => FetchError::Auth(Box::new(other)),
        }
    }

    pub fn from_transport(error: TransportError, timeout: Duration) -> Self {
        match error {
            TransportError::Offline => FetchError::Offline,
            TransportError::Unreachable => FetchError::ServerUnreachable,
            TransportError::Timeout => FetchError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            },
            TransportError::Other(message) => FetchError::Unknown(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        let url = "https://ns.example.com/api/v3/entries";
        assert_eq!(FetchError::from_status(0, url, String::new()), FetchError::ServerUnreachable);
        assert!(FetchError::from_status(403, url, "denied".into()).is_unauthorized());
        assert!(matches!(FetchError::from_status(404, url, String::new()), FetchError::NotFound { .. }));
        assert!(matches!(
            FetchError::from_status(401, url, String::new()),
            FetchError::ClientError { status: 401, .. }
        ));
        assert!(matches!(
            FetchError::from_status(503, url, String::new()),
            FetchError::ServerError { status: 503 }
        ));
        assert!(matches!(FetchError::from_status(302, url, String::new()), FetchError::Unknown(_)));
    }

    #[test]
    fn test_timeout_message_includes_duration() {
        let error = FetchError::from_transport(TransportError::Timeout, Duration::from_millis(2500));
        assert_eq!(error.to_string(), "Request timeout reached: 2500 ms.");
    }

    #[test]
    fn test_auth_keeps_config_errors_flat() {
        let error = FetchError::auth(FetchError::ConfigInvalid("secret is empty".into()));
        assert_eq!(error, FetchError::ConfigInvalid("secret is empty".into()));

        let error = FetchError::auth(FetchError::MalformedResponse("missing token".into()));
        assert_eq!(
            error.to_string(),
            "Authorization failed: The server response could not be understood: missing token"
        );
    }
}
