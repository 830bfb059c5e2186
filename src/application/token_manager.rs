// Bearer token acquisition and caching
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::Mutex;

use crate::application::error::FetchError;
use crate::application::transport::{ApiRequest, Transport};
use crate::infrastructure::config::{mask_secret, NightscoutSettings};

pub const AUTH_ENDPOINT: &str = "/api/v2/authorization/request";

#[derive(Clone, PartialEq)]
pub struct Token {
    pub value: String,
    /// Expiration in epoch milliseconds.
    pub expires_at_ms: i64,
    /// Base URL of the site that issued the token.
    pub site: String,
}

impl Token {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at_ms
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("value", &mask_secret(&self.value))
            .field("expires_at_ms", &self.expires_at_ms)
            .field("site", &self.site)
            .finish()
    }
}

/// Owns the current token. Shared with the client through an `Arc`.
pub struct TokenManager {
    transport: Arc<dyn Transport>,
    current: RwLock<Option<Token>>,
    refresh: Mutex<()>,
}

impl TokenManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self.cached() {
            Some(token) => token.is_expired_at(now_ms),
            None => true,
        }
    }

    pub fn cached(&self) -> Option<Token> {
        self.current.read().map(|guard| guard.clone()).unwrap_or(None)
    }

    pub fn invalidate(&self) {
        self.store(None);
    }

    fn store(&self, token: Option<Token>) {
        match self.current.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    /// Return the cached token if it is still fresh, otherwise obtain a new
    /// one. Concurrent refreshes are collapsed into one request.
    pub async fn valid_token(&self, settings: &NightscoutSettings) -> Result<Token, FetchError> {
        if let Some(token) = self.fresh(settings) {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(token) = self.fresh(settings) {
            return Ok(token);
        }

        self.obtain_token(settings).await
    }

    /// A token issued by another site counts as expired, even if a poll
    /// started before a settings change stored it late.
    fn fresh(&self, settings: &NightscoutSettings) -> Option<Token> {
        if self.is_expired() {
            return None;
        }
        self.cached().filter(|token| token.site == settings.base_url())
    }

    /// Exchange the API secret for a bearer token.
    ///
    /// Any failure clears the cached token before the error is returned.
    pub async fn obtain_token(&self, settings: &NightscoutSettings) -> Result<Token, FetchError> {
        match self.request_token(settings).await {
            Ok(token) => {
                tracing::debug!("Obtained token expiring at {}", token.expires_at_ms);
                self.store(Some(token.clone()));
                Ok(token)
            }
            Err(e) => {
                self.invalidate();
                tracing::warn!("Token request failed: {}", e);
                Err(FetchError::auth(e))
            }
        }
    }

    async fn request_token(&self, settings: &NightscoutSettings) -> Result<Token, FetchError> {
        let secret = settings.secret.trim();
        if secret.is_empty() {
            tracing::warn!("Nightscout secret is empty, skipping token request");
            return Err(FetchError::ConfigInvalid("the Nightscout API secret is empty".to_string()));
        }

        let base = settings.base_url();
        if base.is_empty() {
            tracing::warn!("Nightscout URL is empty, skipping token request");
            return Err(FetchError::ConfigInvalid("the Nightscout site address is empty".to_string()));
        }

        let url = format!("{}{}", base, AUTH_ENDPOINT);
        tracing::debug!("Requesting token from {} with secret {}", url, mask_secret(secret));

        let request = ApiRequest::new(url.clone(), secret.to_string(), settings.timeout());
        let reply = self
            .transport
            .get(&request)
            .await
            .map_err(|e| FetchError::from_transport(e, settings.timeout()))?;

        if reply.status != 200 {
            return Err(FetchError::from_status(reply.status, &url, reply.body));
        }

        parse_token(&reply.body, base)
    }
}

fn parse_token(body: &str, site: &str) -> Result<Token, FetchError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("token response is not JSON: {}", e)))?;

    let value = json
        .get("token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| FetchError::MalformedResponse("token response has no token".to_string()))?;

    let exp = json
        .get("exp")
        .and_then(Value::as_f64)
        .filter(|exp| exp.is_finite())
        .ok_or_else(|| FetchError::MalformedResponse("token response has no numeric exp".to_string()))?;

    Ok(Token {
        value: value.to_string(),
        expires_at_ms: (exp * 1000.0).round() as i64,
        site: site.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::mock_transport::MockTransport;
    use crate::application::transport::{HttpReply, TransportError};

    const BASE: &str = "https://ns.example.com";
    const SECRET: &str = "owlet-0123456789";

    fn settings() -> NightscoutSettings {
        NightscoutSettings::new(format!("{}/", BASE), SECRET)
    }

    fn far_future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    fn token_body(token: &str, exp: i64) -> String {
        format!(r#"{{"token":"{}","exp":{}}}"#, token, exp)
    }

    #[tokio::test]
    async fn test_obtain_token_sends_secret_in_header() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(AUTH_ENDPOINT, HttpReply::new(200, token_body("jwt-1", 1_700_000_000)));
        let manager = TokenManager::new(transport.clone());

        let token = manager.obtain_token(&settings()).await.unwrap();

        assert_eq!(token.value, "jwt-1");
        assert_eq!(token.expires_at_ms, 1_700_000_000_000);
        assert_eq!(manager.cached(), Some(token));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, format!("{}{}", BASE, AUTH_ENDPOINT));
        assert_eq!(requests[0].bearer, SECRET);
        assert!(!requests[0].url.contains(SECRET));
    }

    #[tokio::test]
    async fn test_blank_secret_fails_without_network() {
        let transport = Arc::new(MockTransport::new());
        let manager = TokenManager::new(transport.clone());

        let result = manager.obtain_token(&NightscoutSettings::new(BASE, "   ")).await;

        assert!(matches!(result, Err(FetchError::ConfigInvalid(_))));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_field_clears_cache() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(AUTH_ENDPOINT, HttpReply::new(200, token_body("jwt-1", far_future_exp())));
        let manager = TokenManager::new(transport.clone());
        manager.obtain_token(&settings()).await.unwrap();
        assert!(!manager.is_expired());

        transport.respond(AUTH_ENDPOINT, HttpReply::new(200, r#"{"exp": 1700000000}"#));
        let result = manager.obtain_token(&settings()).await;

        assert!(matches!(result, Err(FetchError::Auth(_))));
        assert_eq!(manager.cached(), None);
        assert!(manager.is_expired());
    }

    #[tokio::test]
    async fn test_non_numeric_exp_clears_cache() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(AUTH_ENDPOINT, HttpReply::new(200, token_body("jwt-1", far_future_exp())));
        let manager = TokenManager::new(transport.clone());
        manager.obtain_token(&settings()).await.unwrap();

        transport.respond(AUTH_ENDPOINT, HttpReply::new(200, r#"{"token":"jwt-2","exp":"soon"}"#));
        let result = manager.obtain_token(&settings()).await;

        assert!(matches!(result, Err(FetchError::Auth(_))));
        assert_eq!(manager.cached(), None);
    }

    #[tokio::test]
    async fn test_failures_surface_as_auth_errors() {
        let transport = Arc::new(MockTransport::new());
        let manager = TokenManager::new(transport.clone());

        transport.respond(AUTH_ENDPOINT, HttpReply::new(200, "<html>not json</html>"));
        let result = manager.obtain_token(&settings()).await;
        assert!(matches!(result, Err(FetchError::Auth(_))));

        transport.respond(AUTH_ENDPOINT, HttpReply::new(401, r#"{"message":"bad secret"}"#));
        let result = manager.obtain_token(&settings()).await;
        match result {
            Err(FetchError::Auth(cause)) => {
                assert!(matches!(*cause, FetchError::ClientError { status: 401, .. }))
            }
            other => panic!("unexpected result: {:?}", other),
        }

        transport.fail(AUTH_ENDPOINT, TransportError::Timeout);
        let result = manager.obtain_token(&settings()).await;
        match result {
            Err(FetchError::Auth(cause)) => {
                assert_eq!(*cause, FetchError::Timeout { timeout_ms: 10_000 })
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(manager.cached(), None);
    }

    #[tokio::test]
    async fn test_valid_token_reuses_fresh_token() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(AUTH_ENDPOINT, HttpReply::new(200, token_body("jwt-1", far_future_exp())));
        let manager = TokenManager::new(transport.clone());

        let first = manager.valid_token(&settings()).await.unwrap();
        let second = manager.valid_token(&settings()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_valid_token_refreshes_expired_token() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(AUTH_ENDPOINT, HttpReply::new(200, token_body("old", 1_000)));
        let manager = TokenManager::new(transport.clone());
        manager.obtain_token(&settings()).await.unwrap();
        assert!(manager.is_expired());

        transport.respond(AUTH_ENDPOINT, HttpReply::new(200, token_body("new", far_future_exp())));
        let token = manager.valid_token(&settings()).await.unwrap();

        assert_eq!(token.value, "new");
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_request() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(AUTH_ENDPOINT, HttpReply::new(200, token_body("jwt-1", far_future_exp())));
        let manager = Arc::new(TokenManager::new(transport.clone()));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.valid_token(&settings()).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().value, "jwt-1");
        }

        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_token_from_another_site_is_not_reused() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(AUTH_ENDPOINT, HttpReply::new(200, token_body("site-a", far_future_exp())));
        let manager = TokenManager::new(transport.clone());

        // A poll with the old settings stores its token after the switch
        let token = manager.obtain_token(&settings()).await.unwrap();
        assert_eq!(token.site, BASE);

        let other = NightscoutSettings::new("https://other.example.com/", SECRET);
        transport.respond(AUTH_ENDPOINT, HttpReply::new(200, token_body("site-b", far_future_exp())));
        let token = manager.valid_token(&other).await.unwrap();

        assert_eq!(token.value, "site-b");
        assert_eq!(token.site, "https://other.example.com");
        let urls = transport.urls();
        assert_eq!(urls.last().unwrap(), &format!("https://other.example.com{}", AUTH_ENDPOINT));
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn test_expiry_boundary() {
        let token = Token {
            value: "jwt".to_string(),
            expires_at_ms: 5_000,
            site: BASE.to_string(),
        };
        assert!(!token.is_expired_at(5_000));
        assert!(token.is_expired_at(5_001));
    }
}
