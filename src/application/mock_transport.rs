// Scripted transport for unit tests
use std::sync::Mutex;

use async_trait::async_trait;

use crate::application::transport::{ApiRequest, HttpReply, Transport, TransportError};

type Outcome = Result<HttpReply, TransportError>;

/// Answers requests by URL substring and records everything it receives.
///
/// Unmatched URLs get a 404 reply.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<(String, Outcome)>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to URLs containing `pattern`, replacing any earlier rule for it.
    pub fn respond(&self, pattern: &str, reply: HttpReply) {
        self.route(pattern, Ok(reply));
    }

    pub fn fail(&self, pattern: &str, error: TransportError) {
        self.route(pattern, Err(error));
    }

    fn route(&self, pattern: &str, outcome: Outcome) {
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|(p, _)| p != pattern);
        routes.push((pattern.to_string(), outcome));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, request: &ApiRequest) -> Result<HttpReply, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        // Give concurrent callers a chance to interleave
        tokio::task::yield_now().await;

        let routes = self.routes.lock().unwrap();
        routes
            .iter()
            .find(|(pattern, _)| request.url.contains(pattern.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or_else(|| Ok(HttpReply::new(404, r#"{"message":"Not Found"}"#)))
    }
}
