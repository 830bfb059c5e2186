// Nightscout client - v3 requests with legacy v2 fallback on 403
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::application::error::FetchError;
use crate::application::token_manager::TokenManager;
use crate::application::transport::{ApiRequest, Transport};
use crate::domain::sample::{Sample, SampleSeries};
use crate::infrastructure::config::NightscoutSettings;

pub const ENTRIES_ENDPOINT: &str = "/api/v3/entries";
pub const STATUS_ENDPOINT: &str = "/api/v3/status";
pub const LEGACY_ENTRIES_ENDPOINT: &str = "/api/v2/entries/sgv";
pub const LEGACY_STATUS_ENDPOINT: &str = "/api/v2/status";

const SORT_BY: &str = "date";
const FIELDS: &str = "sgv,direction,srvCreated";
const ENTRY_TYPE: &str = "sgv";
const MAX_DETAIL_LEN: usize = 200;

/// Entry in the v3 shape.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Entry {
    pub sgv: f64,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(rename = "srvCreated")]
    pub srv_created: i64,
}

/// Entry as returned by `/api/v2/entries/sgv`.
#[derive(Debug, Clone, Deserialize)]
struct LegacyEntry {
    sgv: f64,
    #[serde(default)]
    direction: Option<String>,
    mills: i64,
}

impl From<LegacyEntry> for Entry {
    fn from(legacy: LegacyEntry) -> Self {
        Entry {
            sgv: legacy.sgv,
            direction: legacy.direction,
            srv_created: legacy.mills,
        }
    }
}

impl From<Entry> for Sample {
    fn from(entry: Entry) -> Self {
        Sample::new(entry.sgv, entry.direction, entry.srv_created)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntriesBody {
    Wrapped { result: Vec<Entry> },
    Bare(Vec<Entry>),
}

/// Fields of the status payload shared by both API versions.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStatus {
    pub version: Option<String>,
    pub name: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiVersion {
    V3,
    V2,
}

pub struct NightscoutClient {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenManager>,
}

impl NightscoutClient {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<TokenManager>) -> Self {
        Self { transport, tokens }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Fetch the newest `limit` glucose entries.
    pub async fn get_data(&self, settings: &NightscoutSettings, limit: u32) -> Result<SampleSeries, FetchError> {
        let base = require_base_url(settings)?;
        let primary = format!(
            "{}{}?sort$desc={}&limit={}&fields={}&type$eq={}",
            base,
            ENTRIES_ENDPOINT,
            SORT_BY,
            limit,
            urlencoding::encode(FIELDS),
            ENTRY_TYPE
        );
        let fallback = format!("{}{}?count={}", base, LEGACY_ENTRIES_ENDPOINT, limit);

        let (version, body) = self
            .fetch_with_fallback(&self.tokens, settings, &primary, &fallback)
            .await?;

        let entries = match version {
            ApiVersion::V3 => parse_entries(&body)?,
            ApiVersion::V2 => parse_legacy_entries(&body)?,
        };
        let series = SampleSeries::new(entries.into_iter().map(Sample::from).collect());
        if series.is_empty() {
            tracing::warn!("Server returned no entries via {:?}", version);
        } else {
            tracing::debug!("Received {} entries via {:?}", series.len(), version);
        }

        Ok(series)
    }

    /// Probe a site, typically with settings that have not been saved yet.
    ///
    /// Uses its own token cache so the live token is left alone.
    pub async fn get_status(&self, params: &NightscoutSettings) -> Result<ServerStatus, FetchError> {
        let base = require_base_url(params)?;
        let primary = format!("{}{}", base, STATUS_ENDPOINT);
        let fallback = format!("{}{}", base, LEGACY_STATUS_ENDPOINT);
        let tokens = TokenManager::new(self.transport.clone());

        let (version, body) = self
            .fetch_with_fallback(&tokens, params, &primary, &fallback)
            .await?;
        tracing::debug!("Status answered via {:?}", version);

        parse_status(&body)
    }

    async fn fetch_with_fallback(
        &self,
        tokens: &TokenManager,
        settings: &NightscoutSettings,
        primary: &str,
        fallback: &str,
    ) -> Result<(ApiVersion, String), FetchError> {
        let token = tokens.valid_token(settings).await?;

        match self.get_body(primary, &token.value, settings).await {
            Ok(body) => Ok((ApiVersion::V3, body)),
            Err(e) if e.is_unauthorized() => {
                tracing::warn!("Request was rejected ({}), retrying with a new token against the legacy API", e);
                tokens.invalidate();
                let token = tokens.valid_token(settings).await?;
                let body = self.get_body(fallback, &token.value, settings).await?;
                Ok((ApiVersion::V2, body))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_body(&self, url: &str, bearer: &str, settings: &NightscoutSettings) -> Result<String, FetchError> {
        let request = ApiRequest::new(url.to_string(), bearer.to_string(), settings.timeout());
        let reply = self
            .transport
            .get(&request)
            .await
            .map_err(|e| FetchError::from_transport(e, settings.timeout()))?;

        if reply.status == 200 {
            Ok(reply.body)
        } else {
            tracing::debug!("{} answered with status {}", url, reply.status);
            Err(FetchError::from_status(reply.status, url, error_detail(&reply.body)))
        }
    }
}

fn require_base_url(settings: &NightscoutSettings) -> Result<&str, FetchError> {
    let base = settings.base_url();
    if base.is_empty() {
        return Err(FetchError::ConfigInvalid("the Nightscout site address is empty".to_string()));
    }
    Ok(base)
}

/// Prefer the `message` field of an error payload over the raw body.
fn error_detail(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from));

    match message {
        Some(message) => message,
        None => body.trim().chars().take(MAX_DETAIL_LEN).collect(),
    }
}

pub fn parse_entries(body: &str) -> Result<Vec<Entry>, FetchError> {
    let parsed: EntriesBody = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("unexpected entries payload: {}", e)))?;

    Ok(match parsed {
        EntriesBody::Wrapped { result } => result,
        EntriesBody::Bare(entries) => entries,
    })
}

fn parse_legacy_entries(body: &str) -> Result<Vec<Entry>, FetchError> {
    let legacy: Vec<LegacyEntry> = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("unexpected legacy entries payload: {}", e)))?;

    Ok(legacy.into_iter().map(Entry::from).collect())
}

fn parse_status(body: &str) -> Result<ServerStatus, FetchError> {
    let raw: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("status payload is not JSON: {}", e)))?;
    if !raw.is_object() {
        return Err(FetchError::MalformedResponse("status payload is not an object".to_string()));
    }

    // v3 nests the fields under `result`
    let scope = raw.get("result").filter(|v| v.is_object()).unwrap_or(&raw);
    let field = |name: &str| scope.get(name).and_then(Value::as_str).map(String::from);

    Ok(ServerStatus {
        version: field("version"),
        name: field("name"),
        raw: raw.clone(),
    })
}
