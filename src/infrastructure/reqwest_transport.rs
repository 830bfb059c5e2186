// reqwest implementation of the transport port
use std::error::Error as StdError;
use std::io::ErrorKind;

use async_trait::async_trait;
use reqwest::header;

use crate::application::transport::{ApiRequest, HttpReply, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("owlet/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: &ApiRequest) -> Result<HttpReply, TransportError> {
        let response = self
            .client
            .get(&request.url)
            .bearer_auth(&request.bearer)
            .header(header::ACCEPT, "application/json")
            .timeout(request.timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;

        Ok(HttpReply::new(status, body))
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        if is_network_down(&error) {
            TransportError::Offline
        } else {
            TransportError::Unreachable
        }
    } else {
        TransportError::Other(error.to_string())
    }
}

/// Walk the source chain looking for an OS-level "no network" error.
fn is_network_down(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(io.kind(), ErrorKind::NetworkDown | ErrorKind::NetworkUnreachable) {
                return true;
            }
        }
        current = err.source();
    }
    false
}
