use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use super::rapidapi::{read_json, GatewayError};

const PROVIDER: &str = "street view";

/// Fetches the JSON document behind a street-view URL supplied by the client.
#[async_trait]
pub trait StreetViewSource: Send + Sync {
    async fn fetch(&self, location: &Url) -> Result<Value, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct HttpStreetView {
    http: Client,
}

impl HttpStreetView {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl StreetViewSource for HttpStreetView {
    async fn fetch(&self, location: &Url) -> Result<Value, GatewayError> {
        let response = self
            .http
            .get(location.clone())
            .send()
            .await
            .map_err(|err| GatewayError::Network {
                provider: PROVIDER,
                message: err.to_string(),
            })?;
        read_json(PROVIDER, response).await
    }
}

/// Accept only absolute http(s) URLs.
pub fn parse_location(raw: &str) -> Option<Url> {
    Url::parse(raw.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}
