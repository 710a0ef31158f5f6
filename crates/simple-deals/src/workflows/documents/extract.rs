use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::DocumentKind;
use crate::config::{ConfigError, DocumentServiceConfig};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("no text extraction service is configured")]
    NotConfigured,
    #[error("text extraction request failed: {0}")]
    Network(String),
    #[error("text extraction service returned {0}")]
    Status(u16),
    #[error("document contained no text")]
    Empty,
}

/// Turns an uploaded document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, kind: DocumentKind, bytes: Vec<u8>) -> Result<String, ExtractionError>;
}

/// Client for an Apache Tika server (`PUT /tika`, `Accept: text/plain`).
#[derive(Debug, Clone)]
pub struct TikaExtractor {
    http: Client,
    endpoint: Option<Url>,
}

impl TikaExtractor {
    pub fn from_config(config: &DocumentServiceConfig) -> Result<Self, ConfigError> {
        let endpoint = config
            .extractor_url
            .as_deref()
            .map(|base| {
                let raw = format!("{}/tika", base.trim_end_matches('/'));
                Url::parse(&raw).map_err(|_| ConfigError::InvalidValue {
                    name: "EXTRACTOR_URL",
                    value: base.to_string(),
                })
            })
            .transpose()?;

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|_| ConfigError::InvalidValue {
                name: "HTTP_TIMEOUT_SECS",
                value: format!("{:?}", config.request_timeout),
            })?;

        Ok(Self { http, endpoint })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[async_trait]
impl TextExtractor for TikaExtractor {
    async fn extract(&self, kind: DocumentKind, bytes: Vec<u8>) -> Result<String, ExtractionError> {
        let endpoint = self.endpoint.clone().ok_or(ExtractionError::NotConfigured)?;
        let size = bytes.len();

        let response = self
            .http
            .put(endpoint)
            .header(CONTENT_TYPE, kind.mime())
            .header(ACCEPT, "text/plain")
            .body(bytes)
            .send()
            .await
            .map_err(|err| ExtractionError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::Status(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|err| ExtractionError::Network(err.to_string()))?;
        if text.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }

        debug!(?kind, bytes = size, chars = text.len(), "document text extracted");
        Ok(text)
    }
}
