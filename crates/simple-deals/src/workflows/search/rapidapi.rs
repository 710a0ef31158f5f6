use reqwest::{Client, Response};
use serde_json::Value;

use crate::config::{ConfigError, ProviderConfig};

/// Failure talking to an external data provider.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request to {provider} failed: {message}")]
    Network {
        provider: &'static str,
        message: String,
    },
    #[error("{provider} returned {status}")]
    Status { provider: &'static str, status: u16 },
    #[error("{provider} sent an unreadable body: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

/// Shared HTTP client for RapidAPI-hosted providers.
#[derive(Clone)]
pub struct RapidApiClient {
    http: Client,
    api_key: String,
}

impl std::fmt::Debug for RapidApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RapidApiClient").finish_non_exhaustive()
    }
}

impl RapidApiClient {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .rapidapi_key
            .clone()
            .ok_or(ConfigError::MissingSecret("RAPIDAPI_API_KEY"))?;
        let http = build_http_client(config)?;
        Ok(Self { http, api_key })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// GET `https://{host}{path}` with the RapidAPI key headers.
    pub async fn get(
        &self,
        host: &'static str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Response, GatewayError> {
        self.http
            .get(format!("https://{host}{path}"))
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", host)
            .query(params)
            .send()
            .await
            .map_err(|err| GatewayError::Network {
                provider: host,
                message: err.to_string(),
            })
    }

    /// GET and decode a JSON body, treating non-2xx as an error.
    pub async fn get_json(
        &self,
        host: &'static str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, GatewayError> {
        let response = self.get(host, path, params).await?;
        read_json(host, response).await
    }
}

pub(crate) fn build_http_client(config: &ProviderConfig) -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|_| ConfigError::InvalidValue {
            name: "HTTP_TIMEOUT_SECS",
            value: format!("{:?}", config.request_timeout),
        })
}

pub(crate) async fn read_json(
    provider: &'static str,
    response: Response,
) -> Result<Value, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::Status {
            provider,
            status: status.as_u16(),
        });
    }
    response.json().await.map_err(|err| GatewayError::Decode {
        provider,
        message: err.to_string(),
    })
}
