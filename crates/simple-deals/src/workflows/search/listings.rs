use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use tracing::{debug, warn};

use super::domain::{ListingRecord, StructuredSearch};
use super::rapidapi::{GatewayError, RapidApiClient};

const SEARCH_HOST: &str = "zillow56.p.rapidapi.com";
const SEARCH_BASE_URL: &str = "https://www.zillow.com/homes/for_sale/LOCATION_rb/";

/// Listing provider. An empty vector means "no matches", an error means the call failed.
#[async_trait]
pub trait ListingSearch: Send + Sync {
    async fn search(&self, search: &StructuredSearch) -> Result<Vec<ListingRecord>, GatewayError>;
}

/// Listing search backed by the RapidAPI `search_url` endpoint.
#[derive(Debug, Clone)]
pub struct ZillowListingSearch {
    client: RapidApiClient,
    page: u32,
}

impl ZillowListingSearch {
    pub fn new(client: RapidApiClient, page: u32) -> Self {
        Self {
            client,
            page: page.max(1),
        }
    }
}

#[async_trait]
impl ListingSearch for ZillowListingSearch {
    async fn search(&self, search: &StructuredSearch) -> Result<Vec<ListingRecord>, GatewayError> {
        let url = search_url(search);
        debug!(%url, page = self.page, "searching listings");

        let response = self
            .client
            .get(
                SEARCH_HOST,
                "/search_url",
                &[
                    ("url", url),
                    ("page", self.page.to_string()),
                    ("output", "json".to_string()),
                    ("listing_type", "by_agent".to_string()),
                ],
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "listing search returned no results");
            return Ok(Vec::new());
        }

        let body: Value = response.json().await.map_err(|err| GatewayError::Decode {
            provider: SEARCH_HOST,
            message: err.to_string(),
        })?;

        Ok(parse_results(body))
    }
}

/// Characters left bare in the encoded query state; everything else becomes `%XX`, spaces
/// included.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Provider-facing search URL carrying the percent-encoded `searchQueryState`.
pub fn search_url(search: &StructuredSearch) -> String {
    let mut state = match serde_json::to_value(search) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    state.insert("isMapVisible".to_string(), Value::Bool(true));
    state.insert("isListVisible".to_string(), Value::Bool(true));

    let json = Value::Object(state).to_string();
    let encoded = utf8_percent_encode(&json, QUERY_COMPONENT);
    format!("{SEARCH_BASE_URL}?searchQueryState={encoded}")
}

/// Pull listing records out of a provider body, skipping entries that do not parse.
pub fn parse_results(body: Value) -> Vec<ListingRecord> {
    let results = match body {
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Value::Array(items) => items,
        _ => Vec::new(),
    };

    results
        .into_iter()
        .filter_map(|item| {
            if !item.is_object() {
                warn!("skipping non-object listing entry");
                return None;
            }
            match serde_json::from_value::<ListingRecord>(item) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(error = %err, "skipping listing that does not match the record shape");
                    None
                }
            }
        })
        .collect()
}
