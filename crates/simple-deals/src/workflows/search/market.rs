use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use super::domain::StructuredSearch;
use super::rapidapi::{read_json, GatewayError, RapidApiClient};

/// Location the market statistics are keyed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketLocation {
    pub city: Option<String>,
    pub state: String,
}

impl MarketLocation {
    pub fn from_search(search: &StructuredSearch) -> Option<Self> {
        search.state.clone().map(|state| Self {
            city: search.city.clone(),
            state,
        })
    }

    pub fn label(&self) -> String {
        match &self.city {
            Some(city) => format!("{city}, {}", self.state),
            None => self.state.clone(),
        }
    }
}

/// What the gateway needs for one snapshot.
#[derive(Debug, Clone)]
pub struct MarketQuery {
    pub location: Option<MarketLocation>,
    /// Free text used for the web-snippet lookup.
    pub search_text: String,
}

/// Point-in-time market statistics. A `None` slice means the source failed, timed out or
/// was not applicable; it is never filled with estimates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub location: Option<String>,
    pub sale_overview: Option<Value>,
    pub rental_overview: Option<Value>,
    pub inventory: Option<Value>,
    pub rate_trend: Option<Value>,
    pub web_snippets: Option<Vec<String>>,
}

impl MarketSnapshot {
    pub fn is_empty(&self) -> bool {
        self.sale_overview.is_none()
            && self.rental_overview.is_none()
            && self.inventory.is_none()
            && self.rate_trend.is_none()
            && self.web_snippets.is_none()
    }

    /// Human-readable names of the slices that are missing.
    pub fn missing_slices(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.sale_overview.is_none() {
            missing.push("sale overview");
        }
        if self.rental_overview.is_none() {
            missing.push("rental overview");
        }
        if self.inventory.is_none() {
            missing.push("inventory");
        }
        if self.rate_trend.is_none() {
            missing.push("mortgage rate trend");
        }
        if self.web_snippets.is_none() {
            missing.push("web context");
        }
        missing
    }
}

/// The five independent market sources.
#[async_trait]
pub trait MarketSources: Send + Sync {
    async fn sale_overview(&self, location: &MarketLocation) -> Result<Value, GatewayError>;
    async fn rental_overview(&self, location: &MarketLocation) -> Result<Value, GatewayError>;
    async fn inventory(&self) -> Result<Value, GatewayError>;
    async fn rate_trend(&self, location: &MarketLocation) -> Result<Value, GatewayError>;
    async fn web_snippets(&self, text: &str) -> Result<Vec<String>, GatewayError>;
}

/// Fans out to every [`MarketSources`] call concurrently and assembles whatever came back.
#[derive(Clone)]
pub struct MarketDataGateway {
    sources: Arc<dyn MarketSources>,
    timeout: Duration,
}

impl MarketDataGateway {
    pub fn new(sources: Arc<dyn MarketSources>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    /// Returns `None` only when every source came back empty.
    pub async fn snapshot(&self, query: &MarketQuery) -> Option<MarketSnapshot> {
        let sources = self.sources.as_ref();
        let location = query.location.as_ref();

        let (sale_overview, rental_overview, inventory, rate_trend, web_snippets) = tokio::join!(
            self.slice("sale_overview", location.map(|loc| sources.sale_overview(loc))),
            self.slice("rental_overview", location.map(|loc| sources.rental_overview(loc))),
            self.slice("inventory", Some(sources.inventory())),
            self.slice("rate_trend", location.map(|loc| sources.rate_trend(loc))),
            self.slice("web_snippets", Some(sources.web_snippets(&query.search_text))),
        );

        let snapshot = MarketSnapshot {
            location: location.map(MarketLocation::label),
            sale_overview,
            rental_overview,
            inventory,
            rate_trend,
            web_snippets,
        };

        if snapshot.is_empty() {
            None
        } else {
            Some(snapshot)
        }
    }

    async fn slice<T, F>(&self, name: &'static str, call: Option<F>) -> Option<T>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        let call = call?;
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                warn!(source = name, error = %err, "market source failed");
                None
            }
            Err(_) => {
                warn!(source = name, timeout_ms = self.timeout.as_millis() as u64, "market source timed out");
                None
            }
        }
    }
}

const SALE_HOST: &str = "zillow56.p.rapidapi.com";
const MARKET_HOST: &str = "zillow-working-api.p.rapidapi.com";
const INVENTORY_HOST: &str = "zillow-com1.p.rapidapi.com";
const TREND_HOST: &str = "zillow-api-data.p.rapidapi.com";
const SEARCH_PROVIDER: &str = "www.googleapis.com";

/// RapidAPI-hosted market statistics plus Google Custom Search snippets.
#[derive(Debug, Clone)]
pub struct RapidApiMarketSources {
    client: RapidApiClient,
    google: Option<GoogleSearchKeys>,
}

#[derive(Clone)]
pub struct GoogleSearchKeys {
    pub api_key: String,
    pub engine_id: String,
}

impl std::fmt::Debug for GoogleSearchKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSearchKeys")
            .field("engine_id", &self.engine_id)
            .finish_non_exhaustive()
    }
}

impl RapidApiMarketSources {
    pub fn new(client: RapidApiClient, google: Option<GoogleSearchKeys>) -> Self {
        Self { client, google }
    }

    fn http(&self) -> &Client {
        self.client.http()
    }
}

#[async_trait]
impl MarketSources for RapidApiMarketSources {
    /// Sale statistics plus the home-value index for the same location.
    async fn sale_overview(&self, location: &MarketLocation) -> Result<Value, GatewayError> {
        let label = location.label();
        let sale_params = [("location", label.clone())];
        let home_value_params = [
            ("search_query", label),
            ("home_type", "All_Homes".to_string()),
            ("exclude_rentalMarketTrends", "true".to_string()),
            ("exclude_neighborhoods_zhvi", "true".to_string()),
        ];
        let (sale, home_values) = tokio::join!(
            self.client
                .get_json(SALE_HOST, "/market_sale_overview", &sale_params),
            self.client
                .get_json(MARKET_HOST, "/housing_market", &home_value_params),
        );
        merge_sale_overview(sale, home_values)
    }

    async fn rental_overview(&self, location: &MarketLocation) -> Result<Value, GatewayError> {
        self.client
            .get_json(
                MARKET_HOST,
                "/rental_market",
                &[
                    ("search_query", location.label()),
                    ("bedrooom_type", "All_Bedrooms".to_string()),
                    ("home_type", "All_Property_Types".to_string()),
                ],
            )
            .await
    }

    async fn inventory(&self) -> Result<Value, GatewayError> {
        self.client
            .get_json(
                INVENTORY_HOST,
                "/residentialData/monthlyInventory",
                &[("yyyymm", current_month()), ("limit", "20".to_string())],
            )
            .await
    }

    async fn rate_trend(&self, location: &MarketLocation) -> Result<Value, GatewayError> {
        self.client
            .get_json(
                TREND_HOST,
                "/trend",
                &[
                    ("durationDays", "21".to_string()),
                    ("includeCurrentRate", "true".to_string()),
                    ("limit", "5".to_string()),
                    ("program", "Fixed30Year".to_string()),
                    ("stateAbbreviation", capitalize_state(&location.state)),
                ],
            )
            .await
    }

    async fn web_snippets(&self, text: &str) -> Result<Vec<String>, GatewayError> {
        let keys = self
            .google
            .as_ref()
            .ok_or(GatewayError::NotConfigured("GOOGLE_API_KEY/GOOGLE_CSE_ID"))?;

        let response = self
            .http()
            .get(format!("https://{SEARCH_PROVIDER}/customsearch/v1"))
            .query(&[
                ("key", keys.api_key.as_str()),
                ("cx", keys.engine_id.as_str()),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|err| GatewayError::Network {
                provider: SEARCH_PROVIDER,
                message: err.to_string(),
            })?;

        let body = read_json(SEARCH_PROVIDER, response).await?;
        Ok(snippets_from(&body))
    }
}

/// The sale slice is present when either half answered; it fails only when both did.
fn merge_sale_overview(
    sale: Result<Value, GatewayError>,
    home_values: Result<Value, GatewayError>,
) -> Result<Value, GatewayError> {
    match (sale, home_values) {
        (Ok(sale), Ok(home_values)) => Ok(json!({
            "saleOverview": sale,
            "homeValues": home_values,
        })),
        (Ok(sale), Err(err)) => {
            warn!(error = %err, "home values unavailable");
            Ok(json!({ "saleOverview": sale }))
        }
        (Err(err), Ok(home_values)) => {
            warn!(error = %err, "sale overview unavailable");
            Ok(json!({ "homeValues": home_values }))
        }
        (Err(err), Err(_)) => Err(err),
    }
}

fn current_month() -> String {
    let now = Utc::now();
    format!("{}{:02}", now.year(), now.month())
}

/// `tx` -> `Tx`, the casing the trend provider expects.
fn capitalize_state(state: &str) -> String {
    let lower = state.trim().to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn snippets_from(body: &Value) -> Vec<String> {
    body.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("snippet").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedSources {
        hang_rate_trend: bool,
        fail_rental: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketSources for ScriptedSources {
        async fn sale_overview(&self, location: &MarketLocation) -> Result<Value, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "location": location.label(), "medianSalePrice": 412_000 }))
        }

        async fn rental_overview(&self, _: &MarketLocation) -> Result<Value, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_rental {
                return Err(GatewayError::Status {
                    provider: MARKET_HOST,
                    status: 502,
                });
            }
            Ok(json!({ "medianRent": 1_950 }))
        }

        async fn inventory(&self) -> Result<Value, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "activeListings": 1_204 }))
        }

        async fn rate_trend(&self, _: &MarketLocation) -> Result<Value, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_rate_trend {
                std::future::pending::<()>().await;
            }
            Ok(json!({ "rate": 6.71 }))
        }

        async fn web_snippets(&self, _: &str) -> Result<Vec<String>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["Austin inventory rose 12% year over year".to_string()])
        }
    }

    fn austin() -> MarketQuery {
        MarketQuery {
            location: Some(MarketLocation {
                city: Some("Austin".to_string()),
                state: "TX".to_string(),
            }),
            search_text: "Austin housing market outlook".to_string(),
        }
    }

    #[tokio::test]
    async fn hung_source_is_cut_off_by_its_timeout() {
        let sources = Arc::new(ScriptedSources {
            hang_rate_trend: true,
            ..ScriptedSources::default()
        });
        let gateway = MarketDataGateway::new(sources.clone(), Duration::from_millis(50));

        let snapshot = tokio::time::timeout(Duration::from_secs(2), gateway.snapshot(&austin()))
            .await
            .expect("snapshot finishes within the bound")
            .expect("snapshot has data");

        assert!(snapshot.rate_trend.is_none());
        assert!(snapshot.sale_overview.is_some());
        assert!(snapshot.rental_overview.is_some());
        assert!(snapshot.inventory.is_some());
        assert!(snapshot.web_snippets.is_some());
        assert_eq!(snapshot.missing_slices(), vec!["mortgage rate trend"]);
        assert_eq!(sources.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn failing_source_yields_null_slice() {
        let sources = Arc::new(ScriptedSources {
            fail_rental: true,
            ..ScriptedSources::default()
        });
        let gateway = MarketDataGateway::new(sources, Duration::from_millis(500));

        let snapshot = gateway.snapshot(&austin()).await.expect("partial data");
        assert!(snapshot.rental_overview.is_none());
        assert_eq!(snapshot.location.as_deref(), Some("Austin, TX"));
    }

    #[tokio::test]
    async fn location_keyed_sources_are_skipped_without_a_state() {
        let sources = Arc::new(ScriptedSources::default());
        let gateway = MarketDataGateway::new(sources.clone(), Duration::from_millis(500));
        let query = MarketQuery {
            location: None,
            search_text: "is now a good time to buy".to_string(),
        };

        let snapshot = gateway.snapshot(&query).await.expect("national data");
        assert!(snapshot.sale_overview.is_none());
        assert!(snapshot.rate_trend.is_none());
        assert!(snapshot.inventory.is_some());
        assert_eq!(sources.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn state_casing_matches_provider() {
        assert_eq!(capitalize_state("TX"), "Tx");
        assert_eq!(capitalize_state("florida"), "Florida");
        assert_eq!(capitalize_state(""), "");
    }

    #[test]
    fn snippets_are_collected_in_order() {
        let body = json!({ "items": [ { "snippet": "one" }, { "title": "no snippet" }, { "snippet": "two" } ] });
        assert_eq!(snippets_from(&body), vec!["one", "two"]);
    }

    #[test]
    fn sale_slice_keeps_whichever_half_answered() {
        let failed = || GatewayError::Status {
            provider: SALE_HOST,
            status: 503,
        };

        let both = merge_sale_overview(Ok(json!({ "median": 1 })), Ok(json!({ "zhvi": 2 })))
            .expect("both halves");
        assert_eq!(both, json!({ "saleOverview": { "median": 1 }, "homeValues": { "zhvi": 2 } }));

        let values_only =
            merge_sale_overview(Err(failed()), Ok(json!({ "zhvi": 2 }))).expect("one half");
        assert_eq!(values_only, json!({ "homeValues": { "zhvi": 2 } }));

        assert!(merge_sale_overview(Err(failed()), Err(failed())).is_err());
    }
}
