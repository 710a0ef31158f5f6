use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use serde_json::{json, Value};
use url::Url;

use crate::assistant::model::{ChatMessage, LanguageModel, ModelError};
use crate::assistant::prompts::PromptTemplate;
use crate::assistant::report_writer::ReportWriter;
use crate::workflows::analysis::history::{HistoryError, HistoryId, HistoryRecord, HistoryStore};
use crate::workflows::analysis::{analysis_router, AnalysisState, PropertyAnalysisService};
use crate::workflows::documents::{
    DocumentKind, ExtractionError, RenderError, ReportRenderer, ReportService, TextExtractor,
};
use crate::workflows::search::domain::{ListingRecord, StructuredSearch};
use crate::workflows::search::listings::ListingSearch;
use crate::workflows::search::market::{MarketDataGateway, MarketLocation, MarketSources};
use crate::workflows::search::rapidapi::GatewayError;

pub(super) const AUSTIN_SEARCH: &str = r#"```json
{
  "city": "Austin",
  "state": "tx",
  "usersSearchTerm": "Austin, TX",
  "filterState": { "beds": { "min": 3 }, },
}
```"#;

pub(super) const LISTING_REPLY: &str =
    r#"{"description": "Five homes in Austin match.", "cardView": true}"#;

pub(super) const MEMO_REPLY: &str = "### Market Overview\nMedian sale price is $412,000.\n\n\
!!!Should I find the most popular homes for sale in Austin, TX?!!!";

/// Which template a message list was built from, judged by its fixed opening line.
fn template_of(messages: &[ChatMessage]) -> Option<PromptTemplate> {
    let first = messages.first()?;
    [
        PromptTemplate::ClassifyIntent,
        PromptTemplate::ResolveAffirmation,
        PromptTemplate::StructureSearch,
        PromptTemplate::SummarizeListings,
        PromptTemplate::AnalyzeMarket,
        PromptTemplate::PropertyReport,
    ]
    .into_iter()
    .find(|template| {
        let rendered = template.render(&[]);
        let opening = rendered.lines().next().unwrap_or_default();
        first.content.starts_with(opening)
    })
}

/// Answers each template with a canned reply and records every call.
#[derive(Default)]
pub(super) struct ScriptedModel {
    replies: HashMap<PromptTemplate, String>,
    calls: Mutex<Vec<(PromptTemplate, String)>>,
}

impl ScriptedModel {
    pub(super) fn reply(mut self, template: PromptTemplate, text: &str) -> Self {
        self.replies.insert(template, text.to_string());
        self
    }

    /// Model that classifies as `intent` and can structure and summarize the Austin search.
    pub(super) fn answering(intent: &str) -> Self {
        Self::default()
            .reply(PromptTemplate::ClassifyIntent, intent)
            .reply(PromptTemplate::StructureSearch, AUSTIN_SEARCH)
            .reply(PromptTemplate::SummarizeListings, LISTING_REPLY)
            .reply(PromptTemplate::AnalyzeMarket, MEMO_REPLY)
            .reply(PromptTemplate::PropertyReport, "<h2>Valuation</h2><p>Fair.</p>")
    }

    pub(super) fn templates(&self) -> Vec<PromptTemplate> {
        self.calls
            .lock()
            .expect("model mutex poisoned")
            .iter()
            .map(|(template, _)| *template)
            .collect()
    }

    /// Content of the last message of the first call made with `template`.
    pub(super) fn content_for(&self, template: PromptTemplate) -> Option<String> {
        self.calls
            .lock()
            .expect("model mutex poisoned")
            .iter()
            .find(|(called, _)| *called == template)
            .map(|(_, content)| content.clone())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ModelError> {
        let template = template_of(&messages).expect("prompt built from a known template");
        let last = messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        self.calls
            .lock()
            .expect("model mutex poisoned")
            .push((template, last));
        self.replies.get(&template).cloned().ok_or(ModelError::Empty)
    }
}

pub(super) fn listings_with_bedrooms(bedrooms: &[f64]) -> Vec<ListingRecord> {
    bedrooms
        .iter()
        .enumerate()
        .map(|(index, beds)| {
            let record = json!({
                "streetAddress": format!("{} Elm St", 10 + index * 2),
                "city": "Austin",
                "state": "TX",
                "zipcode": 78704,
                "price": 350_000.0 + beds * 40_000.0,
                "bedrooms": beds,
                "bathrooms": 2,
                "livingArea": 1_100.0 + beds * 250.0,
                "yearBuilt": 1995,
                "zpid": 29_000_000 + index,
            });
            serde_json::from_value(record).expect("listing fixture parses")
        })
        .collect()
}

#[derive(Default)]
pub(super) struct FixedListings {
    listings: Vec<ListingRecord>,
    fail: bool,
    pub(super) calls: AtomicUsize,
    pub(super) last_search: Mutex<Option<StructuredSearch>>,
}

impl FixedListings {
    pub(super) fn returning(listings: Vec<ListingRecord>) -> Self {
        Self {
            listings,
            ..Self::default()
        }
    }

    pub(super) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(super) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingSearch for FixedListings {
    async fn search(&self, search: &StructuredSearch) -> Result<Vec<ListingRecord>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_search.lock().expect("search mutex poisoned") = Some(search.clone());
        if self.fail {
            return Err(GatewayError::Network {
                provider: "listings",
                message: "connection reset".to_string(),
            });
        }
        Ok(self.listings.clone())
    }
}

#[derive(Default)]
pub(super) struct StubMarket {
    pub(super) hang_rate_trend: bool,
    pub(super) calls: AtomicUsize,
}

impl StubMarket {
    pub(super) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketSources for StubMarket {
    async fn sale_overview(&self, location: &MarketLocation) -> Result<Value, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "location": location.label(), "medianSalePrice": 412_000 }))
    }

    async fn rental_overview(&self, _: &MarketLocation) -> Result<Value, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
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
        Ok(vec!["Austin inventory rose year over year".to_string()])
    }
}

#[derive(Default)]
pub(super) struct MemoryHistory {
    records: Mutex<HashMap<HistoryId, HistoryRecord>>,
}

impl MemoryHistory {
    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("history mutex poisoned").len()
    }

    pub(super) fn get(&self, id: &HistoryId) -> Option<HistoryRecord> {
        self.records
            .lock()
            .expect("history mutex poisoned")
            .get(id)
            .cloned()
    }
}

impl HistoryStore for MemoryHistory {
    fn save(&self, record: HistoryRecord) -> Result<HistoryRecord, HistoryError> {
        self.records
            .lock()
            .expect("history mutex poisoned")
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: HistoryRecord) -> Result<HistoryRecord, HistoryError> {
        let mut guard = self.records.lock().expect("history mutex poisoned");
        if !guard.contains_key(&record.id) {
            return Err(HistoryError::NotFound(record.id));
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &HistoryId) -> Result<Option<HistoryRecord>, HistoryError> {
        Ok(self.get(id))
    }

    fn list_by_email(&self, email: &str) -> Result<Vec<HistoryRecord>, HistoryError> {
        let guard = self.records.lock().expect("history mutex poisoned");
        let mut records: Vec<HistoryRecord> = guard
            .values()
            .filter(|record| record.email.as_deref() == Some(email))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

pub(super) struct UnavailableHistory;

impl HistoryStore for UnavailableHistory {
    fn save(&self, _record: HistoryRecord) -> Result<HistoryRecord, HistoryError> {
        Err(HistoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _record: HistoryRecord) -> Result<HistoryRecord, HistoryError> {
        Err(HistoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &HistoryId) -> Result<Option<HistoryRecord>, HistoryError> {
        Err(HistoryError::Unavailable("database offline".to_string()))
    }

    fn list_by_email(&self, _email: &str) -> Result<Vec<HistoryRecord>, HistoryError> {
        Err(HistoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct StubExtractor {
    pub(super) text: Option<String>,
    pub(super) seen: Mutex<Vec<DocumentKind>>,
}

#[async_trait]
impl TextExtractor for StubExtractor {
    async fn extract(&self, kind: DocumentKind, _bytes: Vec<u8>) -> Result<String, ExtractionError> {
        self.seen.lock().expect("extractor mutex poisoned").push(kind);
        self.text.clone().ok_or(ExtractionError::Status(422))
    }
}

#[derive(Default)]
pub(super) struct StubRenderer {
    pub(super) fail: bool,
    pub(super) html: Mutex<Option<String>>,
}

pub(super) const PDF_BYTES: &[u8] = b"%PDF-1.7 stub";

#[async_trait]
impl ReportRenderer for StubRenderer {
    async fn render_pdf(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        *self.html.lock().expect("renderer mutex poisoned") = Some(html.to_string());
        if self.fail {
            return Err(RenderError::Status(503));
        }
        Ok(PDF_BYTES.to_vec())
    }
}

#[derive(Default)]
pub(super) struct StubStreetView {
    pub(super) fail: bool,
}

#[async_trait]
impl crate::workflows::search::street_view::StreetViewSource for StubStreetView {
    async fn fetch(&self, location: &Url) -> Result<Value, GatewayError> {
        if self.fail {
            return Err(GatewayError::Status {
                provider: "street view",
                status: 403,
            });
        }
        Ok(json!({ "status": "OK", "requested": location.as_str() }))
    }
}

/// Service plus handles on every fake so tests can inspect what was called.
pub(super) struct Harness {
    pub(super) model: Arc<ScriptedModel>,
    pub(super) listings: Arc<FixedListings>,
    pub(super) market: Arc<StubMarket>,
    pub(super) history: Arc<dyn HistoryStore>,
    pub(super) memory: Arc<MemoryHistory>,
    pub(super) extractor: Arc<StubExtractor>,
    pub(super) renderer: Arc<StubRenderer>,
    pub(super) street_view: Arc<StubStreetView>,
    pub(super) market_timeout: Duration,
}

impl Harness {
    pub(super) fn new(model: ScriptedModel, listings: FixedListings) -> Self {
        let memory = Arc::new(MemoryHistory::default());
        Self {
            model: Arc::new(model),
            listings: Arc::new(listings),
            market: Arc::new(StubMarket::default()),
            history: memory.clone(),
            memory,
            extractor: Arc::new(StubExtractor::default()),
            renderer: Arc::new(StubRenderer::default()),
            street_view: Arc::new(StubStreetView::default()),
            market_timeout: Duration::from_millis(200),
        }
    }

    /// Listing-intent harness over five Austin listings.
    pub(super) fn listing() -> Self {
        Self::new(
            ScriptedModel::answering("listing"),
            FixedListings::returning(listings_with_bedrooms(&[2.0, 3.0, 3.0, 4.0, 5.0])),
        )
    }

    pub(super) fn service(&self) -> PropertyAnalysisService {
        PropertyAnalysisService::new(
            self.model.clone(),
            self.listings.clone(),
            MarketDataGateway::new(self.market.clone(), self.market_timeout),
            self.history.clone(),
        )
    }

    pub(super) fn router(&self) -> axum::Router {
        analysis_router(AnalysisState {
            analysis: Arc::new(self.service()),
            extractor: self.extractor.clone(),
            reports: Arc::new(ReportService::new(
                ReportWriter::new(self.model.clone()),
                self.renderer.clone(),
            )),
            street_view: self.street_view.clone(),
        })
    }
}

pub(super) fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

pub(super) fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

const BOUNDARY: &str = "simple-deals-boundary";

/// Multipart upload with a single field.
pub(super) fn upload_request(field: &str, content_type: &str, contents: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/v1/analyze-file")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request builds")
}

pub(super) async fn read_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    serde_json::from_slice(&read_body(response).await).expect("json payload")
}
