use metrics_exporter_prometheus::PrometheusHandle;
use simple_deals::assistant::{LanguageModel, OpenAiChatModel, ReportWriter};
use simple_deals::config::AppConfig;
use simple_deals::error::AppError;
use simple_deals::workflows::analysis::{
    AnalysisState, HistoryError, HistoryId, HistoryRecord, HistoryStore, PropertyAnalysisService,
};
use simple_deals::workflows::documents::{HttpPdfRenderer, ReportService, TikaExtractor};
use simple_deals::workflows::search::{
    GoogleSearchKeys, HttpStreetView, MarketDataGateway, RapidApiClient, RapidApiMarketSources,
    ZillowListingSearch,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryHistoryStore {
    records: Arc<Mutex<HashMap<HistoryId, HistoryRecord>>>,
}

impl InMemoryHistoryStore {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<HistoryId, HistoryRecord>>, HistoryError> {
        self.records
            .lock()
            .map_err(|_| HistoryError::Unavailable("history mutex poisoned".to_string()))
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn save(&self, record: HistoryRecord) -> Result<HistoryRecord, HistoryError> {
        let mut guard = self.lock()?;
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: HistoryRecord) -> Result<HistoryRecord, HistoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&record.id) {
            guard.insert(record.id.clone(), record.clone());
            Ok(record)
        } else {
            Err(HistoryError::NotFound(record.id))
        }
    }

    fn fetch(&self, id: &HistoryId) -> Result<Option<HistoryRecord>, HistoryError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn list_by_email(&self, email: &str) -> Result<Vec<HistoryRecord>, HistoryError> {
        let guard = self.lock()?;
        let mut records: Vec<HistoryRecord> = guard
            .values()
            .filter(|record| record.email.as_deref() == Some(email))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

pub(crate) fn language_model(config: &AppConfig) -> Result<Arc<dyn LanguageModel>, AppError> {
    Ok(Arc::new(OpenAiChatModel::from_config(&config.model)?))
}

fn google_keys(config: &AppConfig) -> Option<GoogleSearchKeys> {
    let providers = &config.providers;
    match (&providers.google_api_key, &providers.google_cse_id) {
        (Some(api_key), Some(engine_id)) => Some(GoogleSearchKeys {
            api_key: api_key.clone(),
            engine_id: engine_id.clone(),
        }),
        _ => {
            warn!("GOOGLE_API_KEY/GOOGLE_CSE_ID unset; web context will be unavailable");
            None
        }
    }
}

/// Wire the orchestrator to the real model and RapidAPI providers.
pub(crate) fn analysis_service(
    config: &AppConfig,
    model: Arc<dyn LanguageModel>,
    rapidapi: RapidApiClient,
    history: Arc<dyn HistoryStore>,
) -> PropertyAnalysisService {
    let listings = Arc::new(ZillowListingSearch::new(
        rapidapi.clone(),
        config.providers.listing_page,
    ));
    let market = MarketDataGateway::new(
        Arc::new(RapidApiMarketSources::new(rapidapi, google_keys(config))),
        config.providers.market_timeout,
    );
    PropertyAnalysisService::new(model, listings, market, history)
}

/// Everything the HTTP router needs, built once at startup.
pub(crate) fn analysis_state(
    config: &AppConfig,
    history: Arc<dyn HistoryStore>,
) -> Result<AnalysisState, AppError> {
    let model = language_model(config)?;
    let rapidapi = RapidApiClient::from_config(&config.providers)?;
    let street_view = HttpStreetView::new(rapidapi.http().clone());
    let analysis = analysis_service(config, model.clone(), rapidapi, history);

    let extractor = TikaExtractor::from_config(&config.documents)?;
    if !extractor.is_configured() {
        warn!("EXTRACTOR_URL unset; file analysis will fail");
    }
    let renderer = HttpPdfRenderer::from_config(&config.documents)?;

    Ok(AnalysisState {
        analysis: Arc::new(analysis),
        extractor: Arc::new(extractor),
        reports: Arc::new(ReportService::new(ReportWriter::new(model), Arc::new(renderer))),
        street_view: Arc::new(street_view),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_deals::workflows::analysis::ResponsePayload;

    fn record(email: &str) -> HistoryRecord {
        HistoryRecord::new(
            Some(email.to_string()),
            "homes in Austin".to_string(),
            ResponsePayload::ask_again(),
        )
    }

    #[test]
    fn update_requires_an_existing_record() {
        let store = InMemoryHistoryStore::default();
        let err = store.update(record("ana@example.com")).expect_err("missing");
        assert!(matches!(err, HistoryError::NotFound(_)));
    }

    #[test]
    fn records_are_listed_per_email() {
        let store = InMemoryHistoryStore::default();
        let saved = store.save(record("ana@example.com")).expect("saved");
        store.save(record("li@example.com")).expect("saved");

        let listed = store.list_by_email("ana@example.com").expect("listed");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, saved.id);
        assert_eq!(store.fetch(&saved.id).expect("fetched"), Some(saved));
    }
}
