use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::domain::{AnalysisStage, Intent, ResponsePayload, UserQuery};
use super::history::{HistoryError, HistoryId, HistoryRecord, HistoryStore};
use crate::assistant::affirmation::{Affirmation, AffirmationResolver};
use crate::assistant::classifier::{ClassificationError, IntentClassifier};
use crate::assistant::model::{LanguageModel, ModelError};
use crate::assistant::structurer::{QueryStructurer, StructuringError};
use crate::assistant::summarizer::{NarrativeSummarizer, SummaryError};
use crate::workflows::search::domain::{ListingRecord, StructuredSearch};
use crate::workflows::search::listings::ListingSearch;
use crate::workflows::search::market::{MarketDataGateway, MarketLocation, MarketQuery};
use crate::workflows::search::rapidapi::GatewayError;

pub const INVALID_QUESTION_MESSAGE: &str = "Invalid question type";
pub const NO_PROPERTIES_MESSAGE: &str = "No properties found.";
pub const ANALYSIS_FAILED_MESSAGE: &str = "Failed to analyze property";

/// Sequences the assistant components and gateways for one question.
#[derive(Clone)]
pub struct PropertyAnalysisService {
    affirmation: AffirmationResolver,
    classifier: IntentClassifier,
    structurer: QueryStructurer,
    summarizer: NarrativeSummarizer,
    listings: Arc<dyn ListingSearch>,
    market: MarketDataGateway,
    history: Arc<dyn HistoryStore>,
}

/// Payload returned to the caller plus the history record it was stored under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    #[serde(flatten)]
    pub payload: ResponsePayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<HistoryId>,
}

impl PropertyAnalysisService {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        listings: Arc<dyn ListingSearch>,
        market: MarketDataGateway,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            affirmation: AffirmationResolver::new(model.clone()),
            classifier: IntentClassifier::new(model.clone()),
            structurer: QueryStructurer::new(model.clone()),
            summarizer: NarrativeSummarizer::new(model),
            listings,
            market,
            history,
        }
    }

    pub fn history(&self) -> &dyn HistoryStore {
        self.history.as_ref()
    }

    /// Full pipeline for a conversational question, including follow-up resolution and
    /// persistence.
    pub async fn analyze(&self, query: UserQuery) -> Result<AnalysisOutcome, AnalysisError> {
        debug!(stage = %AnalysisStage::Start, pending = query.pending().is_some(), "analysis started");
        if query.raw_text.trim().is_empty() {
            return Err(AnalysisError::Validation("userInput is required".to_string()));
        }

        let effective_text = match query.pending() {
            Some(pending) => {
                debug!(stage = %AnalysisStage::AffirmationCheck, "resolving reply to pending question");
                let affirmation = self
                    .affirmation
                    .resolve(&query.raw_text)
                    .await
                    .map_err(|err| AnalysisError::delegate(AnalysisStage::AffirmationCheck, err))?;
                match affirmation {
                    Affirmation::Negative => {
                        info!(stage = %AnalysisStage::Done, "follow-up declined");
                        return Ok(AnalysisOutcome {
                            payload: ResponsePayload::ask_again(),
                            id: None,
                        });
                    }
                    Affirmation::Affirmative => pending.to_string(),
                    Affirmation::Unrelated => query.raw_text.clone(),
                }
            }
            None => query.raw_text.clone(),
        };

        let payload = self.answer(&effective_text).await?;

        debug!(stage = %AnalysisStage::Persist, update = query.record_id.is_some(), "persisting answer");
        let record = self
            .persist(&query, effective_text, payload.clone())
            .map_err(|err| AnalysisError::delegate(AnalysisStage::Persist, err))?;

        info!(stage = %AnalysisStage::Done, id = %record.id, kind = ?payload.kind, "analysis complete");
        Ok(AnalysisOutcome {
            payload,
            id: Some(record.id),
        })
    }

    /// Classify, structure, fetch and summarize one question. Nothing is persisted.
    pub async fn answer(&self, text: &str) -> Result<ResponsePayload, AnalysisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AnalysisError::Validation("question text is empty".to_string()));
        }

        debug!(stage = %AnalysisStage::Classify, "classifying question");
        let intent = self
            .classifier
            .classify(text)
            .await
            .map_err(AnalysisError::InvalidQuestionType)?;

        debug!(stage = %AnalysisStage::Structure, intent = intent.label(), "structuring search");
        let search = self
            .structurer
            .structure(text)
            .await
            .map_err(|err| AnalysisError::delegate(AnalysisStage::Structure, err))?;

        debug!(stage = %AnalysisStage::FetchData, intent = intent.label(), "fetching data");
        let (listings, market) = match intent {
            Intent::Listing => (self.search_listings(&search).await?, None),
            Intent::Analysis => {
                let query = MarketQuery {
                    location: MarketLocation::from_search(&search),
                    search_text: text.to_string(),
                };
                let (listings, market) =
                    tokio::join!(self.search_listings(&search), self.market.snapshot(&query));
                (listings?, market)
            }
        };

        if listings.is_empty() {
            info!(intent = intent.label(), "no listings matched");
            return Err(AnalysisError::NoProperties);
        }

        debug!(stage = %AnalysisStage::Summarize, listings = listings.len(), market = market.is_some(), "summarizing");
        let location = search.location_label();
        let narrative = self
            .summarizer
            .summarize(intent, &listings, market.as_ref(), text, location.as_deref())
            .await
            .map_err(|err| AnalysisError::delegate(AnalysisStage::Summarize, err))?;

        Ok(ResponsePayload {
            kind: intent.into(),
            description: narrative.description,
            results: (intent == Intent::Listing).then_some(listings),
            card_view: narrative.card_view,
        })
    }

    /// Structure a question without running the rest of the pipeline.
    pub async fn structure(&self, text: &str) -> Result<StructuredSearch, AnalysisError> {
        self.structurer
            .structure(text)
            .await
            .map_err(|err| AnalysisError::delegate(AnalysisStage::Structure, err))
    }

    async fn search_listings(
        &self,
        search: &StructuredSearch,
    ) -> Result<Vec<ListingRecord>, AnalysisError> {
        self.listings
            .search(search)
            .await
            .map_err(|err| AnalysisError::delegate(AnalysisStage::FetchData, err))
    }

    fn persist(
        &self,
        query: &UserQuery,
        effective_text: String,
        payload: ResponsePayload,
    ) -> Result<HistoryRecord, HistoryError> {
        let Some(raw_id) = query.record_id.as_deref().filter(|id| !id.trim().is_empty()) else {
            return self.history.save(HistoryRecord::new(
                query.email.clone(),
                effective_text,
                payload,
            ));
        };

        let id = HistoryId(raw_id.trim().to_string());
        let mut record = self
            .history
            .fetch(&id)?
            .ok_or_else(|| HistoryError::NotFound(id.clone()))?;
        record.query = effective_text;
        record.payload = payload;
        record.updated_at = Utc::now();
        if query.email.is_some() {
            record.email = query.email.clone();
        }
        self.history.update(record)
    }
}

/// Failure of a collaborator the orchestrator delegated to.
#[derive(Debug, thiserror::Error)]
pub enum DelegateError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Structuring(#[from] StructuringError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
    #[error(transparent)]
    History(#[from] HistoryError),
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Validation(String),
    #[error("question could not be classified: {0}")]
    InvalidQuestionType(#[source] ClassificationError),
    #[error("no properties matched the search")]
    NoProperties,
    #[error("{stage} stage failed: {source}")]
    Delegate {
        stage: AnalysisStage,
        #[source]
        source: DelegateError,
    },
}

impl AnalysisError {
    pub fn delegate(stage: AnalysisStage, source: impl Into<DelegateError>) -> Self {
        Self::Delegate {
            stage,
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AnalysisError::Validation(_) | AnalysisError::InvalidQuestionType(_) => {
                StatusCode::BAD_REQUEST
            }
            AnalysisError::NoProperties => StatusCode::NOT_FOUND,
            AnalysisError::Delegate { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn stage(&self) -> Option<AnalysisStage> {
        match self {
            AnalysisError::Delegate { stage, .. } => Some(*stage),
            AnalysisError::InvalidQuestionType(_) => Some(AnalysisStage::Classify),
            AnalysisError::NoProperties => Some(AnalysisStage::FetchData),
            AnalysisError::Validation(_) => None,
        }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AnalysisError::Validation(message) => json!({ "message": message }),
            AnalysisError::InvalidQuestionType(cause) => {
                warn!(error = %cause, "question rejected");
                json!({ "message": INVALID_QUESTION_MESSAGE })
            }
            AnalysisError::NoProperties => json!({ "message": NO_PROPERTIES_MESSAGE }),
            AnalysisError::Delegate { stage, source } => {
                error!(%stage, error = %source, "analysis failed");
                json!({ "error": ANALYSIS_FAILED_MESSAGE })
            }
        };
        (status, Json(body)).into_response()
    }
}
