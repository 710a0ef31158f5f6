//! Question analysis: follow-up resolution, intent routing, data fetching, narration and
//! history, plus the HTTP surface that exposes it.

pub mod domain;
pub mod history;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    AnalysisStage, Intent, PayloadKind, ResponsePayload, UserQuery, ASK_AGAIN_MESSAGE,
};
pub use history::{next_history_id, HistoryError, HistoryId, HistoryRecord, HistoryStore};
pub use router::{analysis_router, AnalysisState};
pub use service::{
    AnalysisError, AnalysisOutcome, DelegateError, PropertyAnalysisService,
    ANALYSIS_FAILED_MESSAGE, INVALID_QUESTION_MESSAGE, NO_PROPERTIES_MESSAGE,
};
