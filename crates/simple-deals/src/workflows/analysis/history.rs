use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::ResponsePayload;

/// Identifier of a stored conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryId(pub String);

impl fmt::Display for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static HISTORY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub fn next_history_id() -> HistoryId {
    let id = HISTORY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    HistoryId(format!("hist-{id:06}"))
}

/// A question and the payload that answered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: HistoryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub query: String,
    pub payload: ResponsePayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(email: Option<String>, query: String, payload: ResponsePayload) -> Self {
        let now = Utc::now();
        Self {
            id: next_history_id(),
            email,
            query,
            payload,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persistence collaborator for answered questions.
pub trait HistoryStore: Send + Sync {
    fn save(&self, record: HistoryRecord) -> Result<HistoryRecord, HistoryError>;
    fn update(&self, record: HistoryRecord) -> Result<HistoryRecord, HistoryError>;
    fn fetch(&self, id: &HistoryId) -> Result<Option<HistoryRecord>, HistoryError>;
    /// Newest first.
    fn list_by_email(&self, email: &str) -> Result<Vec<HistoryRecord>, HistoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history record {0} not found")]
    NotFound(HistoryId),
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}
