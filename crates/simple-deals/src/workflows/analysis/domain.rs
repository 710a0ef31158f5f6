use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workflows::search::domain::ListingRecord;

/// Coarse category a question is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Listing,
    Analysis,
}

impl Intent {
    /// Map a model label onto an intent. Matching is case-insensitive and ignores surrounding
    /// whitespace and trailing punctuation.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label
            .trim()
            .trim_end_matches(|c: char| c == '.' || c == '!')
            .to_ascii_lowercase();
        match label.as_str() {
            "listing" => Some(Intent::Listing),
            "analysis" => Some(Intent::Analysis),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Intent::Listing => "listing",
            Intent::Analysis => "analysis",
        }
    }
}

/// One incoming question plus the conversational context it arrived with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    #[serde(rename = "userInput", default)]
    pub raw_text: String,
    #[serde(rename = "lastQuestion", default, skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<String>,
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserQuery {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            ..Self::default()
        }
    }

    pub fn with_pending_question(mut self, question: impl Into<String>) -> Self {
        self.pending_question = Some(question.into());
        self
    }

    /// Pending question, ignoring blank values clients send for "none".
    pub fn pending(&self) -> Option<&str> {
        self.pending_question
            .as_deref()
            .map(str::trim)
            .filter(|question| !question.is_empty())
    }
}

/// Value of the `type` field in a response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadKind {
    Listing,
    Analysis,
    NoMessage,
}

impl From<Intent> for PayloadKind {
    fn from(intent: Intent) -> Self {
        match intent {
            Intent::Listing => PayloadKind::Listing,
            Intent::Analysis => PayloadKind::Analysis,
        }
    }
}

pub const ASK_AGAIN_MESSAGE: &str = "Then ask a question again!";

/// Terminal artifact returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ListingRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_view: Option<bool>,
}

impl ResponsePayload {
    /// Fixed reply when the user declines a pending follow-up question.
    pub fn ask_again() -> Self {
        Self {
            kind: PayloadKind::NoMessage,
            description: ASK_AGAIN_MESSAGE.to_string(),
            results: None,
            card_view: None,
        }
    }
}

/// Steps of the orchestration pipeline, used to attribute failures in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    Start,
    AffirmationCheck,
    Classify,
    Structure,
    FetchData,
    Summarize,
    Persist,
    Done,
}

impl AnalysisStage {
    pub fn label(self) -> &'static str {
        match self {
            AnalysisStage::Start => "start",
            AnalysisStage::AffirmationCheck => "affirmation_check",
            AnalysisStage::Classify => "classify",
            AnalysisStage::Structure => "structure",
            AnalysisStage::FetchData => "fetch_data",
            AnalysisStage::Summarize => "summarize",
            AnalysisStage::Persist => "persist",
            AnalysisStage::Done => "done",
        }
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
