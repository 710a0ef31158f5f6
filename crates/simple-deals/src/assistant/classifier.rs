use std::sync::Arc;

use tracing::debug;

use super::model::{LanguageModel, ModelError};
use super::prompts::PromptTemplate;
use crate::workflows::analysis::domain::Intent;

#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("nothing to classify")]
    EmptyInput,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("model answered with an unknown label '{0}'")]
    UnknownLabel(String),
}

/// Routes a question to the listing or analysis branch.
#[derive(Clone)]
pub struct IntentClassifier {
    model: Arc<dyn LanguageModel>,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn classify(&self, text: &str) -> Result<Intent, ClassificationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClassificationError::EmptyInput);
        }

        let messages = PromptTemplate::ClassifyIntent.messages(text, &[]);
        let label = self.model.complete(messages).await?;
        let intent =
            Intent::from_label(&label).ok_or_else(|| ClassificationError::UnknownLabel(label))?;

        debug!(intent = intent.label(), "question classified");
        Ok(intent)
    }
}
