use std::sync::Arc;

use super::model::{LanguageModel, ModelError};
use super::prompts::PromptTemplate;

/// How a reply relates to the follow-up question the assistant asked last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affirmation {
    Affirmative,
    Negative,
    Unrelated,
}

impl Affirmation {
    /// Only the literal tokens `true` and `false` count, compared exactly after trimming
    /// whitespace; anything else is unrelated.
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "true" => Affirmation::Affirmative,
            "false" => Affirmation::Negative,
            _ => Affirmation::Unrelated,
        }
    }
}

#[derive(Clone)]
pub struct AffirmationResolver {
    model: Arc<dyn LanguageModel>,
}

impl AffirmationResolver {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn resolve(&self, reply: &str) -> Result<Affirmation, ModelError> {
        let messages = PromptTemplate::ResolveAffirmation.messages(reply, &[("input", reply)]);
        let token = self.model.complete(messages).await?;
        Ok(Affirmation::from_token(&token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_literal_tokens_resolve() {
        assert_eq!(Affirmation::from_token("true"), Affirmation::Affirmative);
        assert_eq!(Affirmation::from_token(" false\n"), Affirmation::Negative);
        assert_eq!(Affirmation::from_token("True"), Affirmation::Unrelated);
        assert_eq!(Affirmation::from_token("FALSE"), Affirmation::Unrelated);
        assert_eq!(Affirmation::from_token("null"), Affirmation::Unrelated);
        assert_eq!(Affirmation::from_token("yes"), Affirmation::Unrelated);
        assert_eq!(Affirmation::from_token("true."), Affirmation::Unrelated);
    }
}
