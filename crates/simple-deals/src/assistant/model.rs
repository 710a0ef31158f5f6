use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ConfigError, ModelConfig};

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("completion request failed: {0}")]
    Network(String),
    #[error("completion endpoint returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("completion response could not be decoded: {0}")]
    Decode(String),
    #[error("completion response carried no content")]
    Empty,
}

/// The language-model collaborator. One call, one text completion, no retries.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ModelError>;
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Chat-completions client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiChatModel {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiChatModel {
    pub fn from_config(config: &ModelConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ConfigError::MissingSecret("OPENAI_API_KEY"))?;
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|_| ConfigError::InvalidValue {
                name: "HTTP_TIMEOUT_SECS",
                value: format!("{:?}", config.request_timeout),
            })?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ModelError> {
        let body = CompletionBody {
            model: &self.model,
            messages: &messages,
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ModelError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let decoded: CompletionResponse = response
            .json()
            .await
            .map_err(|err| ModelError::Decode(err.to_string()))?;

        let content = decoded
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(ModelError::Empty)?;

        debug!(model = %self.model, chars = content.len(), "completion received");
        Ok(content)
    }
}

/// Remove markdown code fences (```json ... ```) a model wraps around structured output.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "")
        .replace("```html", "")
        .replace("```", "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_json() {
        let raw = "```json\n{\"state\": \"TX\"}\n```";
        assert_eq!(strip_code_fences(raw), "{\"state\": \"TX\"}");
    }

    #[test]
    fn completion_body_serializes_lowercase_roles() {
        let messages = vec![ChatMessage::system("rules"), ChatMessage::user("hi")];
        let body = CompletionBody {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 0.0,
        };
        let json = serde_json::to_value(&body).expect("serializes");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["model"], "gpt-4o-mini");
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = ModelConfig {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            request_timeout: std::time::Duration::from_secs(5),
        };
        let err = OpenAiChatModel::from_config(&config).expect_err("key required");
        assert!(matches!(err, ConfigError::MissingSecret("OPENAI_API_KEY")));
    }
}
