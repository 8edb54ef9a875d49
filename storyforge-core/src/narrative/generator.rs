//! Text generation backend contract and the Claude implementation.

use async_trait::async_trait;
use claude::{Claude, Message, Request};
use std::time::Duration;
use thiserror::Error;

/// Errors from a generation backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("Generation request rejected: {0}")]
    Rejected(String),

    #[error("Generation returned no text")]
    Empty,

    #[error("Generation failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<GenerationError>,
    },
}

impl GenerationError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::Timeout(_) | GenerationError::Unavailable(_) | GenerationError::Empty
        )
    }
}

impl From<claude::Error> for GenerationError {
    fn from(err: claude::Error) -> Self {
        match err {
            claude::Error::Network(msg) => GenerationError::Unavailable(msg),
            claude::Error::Api { status, message } if status == 429 || status >= 500 => {
                GenerationError::Unavailable(format!("status {status}: {message}"))
            }
            claude::Error::Api { status, message } => {
                GenerationError::Rejected(format!("status {status}: {message}"))
            }
            other => GenerationError::Rejected(other.to_string()),
        }
    }
}

/// One fully built generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Voice instructions.
    pub system: String,
    /// Story context and the task.
    pub prompt: String,
    pub persona_id: String,
    pub target_words: usize,
    pub max_tokens: usize,
    pub temperature: Option<f32>,
}

/// Something that turns a request into story text.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Generator backed by the Claude Messages API.
#[derive(Clone)]
pub struct ClaudeGenerator {
    client: Claude,
    model: Option<String>,
}

impl ClaudeGenerator {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            model: None,
        }
    }

    /// Build from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, GenerationError> {
        Ok(Self::new(Claude::from_env()?))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
impl NarrativeGenerator for ClaudeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut api_request = Request::new(vec![Message::user(&request.prompt)])
            .with_system(&request.system)
            .with_max_tokens(request.max_tokens);
        if let Some(ref model) = self.model {
            api_request = api_request.with_model(model);
        }
        if let Some(temperature) = request.temperature {
            api_request = api_request.with_temperature(temperature);
        }

        let response = self.client.complete(api_request).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claude_errors_map_to_retryability() {
        let network: GenerationError = claude::Error::Network("reset".into()).into();
        assert!(network.is_retryable());

        let overloaded: GenerationError = claude::Error::Api {
            status: 529,
            message: "overloaded".into(),
        }
        .into();
        assert!(overloaded.is_retryable());

        let bad_request: GenerationError = claude::Error::Api {
            status: 400,
            message: "bad".into(),
        }
        .into();
        assert!(!bad_request.is_retryable());

        let no_key: GenerationError = claude::Error::NoApiKey.into();
        assert!(!no_key.is_retryable());
    }
}
