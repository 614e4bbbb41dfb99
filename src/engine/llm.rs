//! LLM provider used to produce the output that gets governed.
//!
//! The pipeline only needs "send text, receive text". Any failure, including
//! the fixed timeout, degrades to the configured fallback text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::domain::LlmProvenance;
use crate::error::{CollaboratorError, GovernanceError, GovernanceResult};

/// A successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub source: String,
}

/// Text completion collaborator.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider label recorded as provenance.
    fn source(&self) -> &str;

    fn model(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<Completion, CollaboratorError>;
}

/// Request to an OpenRouter-compatible chat completions API.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Chat-completions provider via OpenRouter.
pub struct OpenRouterProvider {
    config: LlmConfig,
    client: Client,
}

impl OpenRouterProvider {
    pub fn new(config: LlmConfig, timeout: Duration) -> GovernanceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GovernanceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn source(&self) -> &str {
        "openrouter"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str) -> Result<Completion, CollaboratorError> {
        if self.config.api_key.is_empty() {
            return Err(CollaboratorError::NotConfigured);
        }

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: Some(1024),
        };

        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(&self.config.api_key)
            .header("X-Title", "Governance Core")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status { status, body });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Malformed(e.to_string()))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CollaboratorError::Malformed("response has no choices".to_string()))?;

        Ok(Completion {
            text,
            model: chat.model.unwrap_or_else(|| self.config.model.clone()),
            source: self.source().to_string(),
        })
    }
}

/// Call the provider with a ceiling, falling back on any failure.
///
/// Returns the text to govern and its provenance. Provenance carries the
/// error when the fallback was used.
pub async fn complete_or_fallback(
    provider: Option<&dyn LlmProvider>,
    prompt: &str,
    timeout: Duration,
    fallback_text: &str,
) -> (String, LlmProvenance) {
    let Some(provider) = provider else {
        return (
            fallback_text.to_string(),
            LlmProvenance {
                source: "fallback".to_string(),
                model: "none".to_string(),
                error: Some(CollaboratorError::NotConfigured.to_string()),
            },
        );
    };

    let result = match tokio::time::timeout(timeout, provider.complete(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(timeout.as_millis() as u64)),
    };

    match result {
        Ok(completion) => (
            completion.text,
            LlmProvenance {
                source: completion.source,
                model: completion.model,
                error: None,
            },
        ),
        Err(e) => {
            tracing::warn!(
                source = provider.source(),
                error = %e,
                "LLM completion failed, governing fallback text"
            );
            (
                fallback_text.to_string(),
                LlmProvenance {
                    source: "fallback".to_string(),
                    model: provider.model().to_string(),
                    error: Some(e.to_string()),
                },
            )
        }
    }
}

#[cfg(test)]
pub(crate) mod stubs {
    use super::*;

    /// Provider returning a fixed answer, or failing, after an optional delay.
    pub struct StubLlm {
        pub answer: Option<String>,
        pub delay: Duration,
    }

    impl StubLlm {
        pub fn answering(text: &str) -> Self {
            Self {
                answer: Some(text.to_string()),
                delay: Duration::ZERO,
            }
        }

        pub fn failing() -> Self {
            Self {
                answer: None,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn source(&self) -> &str {
            "stub"
        }

        fn model(&self) -> &str {
            "stub-model"
        }

        async fn complete(&self, _prompt: &str) -> Result<Completion, CollaboratorError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.answer {
                Some(text) => Ok(Completion {
                    text: text.clone(),
                    model: "stub-model".to_string(),
                    source: "stub".to_string(),
                }),
                None => Err(CollaboratorError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                }),
            }
        }
    }
}
