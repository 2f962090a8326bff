use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;

/// Errors surfaced by the LLM provider that callers need to tell apart.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{provider} rate limited the request ({status}): {body}")]
    RateLimited {
        provider: String,
        status: StatusCode,
        body: String,
    },
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: String,
        status: StatusCode,
        body: String,
    },
}

/// True if any error in the chain is a provider rate limit.
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<LlmError>(),
            Some(LlmError::RateLimited { .. })
        )
    })
}

/// Maps a prompt to a reply text. Retries are the caller's business.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatMessage> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            max_tokens: self.config.max_tokens,
        };

        let provider = self.config.provider.to_string();
        let url = format!("{}/chat/completions", self.config.effective_base_url());

        debug!("Sending request to {}: {}", provider, url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", provider))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited {
                provider,
                status,
                body,
            }
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider,
                status,
                body,
            }
            .into());
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", provider))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .with_context(|| format!("No response from {}", provider))
    }
}

#[async_trait]
impl Responder for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let messages = [ChatMessage {
            role: "user".to_string(),
            content: Some(prompt.to_string()),
        }];

        let reply = self.chat(&messages).await?;
        reply
            .content
            .filter(|c| !c.trim().is_empty())
            .context("LLM returned an empty reply")
    }
}
