//! LLM API HTTP client
//!
//! Supports both Claude API and OpenAI-compatible APIs (GLM, etc.). The
//! `ModelClient` trait is the seam the delegation core depends on; the
//! HTTP implementation lives behind it so tests can script responses.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::{Config, LlmProvider};
use crate::error::{Error, Result};

use super::types::*;

/// Request/response interface to a language model.
///
/// A client is bound to one target model and one token budget. Dedicated
/// clients may be constructed for delegations that resolve to a different
/// model than the caller's default.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send a messages request and await the full response.
    async fn complete(&self, request: MessagesRequest) -> Result<MessagesResponse>;

    /// The model this client is bound to.
    fn model(&self) -> &str;

    /// The token budget this client is bound to.
    fn max_tokens(&self) -> u64;
}

/// HTTP-backed LLM client
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u64,
    base_url: String,
    provider: LlmProvider,
}

impl LlmClient {
    /// Create a client bound to the configured default model and budget.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_model(config, config.llm.model.clone(), config.llm.max_tokens)
    }

    /// Create a client bound to a specific model and token budget.
    pub fn with_model(config: &Config, model: String, max_tokens: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(Error::Http)?;

        let base_url = match &config.llm.base_url {
            Some(url) => url.clone(),
            None => match config.llm.provider {
                LlmProvider::Claude => "https://api.anthropic.com/v1".to_string(),
                LlmProvider::OpenAi => "https://api.openai.com/v1".to_string(),
            },
        };

        Ok(Self {
            client,
            api_key: config.llm.api_key.clone(),
            model,
            max_tokens,
            base_url,
            provider: config.llm.provider.clone(),
        })
    }

    /// Override the base URL (for testing or custom endpoints)
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn send_claude_request(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        let url = format!("{}/messages", self.base_url);

        debug!("Sending request to Claude API: {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;

        if !status.is_success() {
            warn!("Claude API error: {} - {}", status, body);
            return Err(Error::LlmApi(format!("{}: {}", status, body)));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| Error::LlmApi(format!("Failed to parse response: {} - {}", e, body)))?;

        info!(
            "Claude API response: stop_reason={:?}, tokens={}",
            parsed.stop_reason,
            parsed.usage.as_ref().map(|u| u.output_tokens).unwrap_or(0)
        );

        Ok(parsed)
    }

    async fn send_openai_request(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!("Sending request to OpenAI-compatible API: {}", url);

        let openai_request = ChatCompletionRequest::from_claude_request(&request);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&openai_request)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;

        if !status.is_success() {
            warn!("OpenAI API error: {} - {}", status, body);
            return Err(Error::LlmApi(format!("{}: {}", status, body)));
        }

        let openai_response: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| Error::LlmApi(format!("Failed to parse response: {} - {}", e, body)))?;

        Ok(openai_response.to_claude_response())
    }
}

#[async_trait]
impl ModelClient for LlmClient {
    async fn complete(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        match self.provider {
            LlmProvider::Claude => self.send_claude_request(request).await,
            LlmProvider::OpenAi => self.send_openai_request(request).await,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> u64 {
        self.max_tokens
    }
}
