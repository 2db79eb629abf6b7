//! HTTP-backed model providers.
//!
//! Two wire formats are supported behind the same [`LlmClient`] seam: the
//! Ollama generate endpoint for local models and the OpenAI-compatible chat
//! completions endpoint for hosted ones. Which one runs is a configuration
//! choice; nothing upstream can tell them apart.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use tabletalk_core::config::{LlmConfig, LlmProvider};

use crate::llm::LlmClient;

const RETRY_BACKOFF: Duration = Duration::from_millis(250);
/// All calls translate or classify; nothing here wants creative sampling.
const TEMPERATURE: f64 = 0.0;
const MAX_COMPLETION_TOKENS: u32 = 512;
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Builds the provider named by the configuration.
pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider {
        LlmProvider::Ollama => Ok(Arc::new(OllamaClient::new(config)?)),
        LlmProvider::OpenAi => Ok(Arc::new(OpenAiClient::new(config)?)),
    }
}

/// Client for a local Ollama daemon.
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| anyhow!("ollama provider requires llm.base_url"))?;
        Ok(Self {
            http: http_client(config.timeout_secs)?,
            base_url,
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, prompt: &str) -> Result<String> {
        let url = join_url(&self.base_url, "/api/generate");
        let body = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: TEMPERATURE,
                num_predict: MAX_COMPLETION_TOKENS,
            },
        };
        let response = self.http.post(&url).json(&body).send().await.map_err(|error| {
            error!(error = %error, url = %url, "ollama request failed");
            anyhow!("ollama request failed: {error}")
        })?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("ollama returned {status}: {detail}"));
        }
        let parsed: OllamaResponse = response
            .json()
            .await
            .context("ollama response was not valid JSON")?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        retry(self.max_retries, "ollama", || self.request(prompt)).await
    }
}

/// Client for the OpenAI chat completions API or anything that speaks it.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("openai provider requires llm.api_key"))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
        Ok(Self {
            http: http_client(config.timeout_secs)?,
            base_url,
            api_key,
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, prompt: &str) -> Result<String> {
        let url = join_url(&self.base_url, "/v1/chat/completions");
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_COMPLETION_TOKENS,
        };
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                error!(error = %error, url = %url, "openai request failed");
                anyhow!("openai request failed: {error}")
            })?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("openai returned {status}: {detail}"));
        }
        let mut parsed: ChatResponse = response
            .json()
            .await
            .context("openai response was not valid JSON")?;
        if parsed.choices.is_empty() {
            return Err(anyhow!("openai returned no choices"));
        }
        Ok(parsed.choices.remove(0).message.content)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        retry(self.max_retries, "openai", || self.request(prompt)).await
    }
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .context("could not build the provider HTTP client")
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

/// Runs `attempt` up to `1 + max_retries` times with a flat backoff between
/// rounds. Every failure is transient from this layer's point of view; the
/// caller decides what a final error means.
async fn retry<F, Fut>(max_retries: u32, provider: &'static str, attempt: F) -> Result<String>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut last_error = None;
    for round in 0..=max_retries {
        if round > 0 {
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
        match attempt().await {
            Ok(reply) => return Ok(reply),
            Err(error) => {
                warn!(provider, round, error = %error, "completion attempt failed");
                last_error = Some(error);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("{provider} completion never ran")))
}
