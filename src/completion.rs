//! Text-completion provider implementations.
//!
//! Concrete [`CompletionProvider`] backends selected by `[llm] provider`:
//! - **[`DisabledCompletion`]**: returns errors; retrieval still works.
//! - **[`OllamaCompletion`]**: `POST /api/generate` with `stream: false`.
//! - **[`OpenAICompletion`]**: `POST /v1/chat/completions` with one user message.
//!
//! Both remote providers share the retry policy in [`crate::http`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use kb_harness_core::completion::CompletionProvider;
use kb_harness_core::error::{HarnessError, Result};

use crate::config::LlmConfig;
use crate::http;

pub struct DisabledCompletion;

#[async_trait]
impl CompletionProvider for DisabledCompletion {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(HarnessError::external(
            "LLM provider is disabled; set [llm] provider in the config",
        ))
    }
}

/// Completion via a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaCompletion {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl OllamaCompletion {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionProvider for OllamaCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let endpoint = format!("{}/api/generate", self.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let service = format!("Ollama at {}", self.url);
        let json = http::send_json_with_retry(&service, self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await?;
        parse_ollama_generate(&json)
    }
}

fn parse_ollama_generate(json: &Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| HarnessError::external("Invalid Ollama response: missing response text"))
}

/// Completion via the OpenAI chat completions API. Requires `OPENAI_API_KEY`.
pub struct OpenAICompletion {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl OpenAICompletion {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key,
            model,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let endpoint = format!("{}/v1/chat/completions", self.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
        });
        let json = http::send_json_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?;
        parse_chat_completion(&json)
    }
}

fn parse_chat_completion(json: &Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            HarnessError::external("Invalid OpenAI response: missing choices[0].message.content")
        })
}

/// Create the configured completion backend.
pub fn create_completion(config: &LlmConfig) -> anyhow::Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompletion)),
        "ollama" => Ok(Arc::new(OllamaCompletion::new(config)?)),
        "openai" => Ok(Arc::new(OpenAICompletion::new(config)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}
