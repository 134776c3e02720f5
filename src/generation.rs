//! Answer generation.
//!
//! A [`Generator`] turns a question, the retrieved context, and the prior
//! conversation into one answer. Providers:
//!
//! - **[`GeminiGenerator`]**: Google Generative Language API
//!   (`models/{model}:generateContent`), key from `GEMINI_API_KEY` or
//!   `GOOGLE_API_KEY`.
//! - **[`OpenAIGenerator`]**: OpenAI-compatible `/chat/completions`, key
//!   from `OPENAI_API_KEY`.
//! - **[`DisabledGenerator`]**: always errors with a fixed reason; used
//!   for ingest-only deployments and when a provider cannot be built.
//!
//! Both remote providers render the same prompt via [`build_prompt`] and
//! retry rate limits and server errors.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::models::{ConversationTurn, RetrievedChunk};
use crate::retry;

/// Everything one answer is generated from.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub question: &'a str,
    pub context: &'a [RetrievedChunk],
    pub history: &'a [ConversationTurn],
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String>;
}

const INSTRUCTIONS: &str = "You are answering questions about a source code repository. \
Use the following pieces of context from the repository to answer the question at the end. \
If the context does not contain the answer, say that you don't know; do not make one up.";

/// Render the single prompt sent to the model.
///
/// Context chunks are labelled with their source path; prior turns appear
/// in order as `Human:` / `Assistant:` pairs before the new question.
pub fn build_prompt(request: &GenerationRequest<'_>) -> String {
    let mut prompt = String::from(INSTRUCTIONS);
    prompt.push_str("\n\n");

    for chunk in request.context {
        prompt.push_str(&format!("--- {} ---\n{}\n\n", chunk.source_path, chunk.text));
    }

    if !request.history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for turn in request.history {
            prompt.push_str(&format!(
                "Human: {}\nAssistant: {}\n",
                turn.question, turn.answer
            ));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Question: {}\nHelpful Answer:", request.question));
    prompt
}

// ============ Gemini ============

pub struct GeminiGenerator {
    model: String,
    temperature: f32,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| {
                anyhow::anyhow!("GEMINI_API_KEY (or GOOGLE_API_KEY) environment variable not set")
            })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: config.url.clone().unwrap_or_else(|| {
                "https://generativelanguage.googleapis.com/v1beta".to_string()
            }),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": build_prompt(request) }]
            }],
            "generationConfig": { "temperature": self.temperature }
        });
        let url = format!("{}/models/{}:generateContent", self.url, self.model);
        let json = retry::post_json(
            &self.client,
            "Gemini",
            &url,
            &body,
            self.max_retries,
            |req| req.header("x-goog-api-key", &self.api_key),
        )
        .await?;
        parse_gemini_response(&json)
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: no candidates"))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        bail!("Invalid Gemini response: empty answer");
    }
    Ok(text)
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    model: String,
    temperature: f32,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": build_prompt(request) }]
        });
        let json = retry::post_json(
            &self.client,
            "OpenAI",
            &format!("{}/chat/completions", self.url),
            &body,
            self.max_retries,
            |req| req.bearer_auth(&self.api_key),
        )
        .await?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}

// ============ Disabled ============

pub struct DisabledGenerator {
    reason: String,
}

impl DisabledGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for DisabledGenerator {
    fn default() -> Self {
        Self::new("Answer generation is disabled. Set [generation] provider in config.")
    }
}

#[async_trait]
impl Generator for DisabledGenerator {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerationRequest<'_>) -> Result<String> {
        bail!("{}", self.reason)
    }
}

/// Create the [`Generator`] named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledGenerator::default())),
        other => bail!("Unknown generation provider: {}", other),
    }
}
