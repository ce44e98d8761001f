//! Generative answer backends.
//!
//! A [`GenerativeBackend`] turns a grounded prompt into a single text
//! completion. Two hosted APIs are supported over blocking HTTP:
//!
//! | Provider    | Endpoint                    | Credential (default env var) |
//! |-------------|-----------------------------|------------------------------|
//! | `openai`    | `/v1/chat/completions`      | `OPENAI_API_KEY`             |
//! | `anthropic` | `/v1/messages`              | `ANTHROPIC_API_KEY`          |
//!
//! Backends are optional. [`create_backend`] returns `None` when generation
//! is disabled or the credential is absent, and the answer composer then
//! uses its extractive fallback.

use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GenerationConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One completion request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Produces a text completion for a grounded prompt.
pub trait GenerativeBackend {
    fn name(&self) -> &str;

    fn complete(&self, request: &CompletionRequest<'_>) -> anyhow::Result<String>;
}

/// Build the configured backend, or `None` when generation is unavailable.
///
/// A missing credential is not an error.
pub fn create_backend(config: &GenerationConfig) -> Option<Box<dyn GenerativeBackend>> {
    if !config.is_enabled() {
        debug!("generation disabled");
        return None;
    }

    let var = config.api_key_var();
    let api_key = match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            debug!(var, "no credential for generative backend");
            return None;
        }
    };

    let backend: anyhow::Result<Box<dyn GenerativeBackend>> = match config.provider.as_str() {
        "openai" => OpenAiBackend::new(api_key, config)
            .map(|b| Box::new(b) as Box<dyn GenerativeBackend>),
        "anthropic" => AnthropicBackend::new(api_key, config)
            .map(|b| Box::new(b) as Box<dyn GenerativeBackend>),
        other => Err(anyhow::anyhow!("unknown generation provider: {}", other)),
    };

    match backend {
        Ok(b) => Some(b),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "generative backend unavailable");
            None
        }
    }
}

fn http_client(timeout_secs: u64, label: &str) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .with_context(|| format!("failed to build {} HTTP client", label))
}

fn base_url(config: &GenerationConfig, default: &str) -> String {
    config
        .base_url
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

// ============ OpenAI ============

pub struct OpenAiBackend {
    api_key: String,
    model: String,
    url: String,
    client: Client,
}

impl OpenAiBackend {
    pub fn new(api_key: String, config: &GenerationConfig) -> anyhow::Result<Self> {
        Ok(Self {
            api_key,
            model: config.model.clone(),
            url: format!(
                "{}/v1/chat/completions",
                base_url(config, OPENAI_BASE_URL)
            ),
            client: http_client(config.timeout_secs, "OpenAI")?,
        })
    }
}

impl GenerativeBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn complete(&self, request: &CompletionRequest<'_>) -> anyhow::Result<String> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt,
                },
            ],
        };

        let resp = self
            .client
            .post(&self.url)
            .headers(headers)
            .json(&body)
            .send()
            .context("failed to call OpenAI chat completions")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("OpenAI returned {}: {}", status, text);
        }
        let parsed: ChatResponse = resp.json().context("failed to parse OpenAI response")?;
        parse_chat_response(parsed)
    }
}

fn parse_chat_response(resp: ChatResponse) -> anyhow::Result<String> {
    resp.choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .context("OpenAI response missing message content")
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

// ============ Anthropic ============

pub struct AnthropicBackend {
    api_key: String,
    model: String,
    url: String,
    client: Client,
}

impl AnthropicBackend {
    pub fn new(api_key: String, config: &GenerationConfig) -> anyhow::Result<Self> {
        Ok(Self {
            api_key,
            model: config.model.clone(),
            url: format!("{}/v1/messages", base_url(config, ANTHROPIC_BASE_URL)),
            client: http_client(config.timeout_secs, "Anthropic")?,
        })
    }
}

impl GenerativeBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn complete(&self, request: &CompletionRequest<'_>) -> anyhow::Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(self.api_key.trim()).context("invalid Anthropic API key")?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: vec![AnthropicContentBlock {
                    kind: "text",
                    text: request.prompt,
                }],
            }],
        };

        let resp = self
            .client
            .post(&self.url)
            .headers(headers)
            .json(&body)
            .send()
            .context("failed to call Anthropic messages API")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Anthropic returned {}: {}", status, text);
        }
        let parsed: AnthropicResponse =
            resp.json().context("failed to parse Anthropic response")?;
        parse_anthropic_response(parsed)
    }
}

fn parse_anthropic_response(resp: AnthropicResponse) -> anyhow::Result<String> {
    let answer = resp
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicResponseBlock::Text { text } => Some(text),
            AnthropicResponseBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    if answer.is_empty() {
        bail!("Anthropic response missing text content");
    }
    Ok(answer)
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<AnthropicContentBlock<'a>>,
}

#[derive(Serialize)]
struct AnthropicContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}
