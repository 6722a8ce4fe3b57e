//! The translation provider boundary.
//!
//! The provider is an opaque function `(payload, locale) -> structured
//! result | failure` reached over an OpenAI-compatible chat-completions API.
//! Its output is raw text that *should* contain one JSON object but arrives
//! fenced, wrapped in prose, or with near-miss syntax often enough that
//! parsing is defensive throughout. Reported token usage feeds cost
//! accounting only, never control flow.

use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;
use crate::retry::RetryDecision;

/// Failure taxonomy for a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("rate limited by provider (HTTP 429)")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("malformed provider output: {0}")]
    MalformedOutput(String),

    #[error("provider rejected the request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

impl ProviderError {
    /// How the dispatcher's retry loop should treat this failure.
    pub fn retry_decision(&self) -> RetryDecision {
        match self {
            ProviderError::Transport(_)
            | ProviderError::Timeout
            | ProviderError::MalformedOutput(_) => RetryDecision::Retry,
            ProviderError::RateLimited => RetryDecision::RetryAfter(Duration::from_secs(15)),
            ProviderError::Rejected { .. } => RetryDecision::Stop,
        }
    }
}

/// Provider-reported token usage for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Per-million-token prices, used only for operator-facing cost logs.
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl CostModel {
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 / 1_000_000.0) * self.input_per_mtok
            + (usage.output_tokens as f64 / 1_000_000.0) * self.output_per_mtok
    }
}

/// One translation request: a payload tree bound for one locale.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// BCP 47 tag, e.g. `it-IT`.
    pub locale: String,
    /// English display name the instruction refers to, e.g. `Italian`.
    pub language: String,
    /// Filtered sub-tree to translate.
    pub payload: Value,
    /// Preferred term translations injected into the instruction.
    pub glossary: Vec<(String, String)>,
}

/// Parsed provider output.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub tree: Value,
    pub usage: Option<TokenUsage>,
}

/// The seam the dispatcher depends on; the HTTP client below is the
/// production implementation, tests substitute their own.
pub trait TranslationProvider: Send + Sync {
    fn translate(&self, request: ProviderRequest)
        -> BoxFuture<'_, Result<ProviderReply, ProviderError>>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

/// Build the instruction sent alongside the payload. The structure
/// requirements matter more than the wording: the provider must return the
/// same object shape with only string values replaced.
fn build_instruction(request: &ProviderRequest) -> String {
    let mut instruction = format!(
        r#"Translate every English text string in the JSON below to {} ({}).

Rules:
- Return ONLY one JSON object with the EXACT same structure and keys.
- Keep all keys, numbers, booleans, and null values unchanged.
- Do not add, remove, or rename any field.
- Do not wrap the object in any other field or add comments."#,
        request.language, request.locale
    );

    if !request.glossary.is_empty() {
        instruction.push_str("\n\nGlossary:");
        for (term, preferred) in &request.glossary {
            instruction.push_str(&format!("\n\"{}\" -> \"{}\"", term, preferred));
        }
    }

    instruction.push_str("\n\nJSON:\n");
    instruction.push_str(&serde_json::to_string(&request.payload).unwrap_or_default());
    instruction
}

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
pub struct HttpProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_output_tokens: u32,
}

impl HttpProvider {
    pub fn new(config: &Config) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.provider_api_url.clone(),
            api_key: config.provider_api_key.clone(),
            model: config.provider_model.clone(),
            max_output_tokens: config.max_output_tokens,
        })
    }

    async fn call(&self, request: ProviderRequest) -> Result<ProviderReply, ProviderError> {
        let chat_request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: build_instruction(&request),
            }],
            max_tokens: self.max_output_tokens,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => ProviderError::RateLimited,
                s if s >= 500 => ProviderError::Transport(format!("HTTP {}: {}", s, body)),
                s => ProviderError::Rejected { status: s, body },
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedOutput(e.to_string()))?;

        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError::MalformedOutput("response contained no choices".into()))?;

        let tree = extract_json_object(&content)?;
        let usage = chat_response.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderReply { tree, usage })
    }
}

impl TranslationProvider for HttpProvider {
    fn translate(
        &self,
        request: ProviderRequest,
    ) -> BoxFuture<'_, Result<ProviderReply, ProviderError>> {
        Box::pin(self.call(request))
    }
}

/// Recover the outermost JSON object from raw model output.
///
/// Tolerates markdown fences and prose before/after the object, and repairs
/// trailing commas on a second parse attempt. Anything else is
/// [`ProviderError::MalformedOutput`].
pub fn extract_json_object(raw: &str) -> Result<Value, ProviderError> {
    let fence = Regex::new(r"```(?:json)?").expect("static regex");
    let content = fence.replace_all(raw, "");
    let content = content.trim();

    let start = content
        .find('{')
        .ok_or_else(|| ProviderError::MalformedOutput("no JSON object in output".into()))?;

    let end = balanced_object_end(&content[start..])
        .map(|offset| start + offset)
        .ok_or_else(|| ProviderError::MalformedOutput("unbalanced JSON object".into()))?;

    let candidate = &content[start..end];
    match serde_json::from_str(candidate) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            // Near-miss repair: trailing commas before a closing bracket.
            let trailing_comma = Regex::new(r",\s*([}\]])").expect("static regex");
            let repaired = trailing_comma.replace_all(candidate, "$1");
            serde_json::from_str(&repaired)
                .map_err(|_| ProviderError::MalformedOutput(first_error.to_string()))
        }
    }
}

/// Byte offset one past the brace closing the object that starts at byte 0.
/// String-aware, so braces inside values do not confuse the scan.
fn balanced_object_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
