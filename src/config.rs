use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    // Provider
    pub provider_api_key: String,
    pub provider_api_url: String,
    pub provider_model: String,
    pub max_output_tokens: u32,
    pub request_timeout: Duration,

    // Dispatch
    pub max_concurrent_requests: usize,
    pub batch_budget_units: usize,
    pub max_attempts: u32,

    // Cost accounting ($ per million tokens)
    pub input_price_per_mtok: f64,
    pub output_price_per_mtok: f64,

    // State files
    pub state_dir: PathBuf,
    pub projects_file: PathBuf,
    pub glossary_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            // Provider - OpenAI-compatible chat completions endpoint
            provider_api_key: std::env::var("PROVIDER_API_KEY")
                .context("PROVIDER_API_KEY not set")?,
            provider_api_url: std::env::var("PROVIDER_API_URL")
                .unwrap_or_else(|_| "https://api.x.ai/v1/chat/completions".to_string()),
            provider_model: std::env::var("PROVIDER_MODEL")
                .unwrap_or_else(|_| "grok-4-fast-non-reasoning".to_string()),
            max_output_tokens: std::env::var("MAX_OUTPUT_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16_000),
            request_timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),

            // Dispatch
            max_concurrent_requests: std::env::var("MAX_CONCURRENT_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            batch_budget_units: std::env::var("BATCH_BUDGET_UNITS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(18_000),
            max_attempts: std::env::var("MAX_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),

            // Cost accounting
            input_price_per_mtok: std::env::var("INPUT_PRICE_PER_MTOK")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.20),
            output_price_per_mtok: std::env::var("OUTPUT_PRICE_PER_MTOK")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.50),

            // State files
            state_dir: std::env::var("STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("state")),
            projects_file: std::env::var("PROJECTS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/i18n-projects.json")),
            glossary_file: std::env::var("GLOSSARY_FILE").ok().map(PathBuf::from),
        })
    }
}
