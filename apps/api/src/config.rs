use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::llm_client::{ModelConfig, Provider, DEFAULT_TEMPERATURE};
use crate::screening::request::ModelOverride;
use crate::stages::invoker::RetryPolicy;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub uploads_dir: String,
    /// Request body cap for JSON (base64 documents) and multipart uploads.
    pub max_body_bytes: usize,
    pub llm: LlmSettings,
    pub screening: ScreeningSettings,
}

/// Provider credentials and defaults. Requests may pick a different
/// configured provider; see `resolve`.
#[derive(Clone)]
pub struct LlmSettings {
    pub default_provider: Provider,
    pub default_model: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("LlmSettings")
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmSettings {
    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
            Provider::OpenAi => self.openai_api_key.as_deref(),
            Provider::Gemini => self.gemini_api_key.as_deref(),
        }
    }

    /// Builds the model configuration for one request. The error is a
    /// client-facing message.
    pub fn resolve(&self, requested: Option<&ModelOverride>) -> Result<ModelConfig, String> {
        let provider = requested.map_or(self.default_provider, |m| m.provider);
        let requested_model = requested
            .and_then(|m| m.model_name.as_deref())
            .map(str::trim)
            .filter(|m| !m.is_empty());

        let model = match requested_model {
            Some(name) => name.to_string(),
            None if provider == self.default_provider => self
                .default_model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string()),
            None => provider.default_model().to_string(),
        };

        let api_key = self
            .api_key(provider)
            .ok_or_else(|| format!("LLM provider '{provider}' is not configured on this server"))?;

        Ok(ModelConfig {
            provider,
            model,
            api_key: Some(api_key.to_string()),
            base_url: match provider {
                Provider::OpenAi => self.openai_base_url.clone(),
                Provider::Anthropic | Provider::Gemini => None,
            },
            temperature: DEFAULT_TEMPERATURE,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScreeningSettings {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub concurrency: usize,
    pub request_timeout: Duration,
}

impl ScreeningSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.backoff,
            ..RetryPolicy::default()
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let llm = LlmSettings {
            default_provider: parse_env("LLM_PROVIDER", Provider::Anthropic)?,
            default_model: optional_env("LLM_MODEL"),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            openai_api_key: optional_env("OPENAI_API_KEY"),
            openai_base_url: optional_env("OPENAI_BASE_URL"),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            timeout: Duration::from_secs(parse_env("LLM_TIMEOUT_SECS", 120u64)?),
        };
        if llm.api_key(llm.default_provider).is_none() {
            bail!(
                "No API key configured for default LLM provider '{}'",
                llm.default_provider
            );
        }

        let concurrency: usize = parse_env("SCREENING_CONCURRENCY", 4)?;
        if concurrency == 0 {
            bail!("SCREENING_CONCURRENCY must be at least 1");
        }

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            uploads_dir: optional_env("UPLOADS_DIR").unwrap_or_else(|| "uploads".to_string()),
            max_body_bytes: parse_env("MAX_BODY_BYTES", 25 * 1024 * 1024)?,
            llm,
            screening: ScreeningSettings {
                max_attempts: parse_env("STAGE_MAX_ATTEMPTS", 3)?,
                backoff: Duration::from_millis(parse_env("STAGE_BACKOFF_MS", 1000)?),
                concurrency,
                request_timeout: Duration::from_secs(parse_env(
                    "SCREENING_REQUEST_TIMEOUT_SECS",
                    600,
                )?),
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}
