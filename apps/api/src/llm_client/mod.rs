/// LLM Client: the single point of entry for all model calls in the screener.
///
/// ARCHITECTURAL RULE: No other module may call a provider API directly.
/// All LLM interactions MUST go through this module.
///
/// The client performs exactly one HTTP attempt per call. Retry, backoff and
/// timeouts are owned by `stages::invoker::StageInvoker` so that every stage
/// shares one explicit policy.
use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_TOKENS: u32 = 4096;

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("No API key configured for provider {0}")]
    MissingApiKey(Provider),
}

impl LlmError {
    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Rate limits, 5xx, transport failures and malformed model output are
    /// transient. Other 4xx responses and missing credentials are not.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(_) | LlmError::Parse(_) | LlmError::EmptyContent => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::MissingApiKey(_) => false,
        }
    }
}

/// Supported model providers. Any OpenAI-compatible endpoint (e.g. xAI) can be
/// reached through `OpenAi` with a custom base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Anthropic => DEFAULT_ANTHROPIC_MODEL,
            Provider::OpenAi => DEFAULT_OPENAI_MODEL,
            Provider::Gemini => DEFAULT_GEMINI_MODEL,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Anthropic => f.write_str("anthropic"),
            Provider::OpenAi => f.write_str("openai"),
            Provider::Gemini => f.write_str("gemini"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            "gemini" | "google" => Ok(Provider::Gemini),
            other => Err(format!("unsupported LLM provider '{other}'")),
        }
    }
}

/// Per-request model configuration. Resolved once at request start and passed
/// explicitly into every stage call; there is no process-wide active provider.
#[derive(Clone)]
pub struct ModelConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: Option<String>,
    /// Overrides the provider's default endpoint (OpenAI-compatible only).
    pub base_url: Option<String>,
    pub temperature: f32,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// Provider-neutral completion.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

impl From<AnthropicResponse> for LlmResponse {
    fn from(response: AnthropicResponse) -> Self {
        let text = response
            .content
            .into_iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text);
        Self {
            text,
            usage: Usage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        }
    }
}

impl From<OpenAiResponse> for LlmResponse {
    fn from(response: OpenAiResponse) -> Self {
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content);
        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        Self { text, usage }
    }
}

impl From<GeminiResponse> for LlmResponse {
    fn from(response: GeminiResponse) -> Self {
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            });
        let usage = response
            .usage_metadata
            .map(|u| Usage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();
        Self { text, usage }
    }
}

/// The single LLM client used by all stages.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
}

impl LlmClient {
    pub fn new(timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    /// Makes one call to the configured provider and returns the completion.
    pub async fn call(
        &self,
        model: &ModelConfig,
        prompt: &str,
        system: &str,
    ) -> Result<LlmResponse, LlmError> {
        let api_key = model
            .api_key
            .as_deref()
            .ok_or(LlmError::MissingApiKey(model.provider))?;

        let messages = vec![ChatMessage {
            role: "user",
            content: prompt,
        }];

        let request = match model.provider {
            Provider::Anthropic => self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&AnthropicRequest {
                    model: &model.model,
                    max_tokens: MAX_TOKENS,
                    temperature: model.temperature,
                    system,
                    messages,
                }),
            Provider::OpenAi => {
                let base = model
                    .base_url
                    .as_deref()
                    .unwrap_or(OPENAI_DEFAULT_BASE_URL)
                    .trim_end_matches('/');
                let mut all_messages = vec![ChatMessage {
                    role: "system",
                    content: system,
                }];
                all_messages.extend(messages);
                self.client
                    .post(format!("{base}/chat/completions"))
                    .bearer_auth(api_key)
                    .json(&OpenAiRequest {
                        model: &model.model,
                        temperature: model.temperature,
                        messages: all_messages,
                        response_format: ResponseFormat {
                            format_type: "json_object",
                        },
                    })
            }
            Provider::Gemini => self
                .client
                .post(format!(
                    "{GEMINI_API_BASE}/models/{}:generateContent",
                    model.model
                ))
                .header("x-goog-api-key", api_key)
                .json(&GeminiRequest {
                    system_instruction: GeminiContent {
                        role: None,
                        parts: vec![GeminiPart { text: system }],
                    },
                    contents: vec![GeminiContent {
                        role: Some("user"),
                        parts: vec![GeminiPart { text: prompt }],
                    }],
                    generation_config: GeminiGenerationConfig {
                        temperature: model.temperature,
                        max_output_tokens: MAX_TOKENS,
                        response_mime_type: "application/json",
                    },
                }),
        };

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let llm_response: LlmResponse = match model.provider {
            Provider::Anthropic => response.json::<AnthropicResponse>().await?.into(),
            Provider::OpenAi => response.json::<OpenAiResponse>().await?.into(),
            Provider::Gemini => response.json::<GeminiResponse>().await?.into(),
        };

        debug!(
            provider = %model.provider,
            model = %model.model,
            "LLM call succeeded: input_tokens={}, output_tokens={}",
            llm_response.usage.input_tokens,
            llm_response.usage.output_tokens
        );

        Ok(llm_response)
    }

    /// Calls the LLM and deserializes the text response as JSON.
    /// The prompt must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        model: &ModelConfig,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let response = self.call(model, prompt, system).await?;

        let text = response.text().ok_or(LlmError::EmptyContent)?;

        // Strip markdown code fences if the model wraps JSON in them
        let text = strip_json_fences(text);

        serde_json::from_str(text).map_err(LlmError::Parse)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let stripped = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match stripped {
        Some(inner) => inner
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(inner.trim_start()),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "  {\"key\": \"value\"}\n";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_rate_limit_and_server_errors_are_transient() {
        let rate_limited = LlmError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        let unavailable = LlmError::Api {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert!(rate_limited.is_transient());
        assert!(unavailable.is_transient());
        assert!(LlmError::EmptyContent.is_transient());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        let bad_request = LlmError::Api {
            status: 400,
            message: "bad".to_string(),
        };
        assert!(!bad_request.is_transient());
        assert!(!LlmError::MissingApiKey(Provider::OpenAi).is_transient());
    }

    #[test]
    fn test_provider_parses_case_insensitively() {
        assert_eq!("Anthropic".parse::<Provider>(), Ok(Provider::Anthropic));
        assert_eq!("openai".parse::<Provider>(), Ok(Provider::OpenAi));
        assert_eq!("Gemini".parse::<Provider>(), Ok(Provider::Gemini));
        assert!("mistral".parse::<Provider>().is_err());
    }

    #[test]
    fn test_provider_serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&Provider::OpenAi).unwrap(),
            "\"openai\""
        );
        let p: Provider = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(p, Provider::Anthropic);
    }

    #[test]
    fn test_model_config_debug_redacts_key() {
        let config = ModelConfig {
            provider: Provider::Anthropic,
            model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            api_key: Some("sk-secret".to_string()),
            base_url: None,
            temperature: DEFAULT_TEMPERATURE,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_openai_response_picks_first_choice_text() {
        let raw = r#"{
            "choices": [{"message": {"content": "{\"a\": 1}"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3}
        }"#;
        let parsed: OpenAiResponse = serde_json::from_str(raw).unwrap();
        let response: LlmResponse = parsed.into();
        assert_eq!(response.text(), Some("{\"a\": 1}"));
        assert_eq!(response.usage.output_tokens, 3);
    }

    #[test]
    fn test_gemini_response_joins_candidate_parts() {
        let raw = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": " 1}"}]}}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4, "totalTokenCount": 16}
        }"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        let response: LlmResponse = parsed.into();
        assert_eq!(response.text(), Some("{\"a\": 1}"));
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.usage.output_tokens, 4);
    }

    #[test]
    fn test_gemini_request_uses_camel_case_fields() {
        let request = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: "sys" }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: "hi" }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.5,
                max_output_tokens: 10,
                response_mime_type: "application/json",
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(value["systemInstruction"].get("role").is_none());
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 10);
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_gemini_response_without_candidates_is_empty() {
        let parsed: GeminiResponse = serde_json::from_str(r#"{"promptFeedback": {}}"#).unwrap();
        let response: LlmResponse = parsed.into();
        assert!(response.text().is_none());
    }

    #[test]
    fn test_anthropic_response_blank_text_is_none() {
        let raw = r#"{
            "content": [{"type": "text", "text": "   "}],
            "usage": {"input_tokens": 1, "output_tokens": 1}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(raw).unwrap();
        let response: LlmResponse = parsed.into();
        assert!(response.text().is_none());
    }
}
