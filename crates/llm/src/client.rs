//! Provider-agnostic chat dispatch.
//!
//! One client serves all supported providers. OpenAI, Groq, and Ollama
//! speak the OpenAI-compatible `/chat/completions` shape (with different
//! base URLs); Anthropic uses its messages API. Every call goes through
//! the process-wide circuit breaker so quota exhaustion stops burning
//! requests.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use prismis_core::{Error, Result};

use crate::breaker::get_circuit_breaker;

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const GROQ_BASE: &str = "https://api.groq.com/openai/v1";
const ANTHROPIC_BASE: &str = "https://api.anthropic.com/v1";

const CHAT_TIMEOUT: Duration = Duration::from_secs(120);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(60);

const QUOTA_PATTERNS: &[&str] = &[
    "quota",
    "insufficient_quota",
    "billing",
    "payment_required",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "429",
    "too many requests",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "429",
    "connection",
    "temporarily unavailable",
    "service unavailable",
    "503",
    "502",
    "500",
];

/// Does this error message indicate quota/billing exhaustion?
pub fn is_quota_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    QUOTA_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Does this error message indicate a transient failure worth retrying?
pub fn is_transient_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Groq,
    Ollama,
}

impl Provider {
    pub fn parse(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "openai" => Some(Provider::OpenAi),
            "anthropic" => Some(Provider::Anthropic),
            "groq" => Some(Provider::Groq),
            "ollama" => Some(Provider::Ollama),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
    pub api_base: Option<String>,
}

impl LlmSettings {
    pub fn from_config(
        provider: &str,
        model: &str,
        api_key: &str,
        api_base: Option<&str>,
    ) -> Result<Self> {
        let provider = Provider::parse(provider)
            .ok_or_else(|| Error::Config(format!("unsupported llm provider: {provider}")))?;
        if provider == Provider::Ollama && api_base.unwrap_or("").is_empty() {
            return Err(Error::Config(
                "ollama provider requires llm.api_base (e.g. \"http://localhost:11434\")".into(),
            ));
        }
        Ok(Self {
            provider,
            model: model.to_string(),
            api_key: api_key.to_string(),
            api_base: api_base.map(str::to_string),
        })
    }
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    settings: LlmSettings,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CHAT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { settings, client })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Send a system+user prompt pair and parse the reply as one JSON
    /// object. Temperature is fixed low for consistent analysis.
    pub async fn chat_json(&self, system: &str, user: &str) -> Result<Value> {
        let text = self.chat_text(system, user, CHAT_TIMEOUT).await?;
        extract_json_object(&text)
            .ok_or_else(|| Error::Validation(format!("LLM returned non-JSON output: {}", truncate(&text, 200))))
    }

    /// Minimal round-trip against the configured provider/model, run once
    /// at startup before the scheduler starts.
    pub async fn health_check(&self) -> Result<()> {
        self.chat_text(
            "You are a health check. Reply with the single word OK.",
            "ping",
            HEALTH_TIMEOUT,
        )
        .await
        .map(|_| ())
    }

    async fn chat_text(&self, system: &str, user: &str, timeout: Duration) -> Result<String> {
        {
            let mut breaker = get_circuit_breaker().lock().expect("breaker lock poisoned");
            if !breaker.check_can_proceed() {
                return Err(Error::Quota(
                    "circuit breaker open: quota exhausted, rejecting LLM call".into(),
                ));
            }
        }

        let result = match self.settings.provider {
            Provider::Anthropic => self.chat_anthropic(system, user, timeout).await,
            _ => self.chat_openai_compatible(system, user, timeout).await,
        };

        let mut breaker = get_circuit_breaker().lock().expect("breaker lock poisoned");
        match &result {
            Ok(_) => breaker.record_success(),
            Err(e) => breaker.record_failure(&e.to_string()),
        }
        result
    }

    async fn chat_openai_compatible(
        &self,
        system: &str,
        user: &str,
        timeout: Duration,
    ) -> Result<String> {
        let base = match (&self.settings.api_base, self.settings.provider) {
            (Some(base), _) => base.trim_end_matches('/').to_string(),
            (None, Provider::Groq) => GROQ_BASE.to_string(),
            (None, _) => OPENAI_BASE.to_string(),
        };
        // Ollama exposes the OpenAI-compatible surface under /v1.
        let base = if self.settings.provider == Provider::Ollama && !base.ends_with("/v1") {
            format!("{base}/v1")
        } else {
            base
        };
        let endpoint = format!("{base}/chat/completions");

        let payload = json!({
            "model": self.settings.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.3,
            "response_format": {"type": "json_object"},
        });

        debug!(endpoint = %endpoint, model = %self.settings.model, "llm chat request");
        let response = self
            .client
            .post(&endpoint)
            .timeout(timeout)
            .bearer_auth(&self.settings.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::TransientProvider(format!("invalid provider response: {e}")))?;

        if !status.is_success() {
            return Err(classify_status_error(status.as_u16(), &body.to_string()));
        }

        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Validation(format!("provider response missing content: {body}")))
    }

    async fn chat_anthropic(&self, system: &str, user: &str, timeout: Duration) -> Result<String> {
        let base = self
            .settings
            .api_base
            .as_deref()
            .unwrap_or(ANTHROPIC_BASE)
            .trim_end_matches('/');
        let endpoint = format!("{base}/messages");

        let payload = json!({
            "model": self.settings.model,
            "max_tokens": 4096,
            "system": system,
            "messages": [{"role": "user", "content": user}],
            "temperature": 0.3,
        });

        debug!(endpoint = %endpoint, model = %self.settings.model, "llm chat request");
        let response = self
            .client
            .post(&endpoint)
            .timeout(timeout)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::TransientProvider(format!("invalid provider response: {e}")))?;

        if !status.is_success() {
            return Err(classify_status_error(status.as_u16(), &body.to_string()));
        }

        body.get("content")
            .and_then(|c| c.get(0))
            .and_then(|block| block.get("text"))
            .and_then(|text| text.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Validation(format!("provider response missing content: {body}")))
    }
}

fn classify_request_error(err: reqwest::Error) -> Error {
    let message = err.to_string();
    if err.is_timeout() || err.is_connect() || is_transient_error(&message) {
        Error::TransientProvider(message)
    } else {
        Error::Validation(format!("llm request failed: {message}"))
    }
}

fn classify_status_error(status: u16, body: &str) -> Error {
    let message = format!("provider returned {status}: {}", truncate(body, 300));
    if status == 402 || is_quota_error(&message) {
        Error::Quota(message)
    } else if status >= 500 || is_transient_error(&message) {
        Error::TransientProvider(message)
    } else {
        Error::Validation(message)
    }
}

/// Pull one JSON object out of an LLM reply. Tries a direct parse, then a
/// fenced ```json block, then the first `{` to the last `}`.
pub fn extract_json_object(response: &str) -> Option<Value> {
    let trimmed = response.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    if let Some(fence_start) = response.find("```json") {
        let after = &response[fence_start + "```json".len()..];
        if let Some(fence_end) = after.find("```") {
            if let Ok(value) = serde_json::from_str::<Value>(after[..fence_end].trim()) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    None
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let end = text
            .char_indices()
            .take_while(|(i, _)| *i < max)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}…", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsing_is_case_insensitive() {
        assert_eq!(Provider::parse("OpenAI"), Some(Provider::OpenAi));
        assert_eq!(Provider::parse("ollama"), Some(Provider::Ollama));
        assert_eq!(Provider::parse("my-llm"), None);
    }

    #[test]
    fn ollama_without_api_base_is_config_error() {
        let err = LlmSettings::from_config("ollama", "llama3.1:8b", "unused", None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("api_base"));
    }

    #[test]
    fn quota_patterns_match() {
        assert!(is_quota_error("HTTP 429 Too Many Requests"));
        assert!(is_quota_error("insufficient_quota for this billing period"));
        assert!(!is_quota_error("connection reset by peer"));
    }

    #[test]
    fn transient_patterns_match() {
        assert!(is_transient_error("request timed out"));
        assert!(is_transient_error("503 Service Unavailable"));
        assert!(!is_transient_error("invalid api key"));
    }

    #[test]
    fn status_classification_routes_to_taxonomy() {
        assert!(matches!(classify_status_error(429, "{}"), Error::Quota(_)));
        assert!(matches!(
            classify_status_error(402, "payment required"),
            Error::Quota(_)
        ));
        assert!(matches!(
            classify_status_error(503, "{}"),
            Error::TransientProvider(_)
        ));
        assert!(matches!(
            classify_status_error(401, "invalid key"),
            Error::Validation(_)
        ));
    }

    #[test]
    fn extract_json_direct() {
        let value = extract_json_object(r#"{"summary": "hi"}"#).unwrap();
        assert_eq!(value["summary"], "hi");
    }

    #[test]
    fn extract_json_fenced() {
        let raw = "Here you go:\n```json\n{\"priority\": \"high\"}\n```\nDone.";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["priority"], "high");
    }

    #[test]
    fn extract_json_embedded() {
        let raw = "preamble {\"a\": 1} epilogue";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn extract_json_rejects_plain_text() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("").is_none());
    }
}
