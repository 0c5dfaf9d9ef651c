//! Shared Anthropic Messages API client (used by C3, C4, and C5).
//!
//! Built the way the teacher's `rerank.rs` builds `LLMReranker`: a thin
//! synchronous `ureq` client over the Messages API, no retry/backoff layer,
//! credentials from the environment only.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, StoryMindError};

const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A single-turn, temperature-0 text completion call.
///
/// Named components (C3, C4, C5) depend on this trait rather than the
/// concrete `AnthropicClient` so tests can substitute a fake instead of
/// hitting a live endpoint.
pub trait LlmClient: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// `ureq`-backed client for the Anthropic Messages API.
pub struct AnthropicClient {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Create from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            StoryMindError::LlmTransient(
                "ANTHROPIC_API_KEY environment variable not set".to_string(),
            )
        })?;
        Ok(Self::new(api_key))
    }
}

impl LlmClient for AnthropicClient {
    /// Send `prompt` as a single user turn at temperature 0 and return the
    /// model's raw text response.
    fn complete(&self, prompt: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 2048,
            temperature: 0.0,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = ureq::post(&format!("{}/messages", self.base_url))
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", ANTHROPIC_VERSION)
            .set("content-type", "application/json")
            .timeout(self.timeout)
            .send_json(&request);

        let response = match response {
            Ok(r) => r,
            Err(ureq::Error::Status(429, _)) => return Err(StoryMindError::LlmQuotaExceeded),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                return Err(StoryMindError::LlmTransient(format!(
                    "Anthropic API returned {code}: {body}"
                )));
            }
            Err(e) => return Err(StoryMindError::LlmTransient(e.to_string())),
        };

        let parsed: AnthropicResponse = response
            .into_json()
            .map_err(|e| StoryMindError::LlmTransient(format!("failed to parse response: {e}")))?;

        Ok(parsed
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .unwrap_or_default())
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

/// Extract and parse a top-level JSON array of strings from an LLM response,
/// tolerating prose wrapped around it and Markdown code fences.
///
/// Used by the name extractor (C3) and the optional semantic dedup pass (C4).
pub fn parse_json_string_array(response: &str) -> Result<Vec<String>> {
    let cleaned = strip_code_fences(response);

    let start = cleaned
        .find('[')
        .ok_or_else(|| StoryMindError::ExtractionParseError("no JSON array found".to_string()))?;
    let end = cleaned.rfind(']').ok_or_else(|| {
        StoryMindError::ExtractionParseError("no closing bracket found".to_string())
    })?;
    if end < start {
        return Err(StoryMindError::ExtractionParseError(
            "malformed JSON array brackets".to_string(),
        ));
    }

    let json_str = &cleaned[start..=end];
    serde_json::from_str(json_str)
        .map_err(|e| StoryMindError::ExtractionParseError(format!("invalid JSON array: {e}")))
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.strip_suffix("```").unwrap_or(s))
        .unwrap_or(trimmed)
        .trim()
}

/// An `LlmClient` that returns a fixed response, used across this crate's
/// tests so no component's tests need a live network call.
#[cfg(test)]
pub struct FakeLlmClient {
    pub response: String,
}

#[cfg(test)]
impl LlmClient for FakeLlmClient {
    fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_string_array_plain() {
        let response = r#"["Harry Potter", "Hermione Granger"]"#;
        let names = parse_json_string_array(response).unwrap();
        assert_eq!(names, vec!["Harry Potter", "Hermione Granger"]);
    }

    #[test]
    fn parse_json_string_array_with_surrounding_prose() {
        let response = "Here are the names I found:\n[\"Ron Weasley\"]\nLet me know if you need more.";
        let names = parse_json_string_array(response).unwrap();
        assert_eq!(names, vec!["Ron Weasley"]);
    }

    #[test]
    fn parse_json_string_array_with_code_fence() {
        let response = "```json\n[\"Albus Dumbledore\"]\n```";
        let names = parse_json_string_array(response).unwrap();
        assert_eq!(names, vec!["Albus Dumbledore"]);
    }

    #[test]
    fn parse_json_string_array_rejects_non_array() {
        let response = "I could not find any names.";
        let err = parse_json_string_array(response).unwrap_err();
        assert!(matches!(err, StoryMindError::ExtractionParseError(_)));
    }

    #[test]
    fn parse_json_string_array_empty_is_valid() {
        let names = parse_json_string_array("[]").unwrap();
        assert!(names.is_empty());
    }
}
