//! Structured-output caller
//!
//! Turns a role-tagged prompt plus a target JSON schema into parsed JSON,
//! keeping transport failures distinct from answers that do not decode.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Message, OutputSchema};

/// Failure of one structured generation call
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The call itself failed or timed out
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),

    /// The model answered, but not with JSON of the declared shape
    #[error("unparseable model output: {0}")]
    Unparseable(String),

    /// A prompt template could not be rendered
    #[error("prompt rendering failed: {0}")]
    Prompt(String),
}

/// One structured request: prompts plus the schema the answer must match
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub schema: serde_json::Value,
    pub max_tokens: u32,
}

/// Wraps an `LlmClient` with per-call timeouts and JSON extraction
#[derive(Clone)]
pub struct StructuredCaller {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl StructuredCaller {
    pub fn new(client: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        debug!(timeout_ms = timeout.as_millis() as u64, "StructuredCaller::new: called");
        Self { client, timeout }
    }

    /// Issue the call and return the decoded JSON
    pub async fn generate(&self, request: StructuredRequest) -> Result<serde_json::Value, GenerationError> {
        debug!(name = %request.name, "StructuredCaller::generate: called");
        let output = OutputSchema::new(&request.name, &request.description, request.schema);
        let completion = CompletionRequest {
            system_prompt: request.system_prompt,
            messages: vec![Message::user(request.user_prompt)],
            output: Some(output),
            max_tokens: request.max_tokens,
            temperature: None,
        };

        let response = match tokio::time::timeout(self.timeout, self.client.complete(completion)).await {
            Ok(result) => result.inspect_err(|e| {
                if let Some(wait) = e.retry_after() {
                    warn!(name = %request.name, retry_after_secs = wait.as_secs(), "generate: rate limited");
                }
            })?,
            Err(_) => {
                warn!(name = %request.name, timeout_ms = self.timeout.as_millis() as u64, "generate: call timed out");
                return Err(LlmError::Timeout(self.timeout).into());
            }
        };

        extract_structured(&request.name, response)
    }
}

/// Pull the structured payload out of a response
///
/// The forced tool's input wins; otherwise the text content is parsed,
/// tolerating a Markdown code fence around the JSON.
pub fn extract_structured(name: &str, response: CompletionResponse) -> Result<serde_json::Value, GenerationError> {
    debug!(%name, tool_calls = response.tool_calls.len(), "extract_structured: called");
    if let Some(call) = response.tool_calls.into_iter().find(|c| c.name == name) {
        debug!("extract_structured: using tool input");
        return Ok(call.input);
    }

    let Some(content) = response.content else {
        return Err(GenerationError::Unparseable("response had neither tool input nor text".to_string()));
    };

    parse_json_text(&content)
}

/// Parse JSON from model text, stripping code fences and surrounding prose
pub fn parse_json_text(text: &str) -> Result<serde_json::Value, GenerationError> {
    let trimmed = strip_code_fence(text.trim());
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    // Fall back to the outermost object or array embedded in prose
    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    if let (Some(start), Some(end)) = (start, end)
        && start < end
        && let Ok(value) = serde_json::from_str(&trimmed[start..=end])
    {
        return Ok(value);
    }

    let preview: String = trimmed.chars().take(120).collect();
    Err(GenerationError::Unparseable(format!("not valid JSON: {}", preview)))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag on the opening fence
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Find an array under `key` in an object, or accept a bare array
pub fn take_array(value: serde_json::Value, key: &str) -> Result<Vec<serde_json::Value>, GenerationError> {
    match value {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Object(mut map) => match map.remove(key) {
            Some(serde_json::Value::Array(items)) => Ok(items),
            Some(other) => Err(GenerationError::Unparseable(format!(
                "'{}' is not an array (got {})",
                key,
                json_kind(&other)
            ))),
            None => Err(GenerationError::Unparseable(format!("missing '{}' array", key))),
        },
        other => Err(GenerationError::Unparseable(format!(
            "expected object or array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
