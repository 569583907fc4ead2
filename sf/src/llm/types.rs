//! Provider-agnostic request/response types

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Everything needed for one model call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt (rendered from a Handlebars template)
    pub system_prompt: String,

    /// Conversation turns; the pipeline always sends a single user turn
    pub messages: Vec<Message>,

    /// Target shape the answer must decode into, if any
    pub output: Option<OutputSchema>,

    /// Max tokens for the response (capped by the client's configured max)
    pub max_tokens: u32,

    /// Sampling temperature; the client default applies when unset
    pub temperature: Option<f32>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        debug!("Message::user: called");
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Declared JSON shape for structured output
///
/// Anthropic receives this as a single forced tool, OpenAI as a
/// `response_format` of type `json_schema`.
#[derive(Debug, Clone, Serialize)]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: serde_json::Value) -> Self {
        let name = name.into();
        debug!(%name, "OutputSchema::new: called");
        Self {
            name,
            description: description.into(),
            schema,
        }
    }

    /// Anthropic tool definition
    pub fn to_anthropic_tool(&self) -> serde_json::Value {
        debug!(%self.name, "OutputSchema::to_anthropic_tool: called");
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.schema,
        })
    }

    /// OpenAI `response_format` block
    pub fn to_openai_response_format(&self) -> serde_json::Value {
        debug!(%self.name, "OutputSchema::to_openai_response_format: called");
        serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": self.name,
                "description": self.description,
                "schema": self.schema,
            }
        })
    }
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Text content (if any)
    pub content: Option<String>,

    /// Tool calls; a forced structured-output tool lands here
    pub tool_calls: Vec<ToolCall>,

    pub stop_reason: StopReason,

    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// Plain text response, used by tests and simple callers
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }

    /// Response carrying one tool call with the given input
    pub fn tool(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            content: None,
            tool_calls: vec![ToolCall {
                id: "toolu_0".to_string(),
                name: name.into(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage::default(),
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Why the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    /// Parse from the Anthropic `stop_reason` string
    pub fn from_anthropic(s: &str) -> Self {
        match s {
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }

    /// Parse from the OpenAI `finish_reason` string
    pub fn from_openai(s: Option<&str>) -> Self {
        match s {
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        }
    }
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
