//! Anthropic Messages API client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::http::send_json;
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, TokenUsage, ToolCall};
use crate::config::LlmConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude API client
pub struct AnthropicClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, "AnthropicClient::from_config: called");
        let api_key = config.get_api_key().map_err(|e| LlmError::Config(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Build the request body for the Anthropic API
    ///
    /// Structured output becomes a single tool the model is forced to call.
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, "build_request_body: called");
        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "temperature": request.temperature.unwrap_or(self.temperature),
            "system": request.system_prompt,
            "messages": messages,
        });

        if let Some(output) = &request.output {
            debug!(name = %output.name, "build_request_body: forcing structured output tool");
            body["tools"] = serde_json::json!([output.to_anthropic_tool()]);
            body["tool_choice"] = serde_json::json!({ "type": "tool", "name": output.name });
        }

        body
    }

    fn parse_response(&self, api_response: AnthropicResponse) -> CompletionResponse {
        debug!(?api_response.stop_reason, "parse_response: called");
        let mut content: Option<String> = None;
        let mut tool_calls = Vec::new();

        for block in api_response.content {
            match block {
                AnthropicContentBlock::Text { text } => match content.as_mut() {
                    Some(existing) => existing.push_str(&text),
                    None => content = Some(text),
                },
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    debug!(%id, %name, "parse_response: ToolUse block");
                    tool_calls.push(ToolCall { id, name, input });
                }
                AnthropicContentBlock::Other => {}
            }
        }

        CompletionResponse {
            content,
            tool_calls,
            stop_reason: StopReason::from_anthropic(&api_response.stop_reason),
            usage: TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, %request.max_tokens, "AnthropicClient::complete: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(&request);

        let api_response: AnthropicResponse = send_json(|| {
            self.http
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
        })
        .await?;

        let response = self.parse_response(api_response);
        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "AnthropicClient::complete: done"
        );
        Ok(response)
    }
}

// Anthropic API response types

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Message, OutputSchema};

    fn client(max_tokens: u32) -> AnthropicClient {
        AnthropicClient {
            model: "claude-sonnet-4".to_string(),
            api_key: "test-key".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            http: Client::new(),
            max_tokens,
            temperature: 0.3,
        }
    }

    fn request(output: Option<OutputSchema>, max_tokens: u32) -> CompletionRequest {
        CompletionRequest {
            system_prompt: "You are helpful".to_string(),
            messages: vec![Message::user("Hello")],
            output,
            max_tokens,
            temperature: None,
        }
    }

    #[test]
    fn test_build_request_body_basic() {
        let body = client(8192).build_request_body(&request(None, 1000));

        assert_eq!(body["model"], "claude-sonnet-4");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["system"], "You are helpful");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_structured_output_forces_tool() {
        let output = OutputSchema::new("submit_stories", "Submit stories", serde_json::json!({"type": "object"}));
        let body = client(8192).build_request_body(&request(Some(output), 1000));

        assert_eq!(body["tools"][0]["name"], "submit_stories");
        assert_eq!(body["tool_choice"]["type"], "tool");
        assert_eq!(body["tool_choice"]["name"], "submit_stories");
    }

    #[test]
    fn test_max_tokens_capped() {
        let body = client(1000).build_request_body(&request(None, 5000));
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn test_parse_response_collects_tool_input() {
        let raw = serde_json::json!({
            "content": [
                {"type": "text", "text": "Here you go"},
                {"type": "tool_use", "id": "toolu_1", "name": "submit_stories", "input": {"stories": []}},
                {"type": "thinking", "thinking": "..."}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 20}
        });
        let parsed: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let response = client(8192).parse_response(parsed);

        assert_eq!(response.content.as_deref(), Some("Here you go"));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].input["stories"], serde_json::json!([]));
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.usage.output_tokens, 20);
    }
}
