//! OpenAI Chat Completions client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::http::send_json;
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Role, StopReason, TokenUsage, ToolCall};
use crate::config::LlmConfig;

/// OpenAI API client
pub struct OpenAIClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, "OpenAIClient::from_config: called");
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

    /// Reasoning models take `max_completion_tokens` and reject temperature
    fn is_reasoning_model(&self) -> bool {
        self.model.starts_with("gpt-5") || self.model.starts_with("o1") || self.model.starts_with("o3")
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, "build_request_body: called");

        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        messages.extend(request.messages.iter().map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            serde_json::json!({ "role": role, "content": m.content })
        }));

        let max_tokens = request.max_tokens.min(self.max_tokens);
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });

        if self.is_reasoning_model() {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
            body["temperature"] = serde_json::json!(request.temperature.unwrap_or(self.temperature));
        }

        if let Some(output) = &request.output {
            debug!(name = %output.name, "build_request_body: json_schema response format");
            body["response_format"] = output.to_openai_response_format();
        }

        body
    }

    fn parse_response(&self, api_response: OpenAIResponse) -> CompletionResponse {
        debug!(choices = api_response.choices.len(), "parse_response: called");
        let usage = TokenUsage {
            input_tokens: api_response.usage.prompt_tokens,
            output_tokens: api_response.usage.completion_tokens,
        };

        let Some(choice) = api_response.choices.into_iter().next() else {
            return CompletionResponse {
                content: None,
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage,
            };
        };

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                input: serde_json::from_str(&tc.function.arguments).unwrap_or(serde_json::json!({})),
            })
            .collect();

        CompletionResponse {
            content: choice.message.content,
            tool_calls,
            stop_reason: StopReason::from_openai(choice.finish_reason.as_deref()),
            usage,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, %request.max_tokens, "OpenAIClient::complete: called");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(&request);

        let api_response: OpenAIResponse = send_json(|| {
            self.http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("content-type", "application/json")
                .json(&body)
        })
        .await?;

        Ok(self.parse_response(api_response))
    }
}

// OpenAI API response types

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: OpenAIUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    id: String,
    function: OpenAIFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Message, OutputSchema};

    fn client(model: &str, max_tokens: u32) -> OpenAIClient {
        OpenAIClient {
            model: model.to_string(),
            api_key: "test-key".to_string(),
            base_url: "https://api.openai.com".to_string(),
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
        let body = client("gpt-4o", 8192).build_request_body(&request(None, 1000));

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are helpful");
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_reasoning_model_uses_completion_tokens() {
        let body = client("o3-mini", 8192).build_request_body(&request(None, 1000));
        assert_eq!(body["max_completion_tokens"], 1000);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_structured_output_sets_response_format() {
        let output = OutputSchema::new("submit_tasks", "Submit tasks", serde_json::json!({"type": "object"}));
        let body = client("gpt-4o", 8192).build_request_body(&request(Some(output), 5000));

        assert_eq!(body["max_tokens"], 5000);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "submit_tasks");
    }

    #[test]
    fn test_parse_response_text() {
        let raw = serde_json::json!({
            "choices": [{"message": {"content": "{\"tasks\": []}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 7}
        });
        let parsed: OpenAIResponse = serde_json::from_value(raw).unwrap();
        let response = client("gpt-4o", 8192).parse_response(parsed);

        assert_eq!(response.content.as_deref(), Some("{\"tasks\": []}"));
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(response.usage.input_tokens, 5);
    }
}
