//! LLM client module
//!
//! Provider transports behind the `LlmClient` trait, plus the structured
//! caller the pipeline stages use.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod http;
mod openai;
pub mod structured;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use structured::{GenerationError, StructuredCaller, StructuredRequest};
pub use types::{CompletionRequest, CompletionResponse, Message, OutputSchema, Role, StopReason, TokenUsage, ToolCall};

use crate::config::{ANTHROPIC_BASE_URL, LlmConfig, OPENAI_BASE_URL};

/// Create an LLM client based on the provider specified in config
///
/// This is the only place credentials are resolved from the environment.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicClient::from_config(config)?)),
        "openai" => Ok(Arc::new(OpenAIClient::from_config(&with_base_url(config, OPENAI_BASE_URL))?)),
        other => Err(LlmError::Config(format!(
            "Unknown LLM provider: '{}'. Supported: anthropic, openai",
            other
        ))),
    }
}

/// Swap a base URL left at the Anthropic default for the provider's endpoint
fn with_base_url(config: &LlmConfig, provider_url: &str) -> LlmConfig {
    let mut config = config.clone();
    if config.base_url.trim_end_matches('/') == ANTHROPIC_BASE_URL {
        debug!(provider = %config.provider, provider_url, "with_base_url: using provider default");
        config.base_url = provider_url.to_string();
    }
    config
}
