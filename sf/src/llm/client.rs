//! LlmClient trait definition

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// Stateless LLM client - each call is independent (fresh context)
///
/// Implementations must be safe to share across concurrent workflow runs;
/// the engine holds them as `Arc<dyn LlmClient>`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request and wait for the full answer
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
