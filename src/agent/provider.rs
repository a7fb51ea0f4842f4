//! Pluggable LLM provider trait.
//!
//! Implementations translate [`ChatRequest`]/[`ChatResponse`] into
//! provider-specific SDK calls, so the classification loop can be driven by
//! a scripted provider in tests.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// Trait for LLM provider backends.
///
/// Implementations perform a single call; retries and deadlines are applied
/// by the caller.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiRequest`] on transport or API failures, with
    /// the HTTP status when the provider reported one.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}
