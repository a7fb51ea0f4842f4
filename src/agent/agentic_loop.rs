//! Bounded classification loop.
//!
//! Drives the model ↔ tool round-trip for one request:
//!
//! ```text
//! Started → { Reasoning ⇄ Retrieving }* → Emitting → Validated | Failed
//! ```
//!
//! Each round is one model call. Retrieval calls are answered with passages;
//! an emit call goes through the validation gate and either ends the loop
//! or is rejected back to the model. Both the number of rounds and the
//! number of rejected emissions are capped.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::{ClassificationRecord, SchemaViolation};
use crate::error::AgentError;
use crate::retrieval::Corpus;
use crate::retry::{RetryPolicy, retry_async};

use super::executor::{ToolExecutor, ToolOutcome};
use super::message::{
    ChatRequest, ChatResponse, TokenUsage, assistant_message, tool_message, user_message,
};
use super::prompt::build_correction_prompt;
use super::provider::LlmProvider;

/// A step in a classification request's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "corpus", rename_all = "snake_case")]
pub enum ClassificationPhase {
    /// Request accepted.
    Started,
    /// Waiting on the model.
    Reasoning,
    /// Querying a reference corpus.
    Retrieving(Corpus),
    /// A candidate record is at the gate.
    Emitting,
    /// A record passed the gate.
    Validated,
    /// The request ended without a record.
    Failed,
}

/// Caps on one loop run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    /// Model calls allowed.
    pub max_rounds: usize,
    /// Rejected emissions allowed before giving up.
    pub max_corrections: usize,
}

/// Result of a successful loop run.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The validated record.
    pub record: ClassificationRecord,
    /// Model calls made.
    pub rounds: usize,
    /// Retrieval queries answered.
    pub retrieval_calls: usize,
    /// Rejected emissions before acceptance.
    pub corrections: usize,
    /// Usage summed over every round.
    pub usage: TokenUsage,
    /// Phases visited, in order.
    pub trace: Vec<ClassificationPhase>,
}

/// Strips a surrounding markdown code fence, if any.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    }
}

/// Parses a plain-text final answer through the same gate as the emit tool.
///
/// # Errors
///
/// Returns the [`SchemaViolation`] describing why the text is not a record.
pub fn parse_plain_answer(content: &str) -> Result<ClassificationRecord, SchemaViolation> {
    let body = strip_code_fence(content);
    if body.is_empty() {
        return Err(SchemaViolation {
            issues: vec!["the answer was empty".to_string()],
        });
    }
    ClassificationRecord::from_json_str(body)
}

/// One model call, retried on transient failures.
async fn chat_with_retry(
    provider: &dyn LlmProvider,
    request: &ChatRequest,
    retry: &RetryPolicy,
) -> Result<ChatResponse, AgentError> {
    retry_async(retry, provider.name(), AgentError::is_transient, move || {
        provider.chat(request)
    })
    .await
    .map_err(|failure| {
        if failure.error.is_transient() {
            AgentError::ModelUnavailable {
                attempts: failure.attempts,
                message: failure.error.to_string(),
            }
        } else {
            failure.error
        }
    })
}

/// Tracks corrections and decides when the budget is spent.
struct Corrections {
    used: usize,
    max: usize,
}

impl Corrections {
    fn reject(&mut self, violation: &SchemaViolation) -> Result<(), AgentError> {
        self.used += 1;
        warn!(
            attempt = self.used,
            max = self.max,
            %violation,
            "candidate record rejected"
        );
        if self.used > self.max {
            Err(AgentError::SchemaViolation {
                attempts: self.used,
                message: violation.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Runs the loop: model → tool calls → tool results → model → …
///
/// `request` must already hold the system and user messages and the tool
/// definitions; it grows in place with every round.
///
/// # Errors
///
/// - [`AgentError::ToolLoopExceeded`] if no record is accepted within
///   `max_rounds` model calls.
/// - [`AgentError::SchemaViolation`] after more than `max_corrections`
///   rejected emissions.
/// - [`AgentError::ModelUnavailable`] / [`AgentError::RetrievalUnavailable`]
///   when an external call stays down through the retry budget.
pub async fn classification_loop(
    provider: &dyn LlmProvider,
    request: &mut ChatRequest,
    executor: &ToolExecutor<'_>,
    limits: LoopLimits,
    retry: &RetryPolicy,
) -> Result<LoopOutcome, AgentError> {
    let mut trace = vec![ClassificationPhase::Started];
    let mut usage = TokenUsage::default();
    let mut retrieval_calls = 0;
    let mut corrections = Corrections {
        used: 0,
        max: limits.max_corrections,
    };

    for round in 1..=limits.max_rounds {
        trace.push(ClassificationPhase::Reasoning);
        let response = chat_with_retry(provider, request, retry).await?;
        usage.accumulate(response.usage);

        if response.tool_calls.is_empty() {
            debug!(round, "model answered without a tool call");
            trace.push(ClassificationPhase::Emitting);
            match parse_plain_answer(&response.content) {
                Ok(record) => {
                    trace.push(ClassificationPhase::Validated);
                    info!(round, "record accepted from plain answer");
                    return Ok(LoopOutcome {
                        record,
                        rounds: round,
                        retrieval_calls,
                        corrections: corrections.used,
                        usage,
                        trace,
                    });
                }
                Err(violation) => {
                    corrections.reject(&violation)?;
                    request
                        .messages
                        .push(assistant_message(&response.content, Vec::new()));
                    request
                        .messages
                        .push(user_message(&build_correction_prompt(&violation)));
                    continue;
                }
            }
        }

        debug!(
            round,
            tool_count = response.tool_calls.len(),
            "executing tool calls"
        );
        request.messages.push(assistant_message(
            &response.content,
            response.tool_calls.clone(),
        ));

        for call in &response.tool_calls {
            match executor.execute(call).await? {
                ToolOutcome::Observation { result, corpus, .. } => {
                    if let Some(corpus) = corpus {
                        retrieval_calls += 1;
                        trace.push(ClassificationPhase::Retrieving(corpus));
                    }
                    request
                        .messages
                        .push(tool_message(&result.tool_call_id, &result.content));
                }
                ToolOutcome::Emitted(record) => {
                    trace.push(ClassificationPhase::Emitting);
                    trace.push(ClassificationPhase::Validated);
                    info!(round, "record accepted");
                    return Ok(LoopOutcome {
                        record,
                        rounds: round,
                        retrieval_calls,
                        corrections: corrections.used,
                        usage,
                        trace,
                    });
                }
                ToolOutcome::Rejected { result, violation } => {
                    trace.push(ClassificationPhase::Emitting);
                    corrections.reject(&violation)?;
                    request
                        .messages
                        .push(tool_message(&result.tool_call_id, &result.content));
                }
            }
        }
    }

    warn!(max_rounds = limits.max_rounds, "round limit reached");
    Err(AgentError::ToolLoopExceeded {
        max_rounds: limits.max_rounds,
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::message::{system_message, user_message};
    use crate::agent::tool::{ToolCall, ToolKind};
    use crate::retrieval::{HashEmbedder, InMemoryIndex, RetrievalTools};

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    const VALID: &str = r#"{"title":"T","classification":"Technical","methodology":"Mixed","evaluated_domain":"Health","cycle_stage":"Improvement","goals":[3],"justification":"J"}"#;
    const HYBRID: &str = r#"{"title":"T","classification":"Hybrid","methodology":"Mixed","evaluated_domain":"Health","cycle_stage":"Improvement","goals":[3],"justification":"J"}"#;

    /// Provider that replays a fixed list of responses, repeating the last.
    struct ScriptedProvider {
        calls: AtomicUsize,
        script: Vec<ChatResponse>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<ChatResponse>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let idx = n.min(self.script.len().saturating_sub(1));
            self.script.get(idx).cloned().ok_or(AgentError::ApiRequest {
                message: "empty script".to_string(),
                status: Some(400),
            })
        }
    }

    fn tool_turn(name: &str, arguments: &str) -> ChatResponse {
        ChatResponse {
            tool_calls: vec![ToolCall {
                id: format!("call_{name}"),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: Some("tool_calls".to_string()),
            ..ChatResponse::default()
        }
    }

    fn text_turn(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            finish_reason: Some("stop".to_string()),
            ..ChatResponse::default()
        }
    }

    fn empty_tools() -> RetrievalTools {
        RetrievalTools::new(
            Arc::new(HashEmbedder::default()),
            Arc::new(InMemoryIndex::new("handbook")),
            Arc::new(InMemoryIndex::new("goals")),
        )
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "test".to_string(),
            messages: vec![system_message("codebook"), user_message("texto")],
            temperature: Some(0.0),
            max_tokens: Some(256),
            tools: ToolKind::definitions(),
        }
    }

    const LIMITS: LoopLimits = LoopLimits {
        max_rounds: 4,
        max_corrections: 1,
    };

    #[tokio::test]
    async fn test_retrieve_then_emit() {
        let tools = empty_tools();
        let executor = ToolExecutor::new(&tools);
        let provider = ScriptedProvider::new(vec![
            tool_turn("search_policy_handbook", r#"{"query":"saúde"}"#),
            tool_turn("emit_classification", VALID),
        ]);
        let mut req = request();

        let outcome = classification_loop(&provider, &mut req, &executor, LIMITS, &RetryPolicy::none())
            .await
            .unwrap_or_else(|e| panic!("loop failed: {e}"));

        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.retrieval_calls, 1);
        assert_eq!(outcome.usage.total_tokens, 30);
        assert_eq!(
            outcome.trace,
            vec![
                ClassificationPhase::Started,
                ClassificationPhase::Reasoning,
                ClassificationPhase::Retrieving(Corpus::PolicyHandbook),
                ClassificationPhase::Reasoning,
                ClassificationPhase::Emitting,
                ClassificationPhase::Validated,
            ]
        );
        // system + user + assistant(call) + tool(result) + assistant(emit)
        assert_eq!(req.messages.len(), 5);
    }

    #[tokio::test]
    async fn test_rejection_then_correction() {
        let tools = empty_tools();
        let executor = ToolExecutor::new(&tools);
        let provider = ScriptedProvider::new(vec![
            tool_turn("emit_classification", HYBRID),
            tool_turn("emit_classification", VALID),
        ]);
        let mut req = request();

        let outcome = classification_loop(&provider, &mut req, &executor, LIMITS, &RetryPolicy::none())
            .await
            .unwrap_or_else(|e| panic!("loop failed: {e}"));
        assert_eq!(outcome.corrections, 1);
        assert!(req.messages.iter().any(|m| m.content.contains("Hybrid")));
    }

    #[tokio::test]
    async fn test_correction_budget_exhausted() {
        let tools = empty_tools();
        let executor = ToolExecutor::new(&tools);
        let provider = ScriptedProvider::new(vec![tool_turn("emit_classification", HYBRID)]);

        let result =
            classification_loop(&provider, &mut request(), &executor, LIMITS, &RetryPolicy::none())
                .await;
        assert!(matches!(
            result,
            Err(AgentError::SchemaViolation { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_endless_retrieval_is_bounded() {
        let tools = empty_tools();
        let executor = ToolExecutor::new(&tools);
        let provider =
            ScriptedProvider::new(vec![tool_turn("search_goals_catalog", r#"{"query":"x"}"#)]);

        let result =
            classification_loop(&provider, &mut request(), &executor, LIMITS, &RetryPolicy::none())
                .await;
        assert!(matches!(
            result,
            Err(AgentError::ToolLoopExceeded { max_rounds: 4 })
        ));
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_plain_fenced_answer_accepted() {
        let tools = empty_tools();
        let executor = ToolExecutor::new(&tools);
        let provider = ScriptedProvider::new(vec![text_turn(&format!("```json\n{VALID}\n```"))]);

        let outcome =
            classification_loop(&provider, &mut request(), &executor, LIMITS, &RetryPolicy::none())
                .await
                .unwrap_or_else(|e| panic!("loop failed: {e}"));
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.retrieval_calls, 0);
    }

    #[tokio::test]
    async fn test_plain_prose_answer_gets_correction_prompt() {
        let tools = empty_tools();
        let executor = ToolExecutor::new(&tools);
        let provider = ScriptedProvider::new(vec![
            text_turn("I think this is about health."),
            tool_turn("emit_classification", VALID),
        ]);
        let mut req = request();

        let outcome = classification_loop(&provider, &mut req, &executor, LIMITS, &RetryPolicy::none())
            .await
            .unwrap_or_else(|e| panic!("loop failed: {e}"));
        assert_eq!(outcome.corrections, 1);
        assert!(
            req.messages
                .iter()
                .any(|m| m.content.starts_with("Your answer could not be accepted"))
        );
    }

    /// Fails with a rate limit every time.
    struct RateLimitedProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for RateLimitedProvider {
        fn name(&self) -> &'static str {
            "rate-limited"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AgentError::ApiRequest {
                message: "429 Too Many Requests".to_string(),
                status: Some(429),
            })
        }
    }

    #[tokio::test]
    async fn test_model_unavailable_after_retries() {
        let tools = empty_tools();
        let executor = ToolExecutor::new(&tools);
        let provider = RateLimitedProvider {
            calls: AtomicUsize::new(0),
        };
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };

        let result = classification_loop(&provider, &mut request(), &executor, LIMITS, &retry).await;
        assert!(matches!(
            result,
            Err(AgentError::ModelUnavailable { attempts: 3, .. })
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {} "), "{}");
    }
}
