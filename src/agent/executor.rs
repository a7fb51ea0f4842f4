//! Tool executor for the classification loop.
//!
//! Resolves a model tool call to a [`ToolKind`] and either runs a retrieval
//! query or passes the candidate record through the validation gate.
//! Argument problems become error observations the model can react to;
//! an unreachable index aborts the request.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::{ClassificationRecord, SchemaViolation};
use crate::error::AgentError;
use crate::retrieval::{Corpus, RetrievalPassage, RetrievalTools};

use super::tool::{EMIT_TOOL_NAME, ToolCall, ToolKind, ToolResult};

/// Maximum raw byte length of tool argument JSON from the LLM.
const MAX_TOOL_ARGS_LEN: usize = 100_000;

/// What a tool call produced.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// Retrieval ran (or the call was malformed); feed the result back.
    Observation {
        /// Message for the model.
        result: ToolResult,
        /// Corpus queried, when the call was a valid retrieval.
        corpus: Option<Corpus>,
        /// Passages returned.
        passages: usize,
    },
    /// The emit gate accepted the record.
    Emitted(ClassificationRecord),
    /// The emit gate rejected the record.
    Rejected {
        /// Message for the model, listing what to fix.
        result: ToolResult,
        /// Validation failure.
        violation: SchemaViolation,
    },
}

/// Dispatches tool calls against the shared retrieval tools.
#[derive(Debug, Clone, Copy)]
pub struct ToolExecutor<'a> {
    tools: &'a RetrievalTools,
}

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}

impl<'a> ToolExecutor<'a> {
    /// Creates a new executor over the given retrieval tools.
    #[must_use]
    pub const fn new(tools: &'a RetrievalTools) -> Self {
        Self { tools }
    }

    /// Executes one tool call.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::RetrievalUnavailable`] when a reference index
    /// cannot be reached after retries. Every other failure is reported to
    /// the model as an error observation.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolOutcome, AgentError> {
        if call.arguments.len() > MAX_TOOL_ARGS_LEN {
            return Ok(error_observation(
                call,
                &format!(
                    "tool arguments too large ({} bytes, max {MAX_TOOL_ARGS_LEN})",
                    call.arguments.len()
                ),
            ));
        }

        match ToolKind::parse(&call.name) {
            Some(ToolKind::Retrieve(corpus)) => self.retrieve(call, corpus).await,
            Some(ToolKind::EmitResult) => Ok(emit(call)),
            None => {
                warn!(tool = %call.name, "model requested an unknown tool");
                Ok(error_observation(
                    call,
                    &format!(
                        "unknown tool `{}`; available: {}",
                        call.name,
                        ToolKind::ALL.map(ToolKind::name).join(", ")
                    ),
                ))
            }
        }
    }

    async fn retrieve(&self, call: &ToolCall, corpus: Corpus) -> Result<ToolOutcome, AgentError> {
        let args: QueryArgs = match serde_json::from_str(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                return Ok(error_observation(
                    call,
                    &format!("invalid arguments for `{}`: {e}", call.name),
                ));
            }
        };

        match self.tools.search(corpus, &args.query).await {
            Ok(passages) => {
                debug!(%corpus, count = passages.len(), "retrieval observation");
                Ok(ToolOutcome::Observation {
                    result: ToolResult {
                        tool_call_id: call.id.clone(),
                        content: format_passages(corpus, &passages),
                        is_error: false,
                    },
                    corpus: Some(corpus),
                    passages: passages.len(),
                })
            }
            Err(AgentError::InvalidInput { message }) => Ok(error_observation(call, &message)),
            Err(e) => Err(e),
        }
    }
}

fn emit(call: &ToolCall) -> ToolOutcome {
    let parsed = serde_json::from_str::<Value>(&call.arguments)
        .map_err(|e| SchemaViolation {
            issues: vec![format!("arguments are not valid JSON: {e}")],
        })
        .and_then(|value| ClassificationRecord::from_json(&value));

    match parsed {
        Ok(record) => ToolOutcome::Emitted(record),
        Err(violation) => ToolOutcome::Rejected {
            result: ToolResult {
                tool_call_id: call.id.clone(),
                content: format!(
                    "Rejected: {violation}. Fix these fields and call `{EMIT_TOOL_NAME}` again."
                ),
                is_error: true,
            },
            violation,
        },
    }
}

fn error_observation(call: &ToolCall, message: &str) -> ToolOutcome {
    ToolOutcome::Observation {
        result: ToolResult {
            tool_call_id: call.id.clone(),
            content: format!("Error: {message}"),
            is_error: true,
        },
        corpus: None,
        passages: 0,
    }
}

/// Renders passages as numbered, attributed snippets for the model.
#[must_use]
pub fn format_passages(corpus: Corpus, passages: &[RetrievalPassage]) -> String {
    if passages.is_empty() {
        return format!(
            "No passages in the {corpus} matched this query. Rely on the codebook definitions."
        );
    }
    let mut out = String::new();
    for p in passages {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&format!(
            "[{}] ({}, score {:.3}) {}",
            p.rank,
            p.source,
            p.score,
            p.text.trim()
        ));
    }
    out
}
