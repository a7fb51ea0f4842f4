//! Tool definitions for the classification loop.
//!
//! The model may call exactly three tools, modelled as the closed set
//! [`ToolKind`]. Dispatch matches on the tag; names only exist at the wire
//! boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::{Classification, CycleStage, EvaluatedDomain, Methodology, SdgGoal};
use crate::retrieval::Corpus;

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match [`ToolKind::parse`]).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments for the tool.
    pub arguments: String,
}

/// The result of executing a tool call, sent back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this result corresponds to.
    pub tool_call_id: String,
    /// Result content (passages on success, error message on failure).
    pub content: String,
    /// Whether this result represents an error.
    pub is_error: bool,
}

/// Name of the terminal tool.
pub const EMIT_TOOL_NAME: &str = "emit_classification";

/// The capabilities offered to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// Semantic search over one reference corpus.
    Retrieve(Corpus),
    /// Deliver the final record through the validation gate.
    EmitResult,
}

impl ToolKind {
    /// Every tool, in the order they are offered.
    pub const ALL: [Self; 3] = [
        Self::Retrieve(Corpus::PolicyHandbook),
        Self::Retrieve(Corpus::GoalsCatalog),
        Self::EmitResult,
    ];

    /// Wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Retrieve(corpus) => corpus.tool_name(),
            Self::EmitResult => EMIT_TOOL_NAME,
        }
    }

    /// Resolves a tool name from the model, including the codebook's legacy
    /// Portuguese names.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "search_policy_handbook" | "busca_gestao_publica" => {
                Some(Self::Retrieve(Corpus::PolicyHandbook))
            }
            "search_goals_catalog" | "busca_ods_onu" => Some(Self::Retrieve(Corpus::GoalsCatalog)),
            EMIT_TOOL_NAME | "formatar_resposta_final" => Some(Self::EmitResult),
            _ => None,
        }
    }

    /// Function-calling definition for this tool.
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        match self {
            Self::Retrieve(corpus) => def_retrieve(corpus),
            Self::EmitResult => def_emit(),
        }
    }

    /// Definitions for every tool.
    #[must_use]
    pub fn definitions() -> Vec<ToolDefinition> {
        Self::ALL.iter().map(|k| k.definition()).collect()
    }
}

fn def_retrieve(corpus: Corpus) -> ToolDefinition {
    ToolDefinition {
        name: corpus.tool_name().to_string(),
        description: corpus.description().to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Free-text query, e.g. a summary of the work or a key phrase from it."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

fn def_emit() -> ToolDefinition {
    ToolDefinition {
        name: EMIT_TOOL_NAME.to_string(),
        description: "Deliver the final classification. Call exactly once, after consulting \
                      the reference tools. Every categorical field takes a single value from \
                      its list; the call is rejected with the reasons if any field is invalid."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Title of the work, verbatim."
                },
                "classification": {
                    "type": "string",
                    "enum": Classification::schema_values(),
                },
                "methodology": {
                    "type": "string",
                    "enum": Methodology::schema_values(),
                },
                "evaluated_domain": {
                    "type": "string",
                    "enum": EvaluatedDomain::schema_values(),
                    "description": "Single best-fit policy area."
                },
                "cycle_stage": {
                    "type": "string",
                    "enum": CycleStage::schema_values(),
                    "description": "Single best-fit stage of the public-policy cycle."
                },
                "goals": {
                    "type": "array",
                    "items": {
                        "type": "integer",
                        "minimum": SdgGoal::MIN,
                        "maximum": SdgGoal::MAX
                    },
                    "minItems": 1,
                    "description": "Related Sustainable Development Goal numbers, most relevant first."
                },
                "justification": {
                    "type": "string",
                    "description": "Short rationale tying the stage and goals to the text."
                }
            },
            "required": [
                "title",
                "classification",
                "methodology",
                "evaluated_domain",
                "cycle_stage",
                "goals",
                "justification"
            ],
            "additionalProperties": false
        }),
    }
}
