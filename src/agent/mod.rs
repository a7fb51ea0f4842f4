//! The Classification Agent.
//!
//! Drives a tool-calling model through a bounded loop that consults the
//! reference corpora and ends in one validated [`ClassificationRecord`].
//!
//! # Architecture
//!
//! ```text
//! text → Classifier (deadline, codebook)
//!   └── classification_loop (round + correction bounds)
//!       ├── LlmProvider::chat (retry with backoff)
//!       └── ToolExecutor
//!           ├── search_policy_handbook → RetrievalTools (k = 3)
//!           ├── search_goals_catalog   → RetrievalTools (k = 2)
//!           └── emit_classification    → validation gate
//! ```
//!
//! [`ClassificationRecord`]: crate::core::ClassificationRecord

pub mod agentic_loop;
pub mod classifier;
pub mod client;
pub mod config;
pub mod executor;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod tool;

// Re-export key types
pub use agentic_loop::{ClassificationPhase, LoopLimits, LoopOutcome, classification_loop};
pub use classifier::{ClassificationReport, Classifier};
pub use client::create_provider;
pub use config::{AgentConfig, AgentConfigBuilder, RetrievalConfig};
pub use executor::{ToolExecutor, ToolOutcome};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use tool::{EMIT_TOOL_NAME, ToolCall, ToolDefinition, ToolKind, ToolResult};
