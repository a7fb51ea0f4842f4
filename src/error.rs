//! Error types for sdg-coder.
//!
//! [`AgentError`] is the failure taxonomy a caller of
//! [`Classifier::classify`](crate::agent::Classifier::classify) sees.
//! [`RetrievalError`] describes failures at the vector-index boundary and is
//! folded into [`AgentError::RetrievalUnavailable`] once retries run out.

use std::time::Duration;

use thiserror::Error;

use crate::retrieval::Corpus;

/// Crate-level result alias used by the CLI layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for CLI commands.
#[derive(Error, Debug)]
pub enum Error {
    /// Classification or agent failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Retrieval failure outside the agent loop.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Command-level failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the classification agent.
#[derive(Error, Debug)]
pub enum AgentError {
    /// A required credential or setting is absent.
    #[error("configuration missing: {name} is not set")]
    ConfigurationMissing {
        /// Environment variable or setting name.
        name: String,
    },

    /// The inference provider stayed unreachable or rate-limited after retries.
    #[error("model unavailable after {attempts} attempt(s): {message}")]
    ModelUnavailable {
        /// Attempts made before giving up.
        attempts: u32,
        /// Last provider error.
        message: String,
    },

    /// A reference index stayed unreachable after retries.
    #[error("retrieval unavailable for {corpus} after {attempts} attempt(s): {message}")]
    RetrievalUnavailable {
        /// Corpus that could not be queried.
        corpus: Corpus,
        /// Attempts made before giving up.
        attempts: u32,
        /// Last retrieval error.
        message: String,
    },

    /// No valid record was produced within the correction budget.
    #[error("schema violation after {attempts} correction attempt(s): {message}")]
    SchemaViolation {
        /// Rejected emissions.
        attempts: usize,
        /// Last validation failure.
        message: String,
    },

    /// The request exceeded its deadline.
    #[error("classification timed out after {:.1}s", .elapsed.as_secs_f64())]
    Timeout {
        /// Configured deadline.
        elapsed: Duration,
    },

    /// The model kept reasoning past the round limit.
    #[error("no result emitted within {max_rounds} model round(s)")]
    ToolLoopExceeded {
        /// Round limit that was hit.
        max_rounds: usize,
    },

    /// A single provider call failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error message.
        message: String,
        /// HTTP status when known.
        status: Option<u16>,
    },

    /// Unknown provider name in configuration.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name.
        name: String,
    },

    /// Caller input rejected before any external call.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Why the input was rejected.
        message: String,
    },
}

impl AgentError {
    /// Returns `true` if the failure is worth retrying.
    ///
    /// Transport errors (no status), rate limiting and server errors are
    /// transient; everything else is final.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::ApiRequest { status: None, .. } => true,
            Self::ApiRequest {
                status: Some(code), ..
            } => *code == 408 || *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Errors from the embedding provider or the vector index.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Index or embedding service unreachable, timed out or rate-limited.
    #[error("index unreachable: {0}")]
    Unavailable(String),

    /// Credentials rejected.
    #[error("authentication rejected: {0}")]
    Authentication(String),

    /// Non-retryable error response.
    #[error("index responded with status {status}: {message}")]
    Response {
        /// HTTP status.
        status: u16,
        /// Response body.
        message: String,
    },

    /// Embedding request failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Client-side misconfiguration (bad URL, unknown index).
    #[error("retrieval configuration error: {0}")]
    Configuration(String),
}

impl RetrievalError {
    /// Returns `true` if the failure is worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<reqwest::Error> for RetrievalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Unavailable(err.to_string())
        } else if err.is_decode() {
            Self::Response {
                status: 200,
                message: format!("malformed response body: {err}"),
            }
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

/// Errors raised by CLI commands.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command could not complete.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Output could not be rendered.
    #[error("output formatting failed: {0}")]
    OutputFormat(String),

    /// Invalid combination of arguments.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Some inputs of a batch failed; `output` still holds every entry.
    #[error("{failed} of {total} input(s) failed")]
    PartialFailure {
        /// Rendered results, failures included.
        output: String,
        /// Inputs that failed.
        failed: usize,
        /// Inputs processed.
        total: usize,
    },
}
