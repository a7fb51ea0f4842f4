//! Retrieval over the two reference corpora.
//!
//! The policy-cycle evidence handbook and the SDG catalog are separate
//! vector indices. Each is exposed to the classification agent as one
//! named tool that takes free text and returns the top-k passages.
//!
//! ```text
//! query text → Embedder → vector → VectorIndex (handbook | goals) → RetrievalPassage[]
//! ```
//!
//! Index selection and `top_k` are fixed per [`Corpus`]; callers only supply
//! the query.

pub mod embedding;
pub mod memory;
pub mod pinecone;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::agent::config::AgentConfig;
use crate::error::{AgentError, RetrievalError};
use crate::retry::{RetryPolicy, retry_async};

pub use embedding::{Embedder, OpenAiEmbedder};
pub use memory::{HashEmbedder, InMemoryIndex};
pub use pinecone::PineconeIndex;

/// Passages returned by the handbook tool.
pub const HANDBOOK_TOP_K: usize = 3;
/// Passages returned by the goals tool.
pub const GOALS_TOP_K: usize = 2;
/// Longest query accepted by a retrieval tool.
const MAX_QUERY_LEN: usize = 2_000;

/// A reference corpus the agent can consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corpus {
    /// Evidence-based policy handbook describing the policy-cycle stages.
    PolicyHandbook,
    /// UN Sustainable Development Goals and targets catalog.
    GoalsCatalog,
}

impl Corpus {
    /// Both corpora.
    pub const ALL: [Self; 2] = [Self::PolicyHandbook, Self::GoalsCatalog];

    /// Tool name the model calls.
    #[must_use]
    pub const fn tool_name(self) -> &'static str {
        match self {
            Self::PolicyHandbook => "search_policy_handbook",
            Self::GoalsCatalog => "search_goals_catalog",
        }
    }

    /// Tool description the model uses to decide when to call it.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::PolicyHandbook => {
                "Useful for identifying which stage of the public-policy cycle relates to a text \
                 or project. Searches the evidence-based policy handbook and returns the most \
                 relevant passages."
            }
            Self::GoalsCatalog => {
                "Useful for identifying which UN Sustainable Development Goals (SDGs/ODS) and \
                 targets relate to a text or project. Searches the goals catalog and returns the \
                 most relevant passages."
            }
        }
    }

    /// Number of passages returned per query.
    #[must_use]
    pub const fn top_k(self) -> usize {
        match self {
            Self::PolicyHandbook => HANDBOOK_TOP_K,
            Self::GoalsCatalog => GOALS_TOP_K,
        }
    }

    /// Short name used on the command line.
    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::PolicyHandbook => "handbook",
            Self::GoalsCatalog => "goals",
        }
    }

    /// Parses a short name or tool name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "handbook" | "policy" | "livreto" | "search_policy_handbook" => {
                Some(Self::PolicyHandbook)
            }
            "goals" | "sdg" | "ods" | "search_goals_catalog" => Some(Self::GoalsCatalog),
            _ => None,
        }
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PolicyHandbook => "policy handbook",
            Self::GoalsCatalog => "goals catalog",
        })
    }
}

/// A ranked snippet of reference text. Transient: never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPassage {
    /// 1-based rank within the result set.
    pub rank: usize,
    /// Similarity score reported by the index.
    pub score: f32,
    /// Corpus the passage came from.
    pub source: Corpus,
    /// Document identifier in the index.
    pub id: String,
    /// Passage text.
    pub text: String,
    /// Original document reference, when the index stores one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// A raw match from a vector index, before attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    /// Document identifier.
    pub id: String,
    /// Similarity score (higher is closer).
    pub score: f32,
    /// Passage text.
    pub text: String,
    /// Original document reference, if stored.
    pub reference: Option<String>,
}

/// A read-only nearest-neighbour index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Human-readable index name for logging.
    fn name(&self) -> &str;

    /// Returns up to `top_k` matches ordered by descending score.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] if the index cannot be reached or answers
    /// with an error.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredMatch>, RetrievalError>;
}

/// The Retrieval Tool Provider: two named searches over fixed indices.
///
/// Shared across requests; holds no per-request state.
#[derive(Clone)]
pub struct RetrievalTools {
    embedder: Arc<dyn Embedder>,
    handbook: Arc<dyn VectorIndex>,
    goals: Arc<dyn VectorIndex>,
    retry: RetryPolicy,
    min_score: f32,
}

impl fmt::Debug for RetrievalTools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalTools")
            .field("handbook", &self.handbook.name())
            .field("goals", &self.goals.name())
            .field("retry", &self.retry)
            .field("min_score", &self.min_score)
            .finish_non_exhaustive()
    }
}

impl RetrievalTools {
    /// Creates a provider over the given embedder and indices.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        handbook: Arc<dyn VectorIndex>,
        goals: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            embedder,
            handbook,
            goals,
            retry: RetryPolicy::default(),
            min_score: 0.0,
        }
    }

    /// Builds the hosted-index provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ConfigurationMissing`] when vector-database
    /// credentials are absent.
    pub fn from_config(config: &AgentConfig) -> Result<Self, AgentError> {
        let retrieval = &config.retrieval;
        let pinecone_key = retrieval.require_api_key()?;

        let embedder = OpenAiEmbedder::new(config);
        let handbook = PineconeIndex::new(
            pinecone_key,
            &retrieval.controller_url,
            &retrieval.handbook_index,
            &retrieval.handbook_namespace,
            retrieval.handbook_host.clone(),
            config.timeout,
        )
        .map_err(|e| AgentError::InvalidInput {
            message: e.to_string(),
        })?;
        let goals = PineconeIndex::new(
            pinecone_key,
            &retrieval.controller_url,
            &retrieval.goals_index,
            &retrieval.goals_namespace,
            retrieval.goals_host.clone(),
            config.timeout,
        )
        .map_err(|e| AgentError::InvalidInput {
            message: e.to_string(),
        })?;

        Ok(Self::new(Arc::new(embedder), Arc::new(handbook), Arc::new(goals))
            .with_retry(config.retry_policy())
            .with_min_score(retrieval.min_score))
    }

    /// Overrides the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Drops matches scoring below `min_score`.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Queries the policy-cycle handbook (at most 3 passages).
    ///
    /// # Errors
    ///
    /// See [`RetrievalTools::search`].
    pub async fn search_policy_handbook(
        &self,
        query: &str,
    ) -> Result<Vec<RetrievalPassage>, AgentError> {
        self.search(Corpus::PolicyHandbook, query).await
    }

    /// Queries the goals catalog (at most 2 passages).
    ///
    /// # Errors
    ///
    /// See [`RetrievalTools::search`].
    pub async fn search_goals_catalog(
        &self,
        query: &str,
    ) -> Result<Vec<RetrievalPassage>, AgentError> {
        self.search(Corpus::GoalsCatalog, query).await
    }

    /// Queries one corpus.
    ///
    /// An empty result (nothing clears the relevance threshold) is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidInput`] for a blank or oversized query and
    /// [`AgentError::RetrievalUnavailable`] when the embedder or index stays
    /// unreachable after retries or rejects the request.
    #[instrument(skip(self, query), fields(corpus = %corpus, query_len = query.len()))]
    pub async fn search(
        &self,
        corpus: Corpus,
        query: &str,
    ) -> Result<Vec<RetrievalPassage>, AgentError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AgentError::InvalidInput {
                message: "retrieval query cannot be empty".to_string(),
            });
        }
        if query.len() > MAX_QUERY_LEN {
            return Err(AgentError::InvalidInput {
                message: format!(
                    "retrieval query too long ({} bytes, max {MAX_QUERY_LEN})",
                    query.len()
                ),
            });
        }

        let index = match corpus {
            Corpus::PolicyHandbook => &self.handbook,
            Corpus::GoalsCatalog => &self.goals,
        };
        let top_k = corpus.top_k();
        let embedder = &self.embedder;

        let matches = retry_async(
            &self.retry,
            corpus.tool_name(),
            RetrievalError::is_transient,
            move || async move {
                let vector = embedder.embed(query).await?;
                index.query(&vector, top_k).await
            },
        )
        .await
        .map_err(|failure| AgentError::RetrievalUnavailable {
            corpus,
            attempts: failure.attempts,
            message: failure.error.to_string(),
        })?;

        let passages: Vec<RetrievalPassage> = matches
            .into_iter()
            .filter(|m| m.score >= self.min_score)
            .take(top_k)
            .enumerate()
            .map(|(i, m)| RetrievalPassage {
                rank: i + 1,
                score: m.score,
                source: corpus,
                id: m.id,
                text: m.text,
                reference: m.reference,
            })
            .collect();

        debug!(count = passages.len(), "retrieval complete");
        Ok(passages)
    }
}
