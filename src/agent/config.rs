//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.
//! The resolved [`AgentConfig`] is built once at startup and passed by
//! reference into the classifier and the retrieval tools; request-handling
//! code never reads the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AgentError;
use crate::retrieval::pinecone::DEFAULT_CONTROLLER_URL;
use crate::retry::RetryPolicy;

/// Environment variable holding the model API key.
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable holding the vector-database API key.
pub const ENV_PINECONE_API_KEY: &str = "PINECONE_API_KEY";
/// Environment variable holding the vector-database environment identifier.
pub const ENV_PINECONE_ENVIRONMENT: &str = "PINECONE_ENVIRONMENT";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o";
/// Default embedding model (the indices were built with it).
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default max retries after the first attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default model rounds per classification.
const DEFAULT_MAX_ROUNDS: usize = 8;
/// Default rejected emissions tolerated before giving up.
const DEFAULT_MAX_CORRECTIONS: usize = 3;
/// Default completion budget per model round.
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Handbook index and namespace.
pub const DEFAULT_HANDBOOK_INDEX: &str = "livreto-base-evidencia";
/// Handbook namespace.
pub const DEFAULT_HANDBOOK_NAMESPACE: &str = "livreto-metricis";
/// Goals catalog index.
pub const DEFAULT_GOALS_INDEX: &str = "ods-onu";
/// Goals catalog namespace.
pub const DEFAULT_GOALS_NAMESPACE: &str = "catalogo-ods";

/// Vector-database settings for the two corpora.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Vector-database API key.
    pub api_key: Option<String>,
    /// Vector-database environment identifier.
    pub environment: Option<String>,
    /// Control-plane URL used to resolve index hosts.
    pub controller_url: String,
    /// Handbook index name.
    pub handbook_index: String,
    /// Handbook namespace.
    pub handbook_namespace: String,
    /// Explicit handbook data-plane host (skips resolution).
    pub handbook_host: Option<String>,
    /// Goals catalog index name.
    pub goals_index: String,
    /// Goals catalog namespace.
    pub goals_namespace: String,
    /// Explicit goals data-plane host (skips resolution).
    pub goals_host: Option<String>,
    /// Matches scoring below this are dropped.
    pub min_score: f32,
}

impl RetrievalConfig {
    /// Returns the vector-database API key, checking the environment
    /// identifier is present too.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ConfigurationMissing`] naming the first absent
    /// setting.
    pub fn require_api_key(&self) -> Result<&str, AgentError> {
        let key = non_blank(self.api_key.as_deref()).ok_or_else(|| missing(ENV_PINECONE_API_KEY))?;
        non_blank(self.environment.as_deref()).ok_or_else(|| missing(ENV_PINECONE_ENVIRONMENT))?;
        Ok(key)
    }
}

/// Configuration for the classification agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Chat model used for classification.
    pub model: String,
    /// Embedding model used for retrieval queries.
    pub embedding_model: String,
    /// Maximum completion tokens per model round.
    pub max_tokens: u32,
    /// Deadline for one whole classification (and each HTTP call).
    pub timeout: Duration,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Model rounds allowed before the loop is abandoned.
    pub max_rounds: usize,
    /// Rejected emissions allowed before the loop is abandoned.
    pub max_corrections: usize,
    /// Directory containing the codebook override.
    pub prompt_dir: Option<PathBuf>,
    /// Vector-database settings.
    pub retrieval: RetrievalConfig,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ConfigurationMissing`] if a required credential
    /// is absent.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Retry policy derived from `max_retries`.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.saturating_add(1),
            ..RetryPolicy::default()
        }
    }

    /// Names of required credentials that are not set.
    #[must_use]
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.trim().is_empty() {
            missing.push(ENV_OPENAI_API_KEY);
        }
        if non_blank(self.retrieval.api_key.as_deref()).is_none() {
            missing.push(ENV_PINECONE_API_KEY);
        }
        if non_blank(self.retrieval.environment.as_deref()).is_none() {
            missing.push(ENV_PINECONE_ENVIRONMENT);
        }
        missing
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|v| v.trim().parse().ok())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn missing(name: &str) -> AgentError {
    AgentError::ConfigurationMissing {
        name: name.to_string(),
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    embedding_model: Option<String>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    max_rounds: Option<usize>,
    max_corrections: Option<usize>,
    prompt_dir: Option<PathBuf>,
    pinecone_api_key: Option<String>,
    pinecone_environment: Option<String>,
    controller_url: Option<String>,
    handbook_index: Option<String>,
    handbook_namespace: Option<String>,
    handbook_host: Option<String>,
    goals_index: Option<String>,
    goals_namespace: Option<String>,
    goals_host: Option<String>,
    min_score: Option<f32>,
}

impl AgentConfigBuilder {
    /// Populates unset fields from process environment variables.
    #[must_use]
    pub fn from_env(self) -> Self {
        self.from_lookup(|name| std::env::var(name).ok())
    }

    /// Populates unset fields from an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }

        fill(&mut self.provider, lookup("SDG_CODER_PROVIDER"));
        fill(&mut self.api_key, lookup(ENV_OPENAI_API_KEY));
        fill(&mut self.base_url, lookup("OPENAI_BASE_URL"));
        fill(&mut self.model, lookup("SDG_CODER_MODEL"));
        fill(&mut self.embedding_model, lookup("SDG_CODER_EMBEDDING_MODEL"));
        fill(&mut self.max_tokens, parse_var(&lookup, "SDG_CODER_MAX_TOKENS"));
        fill(
            &mut self.timeout,
            parse_var(&lookup, "SDG_CODER_TIMEOUT_SECS").map(Duration::from_secs),
        );
        fill(&mut self.max_retries, parse_var(&lookup, "SDG_CODER_MAX_RETRIES"));
        fill(&mut self.max_rounds, parse_var(&lookup, "SDG_CODER_MAX_ROUNDS"));
        fill(&mut self.max_corrections, parse_var(&lookup, "SDG_CODER_MAX_CORRECTIONS"));
        fill(
            &mut self.prompt_dir,
            lookup("SDG_CODER_PROMPT_DIR").map(PathBuf::from),
        );
        fill(&mut self.pinecone_api_key, lookup(ENV_PINECONE_API_KEY));
        fill(&mut self.pinecone_environment, lookup(ENV_PINECONE_ENVIRONMENT));
        fill(&mut self.controller_url, lookup("PINECONE_CONTROLLER_URL"));
        fill(&mut self.handbook_index, lookup("SDG_CODER_HANDBOOK_INDEX"));
        fill(
            &mut self.handbook_namespace,
            lookup("SDG_CODER_HANDBOOK_NAMESPACE"),
        );
        fill(&mut self.handbook_host, lookup("PINECONE_HANDBOOK_HOST"));
        fill(&mut self.goals_index, lookup("SDG_CODER_GOALS_INDEX"));
        fill(&mut self.goals_namespace, lookup("SDG_CODER_GOALS_NAMESPACE"));
        fill(&mut self.goals_host, lookup("PINECONE_GOALS_HOST"));
        fill(&mut self.min_score, parse_var(&lookup, "SDG_CODER_MIN_SCORE"));
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the model API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Sets the completion budget per round.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the max retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the model round limit.
    #[must_use]
    pub const fn max_rounds(mut self, n: usize) -> Self {
        self.max_rounds = Some(n);
        self
    }

    /// Sets the correction limit.
    #[must_use]
    pub const fn max_corrections(mut self, n: usize) -> Self {
        self.max_corrections = Some(n);
        self
    }

    /// Sets the codebook directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Sets the vector-database API key.
    #[must_use]
    pub fn pinecone_api_key(mut self, key: impl Into<String>) -> Self {
        self.pinecone_api_key = Some(key.into());
        self
    }

    /// Sets the vector-database environment identifier.
    #[must_use]
    pub fn pinecone_environment(mut self, env: impl Into<String>) -> Self {
        self.pinecone_environment = Some(env.into());
        self
    }

    /// Sets the control-plane URL.
    #[must_use]
    pub fn controller_url(mut self, url: impl Into<String>) -> Self {
        self.controller_url = Some(url.into());
        self
    }

    /// Pins the handbook data-plane host.
    #[must_use]
    pub fn handbook_host(mut self, host: impl Into<String>) -> Self {
        self.handbook_host = Some(host.into());
        self
    }

    /// Pins the goals data-plane host.
    #[must_use]
    pub fn goals_host(mut self, host: impl Into<String>) -> Self {
        self.goals_host = Some(host.into());
        self
    }

    /// Sets the relevance threshold.
    #[must_use]
    pub const fn min_score(mut self, score: f32) -> Self {
        self.min_score = Some(score);
        self
    }

    /// Builds the [`AgentConfig`], requiring every credential.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ConfigurationMissing`] naming the first absent
    /// credential.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let config = self.build_lenient();
        if let Some(name) = config.missing_credentials().first() {
            return Err(missing(name));
        }
        Ok(config)
    }

    /// Builds without checking credentials; absent keys become empty.
    ///
    /// Used for reporting the resolved configuration.
    #[must_use]
    pub fn build_lenient(self) -> AgentConfig {
        AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key: self.api_key.unwrap_or_default(),
            base_url: self.base_url,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            embedding_model: self
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            max_rounds: self.max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS).max(1),
            max_corrections: self.max_corrections.unwrap_or(DEFAULT_MAX_CORRECTIONS),
            prompt_dir: self.prompt_dir,
            retrieval: RetrievalConfig {
                api_key: self.pinecone_api_key,
                environment: self.pinecone_environment,
                controller_url: self
                    .controller_url
                    .unwrap_or_else(|| DEFAULT_CONTROLLER_URL.to_string()),
                handbook_index: self
                    .handbook_index
                    .unwrap_or_else(|| DEFAULT_HANDBOOK_INDEX.to_string()),
                handbook_namespace: self
                    .handbook_namespace
                    .unwrap_or_else(|| DEFAULT_HANDBOOK_NAMESPACE.to_string()),
                handbook_host: self.handbook_host,
                goals_index: self
                    .goals_index
                    .unwrap_or_else(|| DEFAULT_GOALS_INDEX.to_string()),
                goals_namespace: self
                    .goals_namespace
                    .unwrap_or_else(|| DEFAULT_GOALS_NAMESPACE.to_string()),
                goals_host: self.goals_host,
                min_score: self.min_score.unwrap_or(0.0),
            },
        }
    }
}
