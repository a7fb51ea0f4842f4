//! The Classification Agent.
//!
//! Owns the rubric, the model provider and the retrieval tools, and turns
//! one text into one validated [`ClassificationRecord`]. Holds no
//! per-request state, so a single instance serves concurrent requests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::core::ClassificationRecord;
use crate::error::AgentError;
use crate::retrieval::RetrievalTools;
use crate::retry::RetryPolicy;

use super::agentic_loop::{ClassificationPhase, LoopLimits, classification_loop};
use super::client::create_provider;
use super::config::AgentConfig;
use super::executor::ToolExecutor;
use super::message::{ChatRequest, TokenUsage, system_message, user_message};
use super::prompt::{PromptSet, build_classification_prompt};
use super::provider::LlmProvider;
use super::tool::ToolKind;

/// A validated record plus how it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    /// The validated record.
    pub record: ClassificationRecord,
    /// Model that produced it.
    pub model: String,
    /// Version line of the codebook used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codebook_version: Option<String>,
    /// Model calls made.
    pub rounds: usize,
    /// Retrieval queries answered.
    pub retrieval_calls: usize,
    /// Rejected emissions before acceptance.
    pub corrections: usize,
    /// Token usage over all rounds.
    pub usage: TokenUsage,
    /// Wall-clock time in milliseconds.
    pub elapsed_ms: u64,
    /// Phases visited, in order.
    pub trace: Vec<ClassificationPhase>,
}

/// Extracts a [`ClassificationRecord`] from free text.
#[derive(Clone)]
pub struct Classifier {
    provider: Arc<dyn LlmProvider>,
    tools: RetrievalTools,
    prompts: PromptSet,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    limits: LoopLimits,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Classifier {
    /// Assembles a classifier from explicit parts; limits and model come
    /// from `config`.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: RetrievalTools,
        prompts: PromptSet,
        config: &AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            prompts,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout,
            limits: LoopLimits {
                max_rounds: config.max_rounds,
                max_corrections: config.max_corrections,
            },
            retry: config.retry_policy(),
        }
    }

    /// Builds the production classifier: hosted model, hosted indices and
    /// the codebook from the configured prompt directory.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ConfigurationMissing`] for absent credentials
    /// and [`AgentError::UnsupportedProvider`] for an unknown provider.
    pub fn from_config(config: &AgentConfig) -> Result<Self, AgentError> {
        if let Some(name) = config.missing_credentials().first() {
            return Err(AgentError::ConfigurationMissing {
                name: (*name).to_string(),
            });
        }
        let provider: Arc<dyn LlmProvider> = Arc::from(create_provider(config)?);
        let tools = RetrievalTools::from_config(config)?;
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        info!(
            model = %config.model,
            codebook = prompts.source.as_ref().map_or_else(
                || "built-in".to_string(),
                |p| p.display().to_string()
            ),
            "classifier ready"
        );
        Ok(Self::new(provider, tools, prompts, config))
    }

    /// Overrides the per-request deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the retry policy for external calls.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.tools = self.tools.with_retry(retry);
        self.retry = retry;
        self
    }

    /// The retrieval tools this classifier offers the model.
    #[must_use]
    pub const fn tools(&self) -> &RetrievalTools {
        &self.tools
    }

    /// Classifies `text`, returning only the record.
    ///
    /// # Errors
    ///
    /// See [`Classifier::classify_with_report`].
    pub async fn classify(&self, text: &str) -> Result<ClassificationRecord, AgentError> {
        self.classify_with_report(text).await.map(|r| r.record)
    }

    /// Classifies `text` within the configured deadline.
    ///
    /// On expiry the in-flight model or retrieval call is dropped, so no
    /// later result can leak into the return value.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Timeout`], [`AgentError::SchemaViolation`],
    /// [`AgentError::ModelUnavailable`], [`AgentError::RetrievalUnavailable`],
    /// [`AgentError::ToolLoopExceeded`], or [`AgentError::InvalidInput`] for
    /// blank text.
    #[instrument(skip(self, text), fields(model = %self.model, text_len = text.len()))]
    pub async fn classify_with_report(
        &self,
        text: &str,
    ) -> Result<ClassificationReport, AgentError> {
        if text.trim().is_empty() {
            return Err(AgentError::InvalidInput {
                message: "text to classify is empty".to_string(),
            });
        }

        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.run(text))
            .await
            .unwrap_or(Err(AgentError::Timeout {
                elapsed: self.timeout,
            }));

        match result {
            Ok(mut report) => {
                report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(
                    rounds = report.rounds,
                    retrieval_calls = report.retrieval_calls,
                    corrections = report.corrections,
                    elapsed_ms = report.elapsed_ms,
                    "classification validated"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(phase = ?ClassificationPhase::Failed, error = %e, "classification failed");
                Err(e)
            }
        }
    }

    /// Classifies several texts concurrently, at most `concurrency` at a
    /// time. Results come back in input order; one failure does not stop
    /// the others.
    pub async fn classify_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        concurrency: usize,
    ) -> Vec<Result<ClassificationReport, AgentError>> {
        let semaphore = Semaphore::new(concurrency.max(1));
        debug!(count = texts.len(), concurrency, "classifying batch");
        join_all(texts.iter().map(|text| async {
            // The semaphore is never closed, so acquire only fails if that changes.
            let _permit = semaphore.acquire().await.ok();
            self.classify_with_report(text.as_ref()).await
        }))
        .await
    }

    async fn run(&self, text: &str) -> Result<ClassificationReport, AgentError> {
        let mut request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(&self.prompts.system_prompt()),
                user_message(&build_classification_prompt(text)),
            ],
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            tools: ToolKind::definitions(),
        };

        let executor = ToolExecutor::new(&self.tools);
        let outcome = classification_loop(
            self.provider.as_ref(),
            &mut request,
            &executor,
            self.limits,
            &self.retry,
        )
        .await?;

        Ok(ClassificationReport {
            record: outcome.record,
            model: self.model.clone(),
            codebook_version: self.prompts.version().map(str::to_string),
            rounds: outcome.rounds,
            retrieval_calls: outcome.retrieval_calls,
            corrections: outcome.corrections,
            usage: outcome.usage,
            elapsed_ms: 0,
            trace: outcome.trace,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::message::ChatResponse;
    use crate::agent::tool::ToolCall;
    use crate::retrieval::{HashEmbedder, InMemoryIndex};

    use async_trait::async_trait;

    fn config() -> AgentConfig {
        AgentConfig::builder()
            .api_key("sk-test")
            .pinecone_api_key("pc-test")
            .pinecone_environment("test")
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    fn tools() -> RetrievalTools {
        RetrievalTools::new(
            Arc::new(HashEmbedder::default()),
            Arc::new(InMemoryIndex::new("handbook")),
            Arc::new(InMemoryIndex::new("goals")),
        )
    }

    struct SlowProvider;

    #[async_trait]
    impl LlmProvider for SlowProvider {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ChatResponse {
                tool_calls: vec![ToolCall {
                    id: "late".to_string(),
                    name: "emit_classification".to_string(),
                    arguments: "{}".to_string(),
                }],
                ..ChatResponse::default()
            })
        }
    }

    /// Checks the request shape, then emits a fixed record.
    struct InspectingProvider;

    #[async_trait]
    impl LlmProvider for InspectingProvider {
        fn name(&self) -> &'static str {
            "inspecting"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            assert_eq!(request.temperature, Some(0.0));
            assert_eq!(request.tools.len(), 3);
            assert!(request.messages[0].content.contains("codebook-version"));
            assert!(request.messages[1].content.contains("<document>"));
            Ok(ChatResponse {
                tool_calls: vec![ToolCall {
                    id: "emit".to_string(),
                    name: "emit_classification".to_string(),
                    arguments: r#"{"output":{"titulo":"T","classificacao":"Técnica","metodologia":"Quantitativa","area_avaliada":"Saúde","etapa":"Justificativa","ods":"3; 10","resumo_justificativa":"J"}}"#.to_string(),
                }],
                ..ChatResponse::default()
            })
        }
    }

    #[tokio::test]
    async fn test_timeout_drops_in_flight_call() {
        let classifier = Classifier::new(
            Arc::new(SlowProvider),
            tools(),
            PromptSet::defaults(),
            &config(),
        )
        .with_timeout(Duration::from_millis(50));

        let started = Instant::now();
        let result = classifier.classify("Estudo sobre saneamento.").await;
        assert!(matches!(result, Err(AgentError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_blank_text_rejected() {
        let classifier = Classifier::new(
            Arc::new(SlowProvider),
            tools(),
            PromptSet::defaults(),
            &config(),
        );
        let result = classifier.classify("   \n").await;
        assert!(matches!(result, Err(AgentError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_report_carries_metadata() {
        let classifier = Classifier::new(
            Arc::new(InspectingProvider),
            tools(),
            PromptSet::defaults(),
            &config(),
        );
        let report = classifier
            .classify_with_report("Avaliação de custo-efetividade de um programa de saúde.")
            .await
            .unwrap_or_else(|e| panic!("classify failed: {e}"));

        assert_eq!(report.model, "gpt-4o");
        assert_eq!(report.codebook_version.as_deref(), Some("2019-insper-ias.1"));
        assert_eq!(report.rounds, 1);
        assert_eq!(report.record.goals_display(), "3; 10");
        assert_eq!(report.trace.last(), Some(&ClassificationPhase::Validated));
    }

    #[tokio::test]
    async fn test_batch_keeps_order_and_isolates_failures() {
        let classifier = Classifier::new(
            Arc::new(InspectingProvider),
            tools(),
            PromptSet::defaults(),
            &config(),
        );
        let results = classifier
            .classify_batch(&["Primeiro estudo.", " ", "Terceiro estudo."], 2)
            .await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(AgentError::InvalidInput { .. })));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = AgentConfig::builder().api_key("sk").build_lenient();
        let result = Classifier::from_config(&config);
        assert!(matches!(
            result,
            Err(AgentError::ConfigurationMissing { ref name }) if name == "PINECONE_API_KEY"
        ));
    }
}
