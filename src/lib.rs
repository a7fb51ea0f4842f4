//! # sdg-coder
//!
//! Retrieval-augmented coding of public-policy research.
//!
//! Given the text of a study, a tool-calling language model consults two
//! reference corpora (a policy-cycle handbook and the UN Sustainable
//! Development Goals catalog) and emits one [`ClassificationRecord`]:
//! classification type, methodology, evaluated domain, policy-cycle stage,
//! related goals, title and justification. Every record is validated
//! against closed label sets before it reaches the caller.
//!
//! ## Example
//!
//! ```no_run
//! use sdg_coder::{AgentConfig, Classifier};
//!
//! # async fn run() -> Result<(), sdg_coder::AgentError> {
//! let config = AgentConfig::from_env()?;
//! let classifier = Classifier::from_config(&config)?;
//! let record = classifier.classify("Estudo qualitativo sobre merenda escolar...").await?;
//! println!("{} / {}", record.cycle_stage(), record.goals_display());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod error;
pub mod retrieval;
pub mod retry;

pub use agent::{AgentConfig, ClassificationReport, Classifier, LlmProvider, PromptSet};
pub use core::{
    Classification, ClassificationRecord, CycleStage, EvaluatedDomain, Methodology,
    SchemaViolation, SdgGoal,
};
pub use error::{AgentError, Error, Result, RetrievalError};
pub use retrieval::{Corpus, RetrievalPassage, RetrievalTools};
pub use retry::RetryPolicy;
