//! Output rendering for CLI commands.
//!
//! Text is for people; `json` pretty-prints one document; `ndjson` writes
//! one compact object per line so batches can be streamed into other tools.

use std::fmt::Write;
use std::time::Duration;

use serde::Serialize;

use crate::agent::ClassificationReport;
use crate::core::ClassificationRecord;
use crate::retrieval::{Corpus, RetrievalPassage};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
    /// Newline-delimited compact JSON.
    Ndjson,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "ndjson" | "jsonl" => Self::Ndjson,
            _ => Self::Text,
        }
    }

    /// Serializes `value` in this format's JSON flavour.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        let rendered = match self {
            Self::Ndjson => serde_json::to_string(value),
            Self::Json | Self::Text => serde_json::to_string_pretty(value),
        };
        rendered.unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {e}"}}"#))
    }
}

/// Renders a record as an aligned field list.
#[must_use]
pub fn format_record(record: &ClassificationRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Title:            {}", record.title());
    let _ = writeln!(out, "Classification:   {}", record.classification());
    let _ = writeln!(out, "Methodology:      {}", record.methodology());
    let _ = writeln!(out, "Evaluated domain: {}", record.evaluated_domain());
    let _ = writeln!(out, "Cycle stage:      {}", record.cycle_stage());
    let _ = writeln!(out, "Goals (SDG):      {}", record.goals_display());
    let _ = writeln!(out, "Justification:    {}", record.justification());
    out
}

/// Renders a record followed by a one-line run summary.
#[must_use]
pub fn format_report(report: &ClassificationReport) -> String {
    let mut out = format_record(&report.record);
    let _ = write!(
        out,
        "---\nModel: {} | Codebook: {} | Rounds: {} | Retrievals: {} | Corrections: {} | Tokens: {} | Time: {:.1}s",
        report.model,
        report.codebook_version.as_deref().unwrap_or("unversioned"),
        report.rounds,
        report.retrieval_calls,
        report.corrections,
        report.usage.total_tokens,
        Duration::from_millis(report.elapsed_ms).as_secs_f64()
    );
    out.push('\n');
    out
}

/// Renders retrieval passages with rank, score and source.
#[must_use]
pub fn format_passages(corpus: Corpus, query: &str, passages: &[RetrievalPassage]) -> String {
    if passages.is_empty() {
        return format!("No passages in the {corpus} matched \"{query}\".\n");
    }
    let mut out = format!("{} passage(s) from the {corpus}:\n", passages.len());
    for p in passages {
        let _ = write!(out, "\n[{}] score {:.3}  id {}", p.rank, p.score, p.id);
        if let Some(reference) = &p.reference {
            let _ = write!(out, "  ({reference})");
        }
        let _ = writeln!(out, "\n{}", truncate_str(p.text.trim(), 600));
    }
    out
}

/// Truncates on a character boundary, appending `...` when shortened.
#[must_use]
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return s.chars().take(max_chars).collect();
    }
    let head: String = s.chars().take(max_chars - 3).collect();
    format!("{head}...")
}
