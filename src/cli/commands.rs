//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

#![allow(clippy::format_push_string)]

use std::fmt::Write as FmtWrite;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::agent::config::{AgentConfig, AgentConfigBuilder};
use crate::agent::prompt::PromptSet;
use crate::agent::{ClassificationReport, Classifier};
use crate::cli::output::{OutputFormat, format_passages, format_record, format_report};
use crate::cli::parser::{Cli, Commands};
use crate::core::ClassificationRecord;
use crate::error::{AgentError, CommandError, Result};
use crate::retrieval::{Corpus, RetrievalTools};

// ==================== Parameter Structs ====================

/// Parameters for the classify command.
#[derive(Debug, Clone, Default)]
pub struct ClassifyParams<'a> {
    /// Files holding one work each.
    pub files: &'a [PathBuf],
    /// Inline text, used instead of files.
    pub text: Option<&'a str>,
    /// Per-request deadline in seconds.
    pub timeout_secs: Option<u64>,
    /// Chat model override.
    pub model: Option<&'a str>,
    /// Round limit override.
    pub max_rounds: Option<usize>,
    /// Maximum concurrent requests.
    pub concurrency: usize,
    /// Codebook directory override.
    pub prompt_dir: Option<&'a Path>,
    /// Emit the full report instead of the bare record.
    pub report: bool,
}

/// One work to classify.
#[derive(Debug, Clone)]
struct Input {
    label: String,
    text: String,
}

/// Per-input outcome in machine-readable output.
#[derive(Debug, Serialize)]
struct ClassifyEntry<'a> {
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<&'a ClassificationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a ClassificationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Executes the CLI command.
///
/// # Arguments
///
/// * `cli` - Parsed CLI arguments.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Classify {
            files,
            text,
            timeout,
            model,
            max_rounds,
            concurrency,
            prompt_dir,
            report,
        } => {
            let params = ClassifyParams {
                files,
                text: text.as_deref(),
                timeout_secs: *timeout,
                model: model.as_deref(),
                max_rounds: *max_rounds,
                concurrency: *concurrency,
                prompt_dir: prompt_dir.as_deref(),
                report: *report,
            };
            let config = classify_config(AgentConfig::builder().from_env(), &params)?;
            cmd_classify(&config, &params, format)
        }
        Commands::Search { corpus, query } => {
            let config = AgentConfig::builder().from_env().build()?;
            cmd_search(&config, corpus, query, format)
        }
        Commands::Validate { files } => cmd_validate(files, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
        Commands::Config => cmd_config(&AgentConfig::builder().from_env().build_lenient(), format),
    }
}

/// Applies classify flags over an environment-backed builder.
fn classify_config(
    mut builder: AgentConfigBuilder,
    params: &ClassifyParams<'_>,
) -> Result<AgentConfig> {
    if let Some(secs) = params.timeout_secs {
        if secs == 0 {
            return Err(CommandError::InvalidArguments("--timeout must be positive".to_string()).into());
        }
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(model) = params.model {
        builder = builder.model(model);
    }
    if let Some(rounds) = params.max_rounds {
        builder = builder.max_rounds(rounds);
    }
    if let Some(dir) = params.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    Ok(builder.build()?)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

// ==================== Classify ====================

fn cmd_classify(
    config: &AgentConfig,
    params: &ClassifyParams<'_>,
    format: OutputFormat,
) -> Result<String> {
    let inputs = read_inputs(params)?;
    let classifier = Classifier::from_config(config)?;

    let rt = runtime()?;
    let texts: Vec<&str> = inputs.iter().map(|i| i.text.as_str()).collect();
    let mut results = rt.block_on(classifier.classify_batch(texts.as_slice(), params.concurrency));

    // A single input surfaces its failure directly so the exit status tells.
    if results.len() == 1 && results[0].is_err() {
        if let Some(Err(e)) = results.pop() {
            return Err(e.into());
        }
    }

    let output = render_classifications(&inputs, &results, params.report, format)?;
    fail_if_any(output, &results)
}

/// Keeps the rendered batch but turns any failed input into a failing status.
fn fail_if_any(
    output: String,
    results: &[std::result::Result<ClassificationReport, AgentError>],
) -> Result<String> {
    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed == 0 {
        return Ok(output);
    }
    Err(CommandError::PartialFailure {
        output,
        failed,
        total: results.len(),
    }
    .into())
}

fn read_inputs(params: &ClassifyParams<'_>) -> Result<Vec<Input>> {
    if let Some(text) = params.text {
        return Ok(vec![Input {
            label: "--text".to_string(),
            text: text.to_string(),
        }]);
    }

    if params.files.is_empty() {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        if text.trim().is_empty() {
            return Err(CommandError::InvalidArguments(
                "no input: pass files, --text, or pipe text on stdin".to_string(),
            )
            .into());
        }
        return Ok(vec![Input {
            label: "stdin".to_string(),
            text,
        }]);
    }

    params
        .files
        .iter()
        .map(|path| {
            let text = std::fs::read_to_string(path).map_err(|e| {
                CommandError::ExecutionFailed(format!("Failed to read {}: {e}", path.display()))
            })?;
            Ok(Input {
                label: path.display().to_string(),
                text,
            })
        })
        .collect()
}

fn render_classifications(
    inputs: &[Input],
    results: &[std::result::Result<ClassificationReport, AgentError>],
    with_report: bool,
    format: OutputFormat,
) -> Result<String> {
    let entries: Vec<ClassifyEntry<'_>> = inputs
        .iter()
        .zip(results)
        .map(|(input, result)| match result {
            Ok(report) => ClassifyEntry {
                input: &input.label,
                record: (!with_report).then_some(&report.record),
                report: with_report.then_some(report),
                error: None,
            },
            Err(e) => ClassifyEntry {
                input: &input.label,
                record: None,
                report: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    match format {
        OutputFormat::Text => {
            let single = inputs.len() == 1;
            let mut output = String::new();
            for (input, result) in inputs.iter().zip(results) {
                if !single {
                    output.push_str(&format!("== {}\n", input.label));
                }
                match result {
                    Ok(report) if with_report => output.push_str(&format_report(report)),
                    Ok(report) => output.push_str(&format_record(&report.record)),
                    Err(e) => output.push_str(&format!("Error: {e}\n")),
                }
                if !single {
                    output.push('\n');
                }
            }
            Ok(output)
        }
        OutputFormat::Json => {
            if let [entry] = entries.as_slice() {
                Ok(match (entry.report, entry.record) {
                    (Some(report), _) => format.to_json(report),
                    (None, Some(record)) => format.to_json(record),
                    (None, None) => format.to_json(entry),
                })
            } else {
                Ok(format.to_json(&entries))
            }
        }
        OutputFormat::Ndjson => Ok(entries
            .iter()
            .map(|entry| format.to_json(entry))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

// ==================== Search ====================

fn cmd_search(config: &AgentConfig, corpus: &str, query: &str, format: OutputFormat) -> Result<String> {
    let corpus = Corpus::parse(corpus).ok_or_else(|| {
        CommandError::InvalidArguments(format!(
            "unknown corpus `{corpus}`; expected one of: {}",
            Corpus::ALL.map(Corpus::short_name).join(", ")
        ))
    })?;
    let tools = RetrievalTools::from_config(config)?;

    let rt = runtime()?;
    let passages = rt.block_on(tools.search(corpus, query))?;

    match format {
        OutputFormat::Text => Ok(format_passages(corpus, query, &passages)),
        OutputFormat::Json | OutputFormat::Ndjson => {
            let json = serde_json::json!({
                "corpus": corpus,
                "tool": corpus.tool_name(),
                "query": query,
                "passages": passages,
            });
            Ok(format.to_json(&json))
        }
    }
}

// ==================== Validate ====================

/// Validation outcome for one record in one file.
#[derive(Debug, Serialize)]
struct ValidationEntry {
    file: String,
    index: usize,
    valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<String>,
}

fn cmd_validate(files: &[PathBuf], format: OutputFormat) -> Result<String> {
    let mut entries = Vec::new();
    for path in files {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CommandError::ExecutionFailed(format!("Failed to read {}: {e}", path.display()))
        })?;
        for (index, value) in parse_records(&content).into_iter().enumerate() {
            let issues = match value.map(|v| ClassificationRecord::from_json(&v)) {
                Ok(Ok(_)) => Vec::new(),
                Ok(Err(violation)) => violation.issues,
                Err(e) => vec![format!("not valid JSON: {e}")],
            };
            entries.push(ValidationEntry {
                file: path.display().to_string(),
                index,
                valid: issues.is_empty(),
                issues,
            });
        }
    }

    let invalid = entries.iter().filter(|e| !e.valid).count();
    let rendered = match format {
        OutputFormat::Text => {
            let mut output = String::new();
            for entry in &entries {
                if entry.valid {
                    let _ = writeln!(output, "ok      {}#{}", entry.file, entry.index);
                } else {
                    let _ = writeln!(output, "invalid {}#{}", entry.file, entry.index);
                    for issue in &entry.issues {
                        let _ = writeln!(output, "  - {issue}");
                    }
                }
            }
            let _ = writeln!(
                output,
                "{} record(s) checked, {invalid} invalid",
                entries.len()
            );
            output
        }
        OutputFormat::Json => format.to_json(&entries),
        OutputFormat::Ndjson => entries
            .iter()
            .map(|e| format.to_json(e))
            .collect::<Vec<_>>()
            .join("\n"),
    };

    if invalid > 0 {
        return Err(CommandError::ExecutionFailed(rendered.trim_end().to_string()).into());
    }
    Ok(rendered)
}

/// Splits file content into records: one object, an array, or NDJSON lines.
fn parse_records(content: &str) -> Vec<std::result::Result<Value, serde_json::Error>> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(items)) => items.into_iter().map(Ok).collect(),
        Ok(value) => vec![Ok(value)],
        Err(whole) => {
            let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
            if lines.len() <= 1 {
                return vec![Err(whole)];
            }
            lines.into_iter().map(serde_json::from_str).collect()
        }
    }
}

// ==================== Prompts & Config ====================

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write codebook: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                Ok(format!("Codebook already exists in: {}\n", target_dir.display()))
            } else {
                let mut output = format!("Wrote default codebook to: {}\n", target_dir.display());
                for path in &written {
                    output.push_str(&format!("  {}\n", path.display()));
                }
                output.push_str(
                    "\nEdit it to change the rubric; bump the codebook-version line when you do.\n",
                );
                Ok(output)
            }
        }
        OutputFormat::Json | OutputFormat::Ndjson => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}

/// Shows a credential's first characters only.
fn mask(secret: Option<&str>) -> String {
    match secret {
        None => "(missing)".to_string(),
        Some(s) if s.chars().count() <= 8 => "****".to_string(),
        Some(s) => format!("{}****", s.chars().take(4).collect::<String>()),
    }
}

fn cmd_config(config: &AgentConfig, format: OutputFormat) -> Result<String> {
    let missing = config.missing_credentials();
    let retrieval = &config.retrieval;
    let api_key = (!config.api_key.trim().is_empty()).then_some(config.api_key.as_str());

    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "provider:           {}", config.provider);
            let _ = writeln!(output, "model:              {}", config.model);
            let _ = writeln!(output, "embedding model:    {}", config.embedding_model);
            let _ = writeln!(output, "openai api key:     {}", mask(api_key));
            if let Some(url) = &config.base_url {
                let _ = writeln!(output, "openai base url:    {url}");
            }
            let _ = writeln!(output, "pinecone api key:   {}", mask(retrieval.api_key.as_deref()));
            let _ = writeln!(
                output,
                "pinecone env:       {}",
                retrieval.environment.as_deref().unwrap_or("(missing)")
            );
            let _ = writeln!(
                output,
                "handbook index:     {} / {}",
                retrieval.handbook_index, retrieval.handbook_namespace
            );
            let _ = writeln!(
                output,
                "goals index:        {} / {}",
                retrieval.goals_index, retrieval.goals_namespace
            );
            let _ = writeln!(output, "timeout:            {}s", config.timeout.as_secs());
            let _ = writeln!(output, "max retries:        {}", config.max_retries);
            let _ = writeln!(output, "max rounds:         {}", config.max_rounds);
            let _ = writeln!(output, "max corrections:    {}", config.max_corrections);
            let prompts = PromptSet::load(config.prompt_dir.as_deref());
            let _ = writeln!(
                output,
                "codebook:           {} ({})",
                prompts
                    .source
                    .as_ref()
                    .map_or_else(|| "built-in".to_string(), |p| p.display().to_string()),
                prompts.version().unwrap_or("unversioned")
            );
            if !missing.is_empty() {
                let _ = writeln!(output, "\nMissing: {}", missing.join(", "));
            }
            Ok(output)
        }
        OutputFormat::Json | OutputFormat::Ndjson => {
            let json = serde_json::json!({
                "provider": config.provider,
                "model": config.model,
                "embedding_model": config.embedding_model,
                "openai_api_key": mask(api_key),
                "base_url": config.base_url,
                "pinecone_api_key": mask(retrieval.api_key.as_deref()),
                "pinecone_environment": retrieval.environment,
                "handbook": { "index": retrieval.handbook_index, "namespace": retrieval.handbook_namespace },
                "goals": { "index": retrieval.goals_index, "namespace": retrieval.goals_namespace },
                "timeout_secs": config.timeout.as_secs(),
                "max_retries": config.max_retries,
                "max_rounds": config.max_rounds,
                "max_corrections": config.max_corrections,
                "missing": missing,
            });
            Ok(format.to_json(&json))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    const VALID: &str = r#"{"title":"T","classification":"Academic","methodology":"Mixed","evaluated_domain":"Health","cycle_stage":"Solution","goals":[3],"justification":"J"}"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap_or_else(|_| unreachable!());
        path
    }

    #[test]
    fn test_validate_accepts_object_array_and_ndjson() {
        let dir = TempDir::new().unwrap_or_else(|_| unreachable!());
        let files = vec![
            write(&dir, "one.json", VALID),
            write(&dir, "many.json", &format!("[{VALID},{VALID}]")),
            write(&dir, "lines.ndjson", &format!("{VALID}\n\n{VALID}\n")),
        ];
        let output =
            cmd_validate(&files, OutputFormat::Text).unwrap_or_else(|e| panic!("validate: {e}"));
        assert!(output.contains("5 record(s) checked, 0 invalid"));
    }

    #[test]
    fn test_validate_reports_issues() {
        let dir = TempDir::new().unwrap_or_else(|_| unreachable!());
        let bad = VALID.replace("Academic", "Hybrid");
        let files = vec![write(&dir, "bad.json", &bad)];
        match cmd_validate(&files, OutputFormat::Text) {
            Err(Error::Command(CommandError::ExecutionFailed(msg))) => {
                assert!(msg.contains("invalid"));
                assert!(msg.contains("Hybrid"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_records_garbage() {
        let parsed = parse_records("not json");
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].is_err());
    }

    #[test]
    fn test_init_prompts_writes_once() {
        let dir = TempDir::new().unwrap_or_else(|_| unreachable!());
        let first = cmd_init_prompts(Some(dir.path()), OutputFormat::Text)
            .unwrap_or_else(|e| panic!("init: {e}"));
        assert!(first.contains("Wrote default codebook"));
        let second = cmd_init_prompts(Some(dir.path()), OutputFormat::Text)
            .unwrap_or_else(|e| panic!("init: {e}"));
        assert!(second.contains("already exists"));
    }

    #[test]
    fn test_config_masks_credentials() {
        let config = AgentConfig::builder()
            .api_key("sk-abcdefghijklmnop")
            .pinecone_environment("us-east-1")
            .build_lenient();
        let output =
            cmd_config(&config, OutputFormat::Text).unwrap_or_else(|e| panic!("config: {e}"));
        assert!(output.contains("sk-a****"));
        assert!(!output.contains("abcdefghijklmnop"));
        assert!(output.contains("Missing: PINECONE_API_KEY"));
    }

    #[test]
    fn test_classify_config_requires_credentials() {
        let params = ClassifyParams {
            concurrency: 1,
            ..ClassifyParams::default()
        };
        let result = classify_config(AgentConfig::builder().api_key("sk"), &params);
        assert!(matches!(
            result,
            Err(Error::Agent(AgentError::ConfigurationMissing { .. }))
        ));
    }

    #[test]
    fn test_classify_config_rejects_zero_timeout() {
        let params = ClassifyParams {
            timeout_secs: Some(0),
            ..ClassifyParams::default()
        };
        let result = classify_config(AgentConfig::builder(), &params);
        assert!(matches!(
            result,
            Err(Error::Command(CommandError::InvalidArguments(_)))
        ));
    }

    #[test]
    fn test_failed_input_fails_the_batch() {
        let results = vec![
            Err(AgentError::InvalidInput {
                message: "blank".to_string(),
            }),
            Err(AgentError::Timeout {
                elapsed: Duration::from_secs(1),
            }),
        ];
        match fail_if_any("== a.txt\n".to_string(), &results) {
            Err(Error::Command(CommandError::PartialFailure {
                output,
                failed,
                total,
            })) => {
                assert_eq!(output, "== a.txt\n");
                assert_eq!((failed, total), (2, 2));
            }
            other => panic!("expected partial failure, got {other:?}"),
        }

        let output = fail_if_any("ok".to_string(), &[]).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(output, "ok");
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask(None), "(missing)");
        assert_eq!(mask(Some("short")), "****");
        assert_eq!(mask(Some("pc-1234567890")), "pc-1****");
    }
}
