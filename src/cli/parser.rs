//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sdg-coder: code policy research against the public-policy cycle and the SDGs.
///
/// Reads the text of a study, lets a tool-calling model consult the policy
/// handbook and the goals catalog, and prints one validated classification
/// record.
#[derive(Parser, Debug)]
#[command(name = "sdg-coder")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json, ndjson).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify one or more works.
    ///
    /// Each input is classified independently. With several inputs the
    /// requests run concurrently, bounded by `--concurrency`. Requires
    /// `OPENAI_API_KEY`, `PINECONE_API_KEY` and `PINECONE_ENVIRONMENT`.
    #[command(after_help = r#"Examples:
  sdg-coder classify paper.txt                       # Classify one file
  sdg-coder classify a.txt b.txt --concurrency 2     # Several files
  sdg-coder classify --text "Avaliação qualitativa do programa..."
  cat abstract.txt | sdg-coder classify              # Read stdin
  sdg-coder --format ndjson classify corpus/*.txt > records.ndjson
"#)]
    Classify {
        /// Files holding the text of each work. Reads stdin when empty.
        files: Vec<PathBuf>,

        /// Classify this text instead of reading files.
        #[arg(short, long, conflicts_with = "files")]
        text: Option<String>,

        /// Per-request deadline in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Chat model to use.
        #[arg(long)]
        model: Option<String>,

        /// Maximum model rounds per request.
        #[arg(long)]
        max_rounds: Option<usize>,

        /// Maximum concurrent requests.
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Directory containing `codebook.md`.
        #[arg(long)]
        prompt_dir: Option<PathBuf>,

        /// Include rounds, token usage and phase trace in the output.
        #[arg(long)]
        report: bool,
    },

    /// Query one reference corpus the way the model does.
    #[command(after_help = r#"Examples:
  sdg-coder search handbook "definição e dimensão do problema"
  sdg-coder search goals "erradicação da pobreza"
  sdg-coder --format json search handbook "custo-efetividade" | jq '.passages[].text'
"#)]
    Search {
        /// Corpus to query (handbook, goals).
        corpus: String,

        /// Free-text query.
        query: String,
    },

    /// Check saved records against the schema.
    ///
    /// Accepts a JSON object, a JSON array of objects, or NDJSON. Makes no
    /// network calls.
    #[command(after_help = r#"Examples:
  sdg-coder validate record.json
  sdg-coder validate records.ndjson --format json
"#)]
    Validate {
        /// Files holding records.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Write the default codebook to disk for customization.
    #[command(name = "init-prompts")]
    #[command(after_help = r#"Examples:
  sdg-coder init-prompts                     # Write to ~/.config/sdg-coder/prompts/
  sdg-coder init-prompts --dir ./prompts     # Write to custom directory
"#)]
    InitPrompts {
        /// Target directory.
        ///
        /// Defaults to `~/.config/sdg-coder/prompts/`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Show the resolved configuration with credentials masked.
    Config,
}
