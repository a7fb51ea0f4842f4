//! CLI layer for sdg-coder.
//!
//! Provides the command-line interface using clap, with commands for
//! classifying works, querying the reference corpora, validating saved
//! records and managing the codebook.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
