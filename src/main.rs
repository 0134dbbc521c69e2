use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use condense::logging::{LogOptions, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "condense")]
#[command(
    version,
    about = "Summarize long documents within a model's token budget"
)]
pub struct Cli {
    /// Debug logging and per-chunk detail
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Also write errors to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Path to condense.toml. Defaults to ./condense.toml if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the `[defaults]` and `[pipeline]` config sections.
#[derive(Args, Clone, Debug, Default)]
pub struct SummaryArgs {
    /// Target summary size, e.g. "500 characters", "200 tokens", "3 sentences"
    #[arg(short, long)]
    pub limit: Option<String>,

    /// Model id (see `condense tokens` for the known models)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Sampling temperature between 0 and 1
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Upper bound on tokens per completion
    #[arg(long)]
    pub max_output_tokens: Option<u32>,

    /// Context tokens kept free for the completion
    #[arg(long)]
    pub reserved_tokens: Option<usize>,

    /// Maximum reduction passes before truncating
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Chunks summarized at the same time
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Stop at the first chunk that fails after retries
    #[arg(long)]
    pub fail_fast: bool,

    /// Attempts per completion call
    #[arg(long)]
    pub retries: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Summarize a single document
    Summarize {
        /// Text or PDF file
        input: PathBuf,

        /// Write the summary here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        args: SummaryArgs,
    },
    /// Summarize every document in a directory or zip archive
    Batch {
        /// Directory or .zip archive
        input: PathBuf,

        /// Zip archive to write summaries to
        #[arg(short, long, default_value = "summaries.zip")]
        output: PathBuf,

        /// Stop after this many failed documents (0 never stops)
        #[arg(long)]
        max_errors: Option<usize>,

        #[command(flatten)]
        args: SummaryArgs,
    },
    /// Count sentences, words and tokens, with input cost per model
    Tokens {
        /// File, directory or .zip archive
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show how a document would be split into chunks
    Chunks {
        /// Text or PDF file
        input: PathBuf,

        /// Model whose tokenizer and context size to use
        #[arg(short, long)]
        model: Option<String>,

        /// Chunk ceiling in tokens (defaults to the model's context size)
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Tokens reserved out of each chunk
        #[arg(long, default_value = "0")]
        reserved: usize,

        /// Chunking strategy: lines or balanced
        #[arg(long, default_value = "lines")]
        strategy: String,

        /// Print each chunk's text
        #[arg(long)]
        show_text: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default condense.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(&LogOptions {
        verbose: cli.verbose,
        json: cli.log_json,
        file: cli.log_file.clone(),
    })?;
    let work_dir = std::env::current_dir().context("Failed to get current directory")?;

    match &cli.command {
        Commands::Summarize {
            input,
            output,
            json,
            args,
        } => {
            cmd::cmd_summarize(&cli, &work_dir, input, output.as_deref(), *json, args).await?;
        }
        Commands::Batch {
            input,
            output,
            max_errors,
            args,
        } => {
            cmd::cmd_batch(&cli, &work_dir, input, output, *max_errors, args).await?;
        }
        Commands::Tokens { input, json } => cmd::cmd_tokens(&cli, &work_dir, input, *json)?,
        Commands::Chunks {
            input,
            model,
            max_tokens,
            reserved,
            strategy,
            show_text,
        } => cmd::cmd_chunks(
            &cli,
            &work_dir,
            input,
            model.as_deref(),
            *max_tokens,
            *reserved,
            strategy,
            *show_text,
        )?,
        Commands::Config { command } => cmd::cmd_config(&cli, &work_dir, command.clone())?,
    }

    Ok(())
}
