//! CLI parse: clap types for storyforge. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// StoryForge - quality-gated story and illustration job engine
#[derive(Parser)]
#[command(name = "storyforge")]
#[command(about = "Asynchronous job engine for quality-gated story and illustration generation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides config/storyforge.toml discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the dispatcher and process jobs until interrupted
    Run {
        /// Only claim jobs owned by this user
        #[arg(long)]
        user: Option<String>,
        /// Override dispatcher.max_concurrent_jobs
        #[arg(long)]
        max_concurrent: Option<usize>,
    },
    /// Queue a new job
    Enqueue {
        /// Job type (storybook, auto-story, scenes, cartoonize, image-generation)
        #[arg(long = "type")]
        job_type: String,
        /// Job input as JSON
        #[arg(long)]
        input: String,
        /// Retry budget (defaults to store.default_max_retries)
        #[arg(long)]
        max_retries: Option<u32>,
        /// Owning user
        #[arg(long)]
        user: Option<String>,
    },
    /// Show one job
    Status {
        id: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List recent jobs
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long)]
        user: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Cancel a job that has not finished
    Cancel { id: String },
    /// Print the effective configuration as TOML
    Config,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Run { .. } => "run",
            Commands::Enqueue { .. } => "enqueue",
            Commands::Status { .. } => "status",
            Commands::List { .. } => "list",
            Commands::Cancel { .. } => "cancel",
            Commands::Config => "config",
        }
    }
}
