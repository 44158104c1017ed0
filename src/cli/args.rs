//! Command line argument parsing using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::IntentConfig;
use crate::error::Result;

/// intent-chat - train and talk to an intent-classification assistant
#[derive(Parser, Debug, Clone)]
#[command(name = "intent-chat")]
#[command(about = "Train and chat with an intent-classification assistant")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct IntentChatArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE", env = "INTENT_CHAT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the model artifacts
    #[arg(long, value_name = "DIR", env = "INTENT_CHAT_MODEL_DIR", global = true)]
    pub model_dir: Option<PathBuf>,

    /// Base name of the model artifacts
    #[arg(long, value_name = "NAME", env = "INTENT_CHAT_MODEL_NAME", global = true)]
    pub model_name: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl IntentChatArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }

    /// Configuration from the config file (or defaults) with flag overrides applied.
    pub fn load_config(&self) -> Result<IntentConfig> {
        let mut config = match &self.config {
            Some(path) => IntentConfig::from_file(path)?,
            None => IntentConfig::default(),
        };
        if let Some(dir) = &self.model_dir {
            config.model.directory = dir.clone();
        }
        if let Some(name) = &self.model_name {
            config.model.name = name.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Train a model and save its artifacts
    Train(TrainArgs),

    /// Answer a single message
    Ask(AskArgs),

    /// Interactive conversation
    Chat(ChatArgs),

    /// Show which artifacts exist and whether the model loads
    Status,

    /// Write the built-in training corpus as JSON
    #[command(name = "export-corpus")]
    ExportCorpus(ExportCorpusArgs),
}

/// Arguments for training
#[derive(Parser, Debug, Clone)]
pub struct TrainArgs {
    /// Training corpus (JSON); the built-in corpus is used when omitted
    #[arg(value_name = "CORPUS_FILE")]
    pub corpus: Option<PathBuf>,

    /// Maximum number of epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Mini-batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Fraction of each intent held out for validation
    #[arg(long)]
    pub validation_split: Option<f64>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for a single message
#[derive(Parser, Debug, Clone)]
pub struct AskArgs {
    /// The message
    #[arg(value_name = "MESSAGE")]
    pub message: String,

    /// Confidence threshold for a catalog answer
    #[arg(short, long)]
    pub threshold: Option<f32>,
}

/// Arguments for the interactive conversation
#[derive(Parser, Debug, Clone)]
pub struct ChatArgs {
    /// Confidence threshold for a catalog answer
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// Number of exchanges shown by the `history` command
    #[arg(long, default_value = "10")]
    pub history_limit: usize,
}

/// Arguments for exporting the built-in corpus
#[derive(Parser, Debug, Clone)]
pub struct ExportCorpusArgs {
    /// Output file path
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}
