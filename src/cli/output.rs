//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::chat::{ChatReply, HistoryEntry, ModelStatus};
use crate::cli::args::{IntentChatArgs, OutputFormat};
use crate::error::Result;
use crate::ml::{EpochMetrics, TrainingHistory};

/// Result structure for a training run.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub model_directory: String,
    pub model_name: String,
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub stopped_early: bool,
    pub num_examples: usize,
    pub num_train: usize,
    pub num_validation: usize,
    pub num_intents: usize,
    pub vocab_size: usize,
    pub final_metrics: Option<EpochMetrics>,
    pub best_metrics: Option<EpochMetrics>,
    pub learning_rates: Vec<f64>,
    pub duration_ms: u64,
}

impl TrainingSummary {
    pub fn new(
        model_directory: String,
        model_name: String,
        history: &TrainingHistory,
        duration_ms: u64,
    ) -> Self {
        let mut learning_rates = history.learning_rates();
        learning_rates.dedup();
        Self {
            model_directory,
            model_name,
            epochs_run: history.epochs_run(),
            best_epoch: history.best_epoch,
            stopped_early: history.stopped_early,
            num_examples: history.num_examples,
            num_train: history.num_train,
            num_validation: history.num_validation,
            num_intents: history.num_classes,
            vocab_size: history.vocab_size,
            final_metrics: history.last().cloned(),
            best_metrics: history.best().cloned(),
            learning_rates,
            duration_ms,
        }
    }
}

/// Result structure for a corpus export.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportResult {
    pub path: String,
    pub intents: usize,
    pub patterns: usize,
}

/// Human-readable rendering of a command result.
pub trait HumanOutput {
    fn render_human(&self) -> Vec<String>;
}

impl HumanOutput for TrainingSummary {
    fn render_human(&self) -> Vec<String> {
        let mut lines = vec![
            "Training Summary:".to_string(),
            "═════════════════".to_string(),
            format!("Model: {}/{}", self.model_directory, self.model_name),
            format!(
                "Examples: {} ({} train, {} validation)",
                self.num_examples, self.num_train, self.num_validation
            ),
            format!("Intents: {}", self.num_intents),
            format!("Vocabulary size: {}", self.vocab_size),
            format!(
                "Epochs run: {}{}",
                self.epochs_run,
                if self.stopped_early {
                    " (stopped early)"
                } else {
                    ""
                }
            ),
        ];

        if let Some(best) = &self.best_metrics {
            lines.push(format!(
                "Best epoch: {} ({})",
                best.epoch,
                format_metrics(best)
            ));
        }
        if let Some(last) = &self.final_metrics {
            lines.push(format!("Final epoch: {}", format_metrics(last)));
        }
        if self.learning_rates.len() > 1 {
            let trace: Vec<String> = self
                .learning_rates
                .iter()
                .map(|lr| format!("{lr:.2e}"))
                .collect();
            lines.push(format!("Learning rate: {}", trace.join(" -> ")));
        }
        lines.push(format!("Training time: {}", format_duration(self.duration_ms)));
        lines
    }
}

impl HumanOutput for ExportResult {
    fn render_human(&self) -> Vec<String> {
        vec![format!(
            "Wrote {} intents ({} patterns) to {}",
            self.intents, self.patterns, self.path
        )]
    }
}

impl HumanOutput for ChatReply {
    fn render_human(&self) -> Vec<String> {
        let mut lines = vec![self.response.clone()];
        lines.push(format!(
            "  [intent: {}, confidence: {:.3}]",
            self.intent, self.confidence
        ));
        if let Some(error) = &self.error {
            lines.push(format!("  [error: {error}]"));
        }
        lines
    }
}

impl HumanOutput for ModelStatus {
    fn render_human(&self) -> Vec<String> {
        let mut lines = vec![
            "Model Status:".to_string(),
            "═════════════".to_string(),
            format!("Model: {}", self.model_name),
            format!("Ready: {}", if self.ready { "yes" } else { "no" }),
            format!("  classifier: {}", presence(self.artifacts.classifier)),
            format!("  vocabulary: {}", presence(self.artifacts.vocabulary)),
            format!("  labels: {}", presence(self.artifacts.labels)),
            format!("  training data: {}", presence(self.artifacts.corpus)),
        ];
        if let Some(intents) = self.num_intents {
            lines.push(format!("Intents: {intents}"));
        }
        if let Some(vocab) = self.vocab_size {
            lines.push(format!("Vocabulary size: {vocab}"));
        }
        lines
    }
}

impl HumanOutput for Vec<HistoryEntry> {
    fn render_human(&self) -> Vec<String> {
        if self.is_empty() {
            return vec!["No conversation history.".to_string()];
        }
        let mut lines = Vec::with_capacity(self.len() * 2);
        for entry in self {
            lines.push(format!("[{}] You: {}", entry.timestamp, entry.user_message));
            lines.push(format!(
                "    Bot ({}, {:.3}): {}",
                entry.intent, entry.confidence, entry.bot_response
            ));
        }
        lines
    }
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize + HumanOutput>(
    message: &str,
    result: &T,
    args: &IntentChatArgs,
) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: HumanOutput>(message: &str, result: &T, args: &IntentChatArgs) -> Result<()> {
    if args.verbosity() > 1 && !message.is_empty() {
        println!("{message}");
        println!();
    }
    for line in result.render_human() {
        println!("{line}");
    }
    Ok(())
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &IntentChatArgs) -> Result<()> {
    println!("{}", to_json(result, args.pretty)?);
    Ok(())
}

pub(crate) fn to_json<T: Serialize>(result: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    Ok(json)
}

fn format_metrics(metrics: &EpochMetrics) -> String {
    let mut text = format!(
        "loss {:.4}, accuracy {:.3}",
        metrics.loss, metrics.accuracy
    );
    if let (Some(loss), Some(acc)) = (metrics.val_loss, metrics.val_accuracy) {
        text.push_str(&format!(", val_loss {loss:.4}, val_accuracy {acc:.3}"));
    }
    text
}

fn presence(present: bool) -> &'static str {
    if present { "present" } else { "missing" }
}

/// Format duration in human-readable format.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else if ms < 3_600_000 {
        format!("{:.1}m", ms as f64 / 60_000.0)
    } else {
        format!("{:.1}h", ms as f64 / 3_600_000.0)
    }
}
