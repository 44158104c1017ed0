//! Command implementations for the intent-chat CLI.

use std::io::{self, BufRead, Write};
use std::time::Instant;

use anyhow::Context;
use log::{debug, info};

use crate::chat::{ChatRequest, ChatService, HistoryRequest};
use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::IntentConfig;
use crate::corpus::TrainingCorpus;
use crate::error::{IntentError, Result};
use crate::ml::Trainer;
use crate::storage::ModelStore;

/// Words that end an interactive conversation.
const QUIT_WORDS: [&str; 3] = ["quit", "exit", "bye"];

const FAREWELL: &str = "Goodbye! Have a great day!";

/// Execute a CLI command.
pub fn execute_command(args: IntentChatArgs) -> Result<()> {
    let config = args.load_config()?;
    match &args.command {
        Command::Train(train_args) => train(train_args, config, &args),
        Command::Ask(ask_args) => ask(ask_args, config, &args),
        Command::Chat(chat_args) => chat(chat_args, config, &args),
        Command::Status => status(config, &args),
        Command::ExportCorpus(export_args) => export_corpus(export_args, &args),
    }
}

/// Train a model and save its artifacts.
fn train(args: &TrainArgs, mut config: IntentConfig, cli_args: &IntentChatArgs) -> Result<()> {
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = batch_size;
    }
    if let Some(split) = args.validation_split {
        config.training.validation_split = split;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    config.validate()?;

    let corpus = match &args.corpus {
        Some(path) => {
            info!("Loading training corpus from {}", path.display());
            TrainingCorpus::from_json_file(path)
                .with_context(|| format!("failed to load training corpus {}", path.display()))?
        }
        None => {
            info!("Using the built-in training corpus");
            TrainingCorpus::default_corpus()?
        }
    };

    let store = ModelStore::new(config.model.clone());
    let trainer = Trainer::from_config(&config);

    let start = Instant::now();
    let outcome = trainer.train_and_save(&corpus, &store)?;
    let duration_ms = start.elapsed().as_millis() as u64;

    output_result(
        "Model trained successfully",
        &TrainingSummary::new(
            config.model.directory.display().to_string(),
            config.model.name.clone(),
            &outcome.history,
            duration_ms,
        ),
        cli_args,
    )
}

/// Answer a single message.
fn ask(args: &AskArgs, config: IntentConfig, cli_args: &IntentChatArgs) -> Result<()> {
    let service = ChatService::open(config);
    let mut request = ChatRequest::new(args.message.clone());
    request.confidence_threshold = args.threshold;
    let reply = service.chat(&request);
    output_result("Reply", &reply, cli_args)
}

/// Interactive conversation on stdin/stdout.
fn chat(args: &ChatArgs, config: IntentConfig, cli_args: &IntentChatArgs) -> Result<()> {
    let service = ChatService::open(config);
    if !service.status().ready {
        return Err(IntentError::not_loaded(
            "no trained model found; run `intent-chat train` first",
        ));
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let options = ChatLoopOptions {
        threshold: args.threshold,
        history_limit: args.history_limit,
        json: cli_args.output_format == OutputFormat::Json,
        pretty: cli_args.pretty,
        prompt: cli_args.verbosity() > 0,
    };
    run_chat_loop(&service, stdin.lock(), stdout.lock(), &options)
}

/// Settings of an interactive conversation.
#[derive(Debug, Clone)]
pub struct ChatLoopOptions {
    pub threshold: Option<f32>,
    pub history_limit: usize,
    /// Print replies as JSON lines.
    pub json: bool,
    pub pretty: bool,
    /// Print the banner and the `You:` prompt.
    pub prompt: bool,
}

impl Default for ChatLoopOptions {
    fn default() -> Self {
        ChatLoopOptions {
            threshold: None,
            history_limit: 10,
            json: false,
            pretty: false,
            prompt: true,
        }
    }
}

/// Read utterances line by line until a quit word or end of input.
///
/// `history` prints the recent exchanges and `reset` clears them.
pub fn run_chat_loop<R: BufRead, W: Write>(
    service: &ChatService,
    input: R,
    mut output: W,
    options: &ChatLoopOptions,
) -> Result<()> {
    if options.prompt {
        writeln!(output, "Chatbot ready. Type 'quit', 'exit' or 'bye' to leave.")?;
        writeln!(output, "Type 'history' for recent exchanges, 'reset' to clear them.")?;
    }

    let mut lines = input.lines();
    loop {
        if options.prompt {
            write!(output, "You: ")?;
            output.flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let command = line.trim().to_lowercase();

        if QUIT_WORDS.contains(&command.as_str()) {
            writeln!(output, "Bot: {FAREWELL}")?;
            break;
        }
        match command.as_str() {
            "history" => {
                let entries = service.history(&HistoryRequest {
                    limit: Some(options.history_limit as i64),
                });
                if options.json {
                    writeln!(output, "{}", to_json(&entries, options.pretty)?)?;
                } else {
                    for line in entries.render_human() {
                        writeln!(output, "{line}")?;
                    }
                }
            }
            "reset" => {
                service.reset();
                writeln!(output, "Bot: Conversation history cleared.")?;
            }
            _ => {
                let request = ChatRequest {
                    message: line,
                    confidence_threshold: options.threshold,
                };
                let reply = service.chat(&request);
                debug!(
                    "intent={} confidence={:.4}",
                    reply.intent, reply.confidence
                );
                if options.json {
                    writeln!(output, "{}", to_json(&reply, options.pretty)?)?;
                } else {
                    writeln!(output, "Bot: {}", reply.response)?;
                }
            }
        }
    }
    Ok(())
}

/// Show artifact presence and model readiness.
fn status(config: IntentConfig, cli_args: &IntentChatArgs) -> Result<()> {
    let service = ChatService::open(config);
    output_result("Model status", &service.status(), cli_args)
}

/// Write the built-in corpus to a file.
fn export_corpus(args: &ExportCorpusArgs, cli_args: &IntentChatArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        return Err(IntentError::other(format!(
            "{} already exists. Use --force to overwrite.",
            args.output.display()
        )));
    }

    let corpus = TrainingCorpus::default_corpus()?;
    corpus.to_json_file(&args.output)?;

    output_result(
        "Corpus exported",
        &ExportResult {
            path: args.output.display().to_string(),
            intents: corpus.len(),
            patterns: corpus.intents.iter().map(|i| i.patterns.len()).sum(),
        },
        cli_args,
    )
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::*;

    fn unloaded_service(dir: &tempfile::TempDir) -> ChatService {
        let mut config = IntentConfig::default();
        config.model.directory = dir.path().to_path_buf();
        ChatService::open(config)
    }

    fn run(service: &ChatService, input: &str, options: &ChatLoopOptions) -> String {
        let mut output = Vec::new();
        run_chat_loop(service, input.as_bytes(), &mut output, options).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_chat_loop_quits_on_quit_word() {
        let dir = tempfile::tempdir().unwrap();
        let service = unloaded_service(&dir);
        let options = ChatLoopOptions {
            prompt: false,
            ..Default::default()
        };

        let output = run(&service, "  BYE \nhello\n", &options);
        assert_eq!(output, format!("Bot: {FAREWELL}\n"));
    }

    #[test]
    fn test_chat_loop_commands() {
        let dir = tempfile::tempdir().unwrap();
        let service = unloaded_service(&dir);
        let options = ChatLoopOptions {
            prompt: false,
            ..Default::default()
        };

        let output = run(&service, "\nhistory\nreset\n", &options);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Bot: Please enter a message.",
                "No conversation history.",
                "Bot: Conversation history cleared.",
            ]
        );
    }

    #[test]
    fn test_train_names_the_unreadable_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let args = IntentChatArgs::try_parse_from([
            OsString::from("intent-chat"),
            OsString::from("--model-dir"),
            dir.path().into(),
            OsString::from("train"),
            missing.clone().into(),
        ])
        .unwrap();

        let err = execute_command(args).unwrap_err();
        assert!(matches!(err, IntentError::Anyhow(_)));
        let message = err.to_string();
        assert!(message.starts_with("failed to load training corpus"));
        assert!(message.contains(&missing.display().to_string()));
        assert!(message.contains("I/O error"));
    }

    #[test]
    fn test_chat_loop_json_replies() {
        let dir = tempfile::tempdir().unwrap();
        let service = unloaded_service(&dir);
        let options = ChatLoopOptions {
            prompt: false,
            json: true,
            ..Default::default()
        };

        let output = run(&service, "Hello\n", &options);
        let reply: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(reply["intent"], "error");
        assert!(reply["error"].is_string());
    }
}
