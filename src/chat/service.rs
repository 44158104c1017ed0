//! In-process service facade with the request/response shapes of the chat API.
//!
//! An HTTP layer maps its routes one-to-one onto [`ChatService`] methods:
//! chat, history, reset, status and retrain.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::chat::engine::InferenceEngine;
use crate::chat::exchange::{ChatExchange, ExchangeKind};
use crate::config::IntentConfig;
use crate::corpus::TrainingCorpus;
use crate::error::Result;
use crate::ml::{Trainer, TrainingHistory};
use crate::storage::{ArtifactPresence, ModelStore};

/// Default number of exchanges returned by a history request.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Default epochs of a retrain request.
pub const DEFAULT_RETRAIN_EPOCHS: usize = 50;

/// Default batch size of a retrain request.
pub const DEFAULT_RETRAIN_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub confidence_threshold: Option<f32>,
}

impl ChatRequest {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            confidence_threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub intent: String,
    pub confidence: f32,
    /// RFC 3339.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ChatExchange> for ChatReply {
    fn from(exchange: &ChatExchange) -> Self {
        Self {
            response: exchange.response.clone(),
            intent: exchange.intent.clone(),
            confidence: exchange.confidence,
            timestamp: exchange.timestamp_rfc3339(),
            error: exchange.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// Negative limits are treated as 0.
    #[serde(default)]
    pub limit: Option<i64>,
}

impl HistoryRequest {
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            Some(limit) => usize::try_from(limit).unwrap_or(0),
            None => DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// One history entry as exposed by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_message: String,
    pub intent: String,
    pub kind: ExchangeKind,
    pub confidence: f32,
    pub bot_response: String,
    pub timestamp: String,
}

impl From<&ChatExchange> for HistoryEntry {
    fn from(exchange: &ChatExchange) -> Self {
        Self {
            user_message: exchange.input.clone(),
            intent: exchange.intent.clone(),
            kind: exchange.kind,
            confidence: exchange.confidence,
            bot_response: exchange.response.clone(),
            timestamp: exchange.timestamp_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStatus {
    pub model_name: String,
    /// All four artifacts are loaded.
    pub ready: bool,
    /// Which artifact files exist on disk.
    pub artifacts: ArtifactPresence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_intents: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocab_size: Option<usize>,
    pub history_len: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrainRequest {
    #[serde(default)]
    pub epochs: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrainResponse {
    pub message: String,
    pub epochs: usize,
    pub final_accuracy: f64,
    pub final_loss: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_val_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_val_loss: Option<f64>,
    pub history: TrainingHistory,
}

impl RetrainResponse {
    fn from_history(history: TrainingHistory) -> Self {
        let last = history.last().cloned();
        Self {
            message: "Model retrained successfully".to_string(),
            epochs: history.epochs_run(),
            final_accuracy: last.as_ref().map_or(0.0, |m| m.accuracy),
            final_loss: last.as_ref().map_or(0.0, |m| m.loss),
            final_val_accuracy: last.as_ref().and_then(|m| m.val_accuracy),
            final_val_loss: last.as_ref().and_then(|m| m.val_loss),
            history,
        }
    }
}

/// Thread-safe facade over one [`InferenceEngine`].
#[derive(Debug)]
pub struct ChatService {
    config: IntentConfig,
    store: ModelStore,
    engine: Mutex<InferenceEngine>,
    cancel: Arc<AtomicBool>,
}

impl ChatService {
    /// Create the service without loading the model.
    pub fn new(config: IntentConfig) -> Self {
        let engine = InferenceEngine::new(&config);
        let store = ModelStore::new(config.model.clone());
        Self {
            config,
            store,
            engine: Mutex::new(engine),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create the service and try to load the model.
    ///
    /// A load failure is logged; the service still answers, with error replies.
    pub fn open(config: IntentConfig) -> Self {
        let service = Self::new(config);
        if let Err(e) = service.load() {
            warn!("Chat service started without a model: {e}");
        }
        service
    }

    pub fn load(&self) -> Result<()> {
        self.engine.lock().load()
    }

    pub fn chat(&self, request: &ChatRequest) -> ChatReply {
        let exchange = self
            .engine
            .lock()
            .chat(&request.message, request.confidence_threshold);
        ChatReply::from(&exchange)
    }

    pub fn history(&self, request: &HistoryRequest) -> Vec<HistoryEntry> {
        let engine = self.engine.lock();
        engine
            .history()
            .recent(request.effective_limit())
            .into_iter()
            .map(HistoryEntry::from)
            .collect()
    }

    pub fn reset(&self) {
        self.engine.lock().reset_history();
    }

    pub fn status(&self) -> ModelStatus {
        let engine = self.engine.lock();
        let info = engine.loaded_info();
        ModelStatus {
            model_name: self.config.model.name.clone(),
            ready: engine.is_loaded(),
            artifacts: self.store.presence(),
            num_intents: info.map(|i| i.num_classes),
            vocab_size: info.map(|i| i.vocab_size),
            history_len: engine.history().len(),
        }
    }

    /// Flag checked between training batches; set it to abort a running retrain.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Retrain on the stored corpus (or the built-in one), persist, and reload.
    ///
    /// The engine keeps answering with the previous model while training runs.
    pub fn retrain(&self, request: &RetrainRequest) -> Result<RetrainResponse> {
        let mut training = self.config.training.clone();
        training.epochs = request.epochs.unwrap_or(DEFAULT_RETRAIN_EPOCHS);
        training.batch_size = request.batch_size.unwrap_or(DEFAULT_RETRAIN_BATCH_SIZE);

        let corpus = if self.store.presence().corpus {
            TrainingCorpus::from_json_file(&self.store.paths().corpus)?
        } else {
            TrainingCorpus::default_corpus()?
        };

        info!(
            "Retraining with epochs={}, batch_size={}",
            training.epochs, training.batch_size
        );
        let trainer = Trainer::new(training, self.config.network.clone())
            .with_cancel_flag(Arc::clone(&self.cancel));
        let outcome = trainer.train_and_save(&corpus, &self.store)?;

        self.engine.lock().install_bundle(outcome.model)?;
        info!("Model retrained and reloaded");

        Ok(RetrainResponse::from_history(outcome.history))
    }
}
