//! Configuration for training, the classifier network and the chat engine.
//!
//! Every section has defaults and can be read from a partial JSON document:
//!
//! ```
//! use intent_chat::config::IntentConfig;
//!
//! let config = IntentConfig::from_json_str(r#"{"training": {"epochs": 20}}"#).unwrap();
//! assert_eq!(config.training.epochs, 20);
//! assert_eq!(config.training.batch_size, 16);
//! assert_eq!(config.chat.confidence_threshold, 0.5);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IntentError, Result};

/// Default confidence threshold of the chat path.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// Where artifacts live.
    pub model: ModelLocation,
    /// Training procedure settings.
    pub training: TrainingConfig,
    /// Classifier architecture.
    pub network: NetworkConfig,
    /// Chat engine settings.
    pub chat: ChatConfig,
}

impl IntentConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: IntentConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.training.validate()?;
        self.network.validate()?;
        self.chat.validate()
    }
}

/// Model directory and artifact base name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelLocation {
    /// Directory holding the four artifacts.
    pub directory: PathBuf,
    /// Base name `M` of `M.bin`, `M_tokenizer.bin`, ...
    pub name: String,
}

impl Default for ModelLocation {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("models"),
            name: "chatbot_model".to_string(),
        }
    }
}

impl ModelLocation {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(directory: P, name: S) -> Self {
        Self {
            directory: directory.into(),
            name: name.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains(['/', '\\']) {
            return Err(IntentError::invalid_config(format!(
                "invalid model name '{}'",
                self.name
            )));
        }
        Ok(())
    }
}

/// Settings of the training procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Maximum number of epochs.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Initial Adam learning rate.
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    /// Fraction of each class held out for validation. 0 disables the split.
    pub validation_split: f64,
    /// Seed for the split, shuffling, dropout and weight initialization.
    pub seed: u64,
    /// Maximum vocabulary size, sentinel included.
    pub vocab_size: usize,
    /// Length of every encoded sequence.
    pub sequence_length: usize,
    /// Epochs without validation accuracy improvement before stopping.
    pub early_stopping_patience: usize,
    /// Epochs without validation loss improvement before reducing the learning rate.
    pub lr_patience: usize,
    /// Multiplier applied on a plateau.
    pub lr_factor: f64,
    /// Learning rate floor.
    pub min_learning_rate: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 150,
            batch_size: 16,
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            validation_split: 0.2,
            seed: 42,
            vocab_size: 10_000,
            sequence_length: 50,
            early_stopping_patience: 15,
            lr_patience: 8,
            lr_factor: 0.5,
            min_learning_rate: 1e-6,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(IntentError::invalid_config("epochs must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(IntentError::invalid_config("batch size must be greater than 0"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(IntentError::invalid_config("learning rate must be positive"));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(IntentError::invalid_config(format!(
                "validation split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if self.vocab_size < 2 {
            return Err(IntentError::invalid_config("vocabulary size must be at least 2"));
        }
        if self.sequence_length == 0 {
            return Err(IntentError::invalid_config(
                "sequence length must be greater than 0",
            ));
        }
        if !(self.lr_factor > 0.0 && self.lr_factor < 1.0) {
            return Err(IntentError::invalid_config("lr factor must be in (0, 1)"));
        }
        Ok(())
    }

    /// Whether a validation split is requested.
    pub fn has_validation(&self) -> bool {
        self.validation_split > 0.0
    }
}

/// Classifier architecture: embedding, two bidirectional LSTM layers, two dense blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub embedding_dim: usize,
    /// Units per direction of the two LSTM layers.
    pub lstm_units: [usize; 2],
    /// Widths of the two dense blocks.
    pub dense_units: [usize; 2],
    /// Spatial dropout on embeddings.
    pub embedding_dropout: f32,
    /// Dropout on LSTM inputs.
    pub lstm_dropout: f32,
    /// Dropout on the LSTM recurrent state.
    pub recurrent_dropout: f32,
    /// Dropout after each dense block.
    pub dense_dropout: [f32; 2],
    pub batch_norm_momentum: f64,
    pub batch_norm_epsilon: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 256,
            lstm_units: [128, 64],
            dense_units: [128, 64],
            embedding_dropout: 0.2,
            lstm_dropout: 0.3,
            recurrent_dropout: 0.3,
            dense_dropout: [0.4, 0.3],
            batch_norm_momentum: 0.9,
            batch_norm_epsilon: 1e-3,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0
            || self.lstm_units.contains(&0)
            || self.dense_units.contains(&0)
        {
            return Err(IntentError::invalid_config("layer sizes must be greater than 0"));
        }
        let rates = [
            self.embedding_dropout,
            self.lstm_dropout,
            self.recurrent_dropout,
            self.dense_dropout[0],
            self.dense_dropout[1],
        ];
        if rates.iter().any(|rate| !(0.0..1.0).contains(rate)) {
            return Err(IntentError::invalid_config("dropout rates must be in [0, 1)"));
        }
        if !(0.0..1.0).contains(&self.batch_norm_momentum) || !(self.batch_norm_epsilon > 0.0) {
            return Err(IntentError::invalid_config(
                "batch norm momentum must be in [0, 1) and epsilon positive",
            ));
        }
        Ok(())
    }
}

/// Chat engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Default confidence threshold.
    pub confidence_threshold: f32,
    /// Maximum number of exchanges kept in history.
    pub history_capacity: usize,
    /// Seed of the response picker. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            history_capacity: 1000,
            seed: None,
        }
    }
}

impl ChatConfig {
    pub fn validate(&self) -> Result<()> {
        if self.confidence_threshold.is_nan() {
            return Err(IntentError::invalid_config("confidence threshold is NaN"));
        }
        if self.history_capacity == 0 {
            return Err(IntentError::invalid_config(
                "history capacity must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IntentConfig::default();
        assert_eq!(config.model.name, "chatbot_model");
        assert_eq!(config.training.epochs, 150);
        assert_eq!(config.training.vocab_size, 10_000);
        assert_eq!(config.training.sequence_length, 50);
        assert_eq!(config.training.epsilon, 1e-7);
        assert_eq!(config.network.embedding_dim, 256);
        assert_eq!(config.network.lstm_units, [128, 64]);
        assert_eq!(config.network.dense_dropout, [0.4, 0.3]);
        assert_eq!(config.chat.history_capacity, 1000);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = IntentConfig::default();
        config.training.validation_split = 1.0;
        assert!(matches!(
            config.validate(),
            Err(IntentError::InvalidConfig(_))
        ));

        let mut config = IntentConfig::default();
        config.network.lstm_dropout = 1.5;
        assert!(config.validate().is_err());

        let mut config = IntentConfig::default();
        config.model.name = "../escape/x".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"model": {"directory": "out", "name": "bot"}, "network": {"embedding_dim": 32}}"#,
        )
        .unwrap();

        let config = IntentConfig::from_file(&path).unwrap();
        assert_eq!(config.model.directory, PathBuf::from("out"));
        assert_eq!(config.model.name, "bot");
        assert_eq!(config.network.embedding_dim, 32);
        assert_eq!(config.network.lstm_units, [128, 64]);
    }
}
