//! Error types for intent-chat.
//!
//! All fallible operations in the crate return [`Result`], whose error type is
//! [`IntentError`]. Expected conditions of the chat path (empty input, a
//! predicted intent without catalog entry) are not errors; they are ordinary
//! branches of [`crate::chat::InferenceEngine::chat`].
//!
//! # Examples
//!
//! ```
//! use intent_chat::error::{IntentError, Result};
//!
//! fn check_classes(count: usize) -> Result<()> {
//!     if count < 2 {
//!         return Err(IntentError::training_data("at least 2 intent classes are required"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_classes(1).is_err());
//! ```

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The main error type for intent-chat operations.
#[derive(Error, Debug)]
pub enum IntentError {
    /// I/O errors (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tensor computation errors raised by the classifier backend
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// A required persisted artifact does not exist
    #[error("Artifact missing: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    /// A persisted artifact exists but cannot be decoded
    #[error("Corrupt artifact {}: {reason}", path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    /// Artifacts that were loaded together do not agree with each other
    #[error("Artifact mismatch: {0}")]
    ArtifactMismatch(String),

    /// Another training run holds the artifact lock
    #[error("Artifacts are locked by another training run: {}", path.display())]
    ArtifactLocked { path: PathBuf },

    /// The inference engine has no loaded model
    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    /// A class id outside the fitted label range
    #[error("Unknown class id {id} (label index has {num_classes} classes)")]
    UnknownClass { id: usize, num_classes: usize },

    /// A label that was not seen when the label index was fitted
    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    /// The training corpus cannot be used for training
    #[error("Training data invalid: {0}")]
    TrainingDataInvalid(String),

    /// Configuration values out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Analysis-related errors (tokenization, filtering)
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Binary (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation cancelled
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Error carrying added context, printed with its whole cause chain
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with IntentError.
pub type Result<T> = std::result::Result<T, IntentError>;

impl IntentError {
    /// Create a new missing-artifact error.
    pub fn artifact_missing<P: Into<PathBuf>>(path: P) -> Self {
        IntentError::ArtifactMissing { path: path.into() }
    }

    /// Create a new corrupt-artifact error.
    pub fn corrupt_artifact<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        IntentError::CorruptArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new artifact mismatch error.
    pub fn mismatch<S: Into<String>>(msg: S) -> Self {
        IntentError::ArtifactMismatch(msg.into())
    }

    /// Create a new not-loaded error.
    pub fn not_loaded<S: Into<String>>(msg: S) -> Self {
        IntentError::ModelNotLoaded(msg.into())
    }

    /// Create a new training data error.
    pub fn training_data<S: Into<String>>(msg: S) -> Self {
        IntentError::TrainingDataInvalid(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        IntentError::InvalidConfig(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        IntentError::Analysis(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        IntentError::Serialization(msg.into())
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        IntentError::Cancelled(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        IntentError::Other(msg.into())
    }
}
