//! Intent classification model and its training procedure.
//!
//! - [`classifier`]: the [`IntentModel`] trait the inference engine depends on
//! - [`layers`]: LSTM, batch normalization and dense building blocks
//! - [`network`]: the bidirectional LSTM network and its persisted form
//! - [`split`], [`schedule`]: stratified split, early stopping, learning-rate reduction
//! - [`trainer`]: corpus to trained model

pub mod classifier;
pub mod layers;
pub mod network;
pub mod schedule;
pub mod split;
pub mod trainer;

pub use classifier::{IntentModel, argmax};
pub use network::{NamedTensor, NetworkArtifact, NetworkDims, NeuralIntentClassifier};
pub use trainer::{EpochMetrics, Trainer, TrainingHistory, TrainingOutcome};
