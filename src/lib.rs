//! # intent-chat
//!
//! An intent-classification conversational assistant.
//!
//! Utterances are normalized, encoded against a learned vocabulary and
//! classified by a bidirectional LSTM. A confident prediction is answered
//! from the response catalog of the predicted intent; anything else gets a
//! generic fallback reply.
//!
//! ## Layout
//!
//! - [`analysis`]: text normalization (tokenize, lowercase, stop words)
//! - [`encoding`]: vocabulary and label indices
//! - [`corpus`] and [`catalog`]: training data and intent responses
//! - [`ml`]: the network, its training loop and schedules
//! - [`storage`]: checksummed model artifacts on disk
//! - [`chat`]: the inference engine, conversation history and service facade
//! - [`cli`]: the `intent-chat` command line

pub mod analysis;
pub mod catalog;
pub mod chat;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod encoding;
pub mod error;
pub mod ml;
pub mod storage;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
