//! Integer encodings of utterances and intent labels.
//!
//! - [`VocabularyIndex`]: token ↔ id mapping producing fixed-length
//!   [`EncodedSequence`]s for the classifier.
//! - [`LabelIndex`]: intent name ↔ class id bijection.

pub mod label_index;
pub mod vocabulary;

pub use label_index::LabelIndex;
pub use vocabulary::{EncodedSequence, SENTINEL_ID, SENTINEL_TOKEN, VocabularyIndex};
