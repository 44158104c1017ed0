//! Persistence of trained models.
//!
//! A model named `M` is four files in one directory:
//!
//! - `M.bin`: the classifier (architecture and weights)
//! - `M_tokenizer.bin`: the vocabulary index
//! - `M_label_encoder.bin`: the label index
//! - `M_training_data.json`: the training corpus, source of the response catalog
//!
//! Binary files share a checksummed envelope (see [`envelope`]). All four are
//! written to temporary files first and renamed into place together, under a
//! `M.lock` file that keeps concurrent training runs apart.

pub mod envelope;
pub mod store;

pub use envelope::{ArtifactKind, FORMAT_VERSION, MAGIC, read_artifact, write_artifact};
pub use store::{ArtifactLock, ArtifactPresence, ModelBundle, ModelPaths, ModelStore};
