//! Vocabulary index: normalized tokens to integer ids.
//!
//! Ids are assigned by descending corpus frequency (ties keep first-seen
//! order) starting at 1. Id 0 is a sentinel shared by padding and
//! out-of-vocabulary tokens. Sequences are truncated from the end and
//! post-padded to exactly `sequence_length` ids.
//!
//! # Examples
//!
//! ```
//! use intent_chat::encoding::VocabularyIndex;
//!
//! let corpus = vec![
//!     vec!["web".to_string(), "design".to_string()],
//!     vec!["web".to_string(), "hosting".to_string()],
//! ];
//! let vocabulary = VocabularyIndex::build(&corpus, 100, 4).unwrap();
//!
//! let encoded = vocabulary.encode(&["web".to_string(), "unknown".to_string()]);
//! assert_eq!(encoded.ids(), &[1, 0, 0, 0]);
//! ```

use std::collections::HashMap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{IntentError, Result};

/// Id used for padding and for tokens outside the vocabulary.
pub const SENTINEL_ID: u32 = 0;

/// Token text stored at the sentinel position of the inverse mapping.
pub const SENTINEL_TOKEN: &str = "<PAD>";

/// A fixed-length sequence of token ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedSequence(Vec<u32>);

impl EncodedSequence {
    /// Wrap raw ids. The caller is responsible for the length invariant.
    pub fn from_ids(ids: Vec<u32>) -> Self {
        EncodedSequence(ids)
    }

    /// The ids of this sequence.
    pub fn ids(&self) -> &[u32] {
        &self.0
    }

    /// Number of ids (always the vocabulary's sequence length when produced by `encode`).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the sequence holds no ids at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length of the prefix that ends at the last non-sentinel id.
    pub fn content_len(&self) -> usize {
        self.0
            .iter()
            .rposition(|&id| id != SENTINEL_ID)
            .map_or(0, |pos| pos + 1)
    }
}

/// Bidirectional mapping between normalized tokens and integer ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyIndex {
    /// Token to id; never contains the sentinel.
    token_to_id: HashMap<String, u32>,
    /// Id to token; position 0 holds [`SENTINEL_TOKEN`].
    id_to_token: Vec<String>,
    /// Length of every encoded sequence.
    sequence_length: usize,
    /// Upper bound on ids (sentinel included) requested at build time.
    max_size: usize,
}

impl VocabularyIndex {
    /// Build a vocabulary from normalized token sequences.
    ///
    /// Keeps the `max_size - 1` most frequent tokens.
    pub fn build(
        sequences: &[Vec<String>],
        max_size: usize,
        sequence_length: usize,
    ) -> Result<Self> {
        if max_size < 2 {
            return Err(IntentError::invalid_config(format!(
                "vocabulary size must be at least 2, got {max_size}"
            )));
        }
        if sequence_length == 0 {
            return Err(IntentError::invalid_config(
                "sequence length must be greater than 0",
            ));
        }

        // token -> (count, first seen)
        let mut counts: AHashMap<&str, (usize, usize)> = AHashMap::new();
        let mut seen = 0usize;
        for token in sequences.iter().flatten() {
            let entry = counts.entry(token.as_str()).or_insert_with(|| {
                seen += 1;
                (0, seen)
            });
            entry.0 += 1;
        }

        let mut ranked: Vec<(&str, usize, usize)> = counts
            .into_iter()
            .map(|(token, (count, first))| (token, count, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.truncate(max_size - 1);

        let mut id_to_token = Vec::with_capacity(ranked.len() + 1);
        id_to_token.push(SENTINEL_TOKEN.to_string());
        let mut token_to_id = HashMap::with_capacity(ranked.len());
        for (token, _, _) in ranked {
            token_to_id.insert(token.to_string(), id_to_token.len() as u32);
            id_to_token.push(token.to_string());
        }

        Ok(Self {
            token_to_id,
            id_to_token,
            sequence_length,
            max_size,
        })
    }

    /// Encode a token sequence to exactly `sequence_length` ids.
    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> EncodedSequence {
        let mut ids: Vec<u32> = tokens
            .iter()
            .take(self.sequence_length)
            .map(|token| self.id_of(token.as_ref()))
            .collect();
        ids.resize(self.sequence_length, SENTINEL_ID);
        EncodedSequence(ids)
    }

    /// Map ids back to tokens, skipping sentinel positions.
    pub fn decode(&self, sequence: &EncodedSequence) -> Vec<&str> {
        sequence
            .ids()
            .iter()
            .filter(|&&id| id != SENTINEL_ID)
            .filter_map(|&id| self.token_of(id))
            .collect()
    }

    /// Id of a token, or the sentinel when out of vocabulary.
    pub fn id_of(&self, token: &str) -> u32 {
        self.token_to_id.get(token).copied().unwrap_or(SENTINEL_ID)
    }

    /// Token for an id, `None` if the id is outside the vocabulary.
    pub fn token_of(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    /// Number of ids in use, sentinel included. Every encoded id is below this.
    pub fn size(&self) -> usize {
        self.id_to_token.len()
    }

    /// Configured upper bound on the vocabulary size.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Length of every encoded sequence.
    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_ids_follow_frequency_then_first_seen() {
        let corpus = vec![
            tokens(&["web", "design"]),
            tokens(&["hosting", "web"]),
            tokens(&["design", "seo", "web"]),
        ];
        let vocabulary = VocabularyIndex::build(&corpus, 100, 10).unwrap();

        assert_eq!(vocabulary.id_of("web"), 1);
        assert_eq!(vocabulary.id_of("design"), 2);
        assert_eq!(vocabulary.id_of("hosting"), 3);
        assert_eq!(vocabulary.id_of("seo"), 4);
        assert_eq!(vocabulary.size(), 5);
        assert_eq!(vocabulary.token_of(0), Some(SENTINEL_TOKEN));
    }

    #[test]
    fn test_size_bound_keeps_most_frequent() {
        let corpus = vec![tokens(&["a", "b", "b", "c", "c", "c"])];
        let vocabulary = VocabularyIndex::build(&corpus, 3, 5).unwrap();

        assert_eq!(vocabulary.size(), 3);
        assert_eq!(vocabulary.id_of("c"), 1);
        assert_eq!(vocabulary.id_of("b"), 2);
        assert_eq!(vocabulary.id_of("a"), SENTINEL_ID);
    }

    #[test]
    fn test_encode_pads_after_content() {
        let corpus = vec![tokens(&["pricing", "quote", "budget"])];
        let vocabulary = VocabularyIndex::build(&corpus, 100, 50).unwrap();

        for n in 0..=3 {
            let input = &tokens(&["pricing", "quote", "budget"])[..n];
            let encoded = vocabulary.encode(input);

            assert_eq!(encoded.len(), 50);
            for (i, token) in input.iter().enumerate() {
                assert_eq!(encoded.ids()[i], vocabulary.id_of(token));
            }
            assert!(encoded.ids()[n..].iter().all(|&id| id == SENTINEL_ID));
            assert_eq!(encoded.content_len(), n);
        }
    }

    #[test]
    fn test_encode_truncates_from_end_and_maps_oov() {
        let corpus = vec![tokens(&["one", "two", "three"])];
        let vocabulary = VocabularyIndex::build(&corpus, 100, 2).unwrap();

        let encoded = vocabulary.encode(&tokens(&["two", "three", "one"]));
        assert_eq!(encoded.ids(), &[2, 3]);

        let encoded = vocabulary.encode(&tokens(&["zebra", "one"]));
        assert_eq!(encoded.ids(), &[SENTINEL_ID, 1]);
        assert!(encoded.ids().iter().all(|&id| (id as usize) < vocabulary.size()));
    }

    #[test]
    fn test_decode_skips_sentinel() {
        let corpus = vec![tokens(&["react", "vue"])];
        let vocabulary = VocabularyIndex::build(&corpus, 100, 6).unwrap();

        let encoded = vocabulary.encode(&tokens(&["vue", "angular", "react"]));
        assert_eq!(vocabulary.decode(&encoded), vec!["vue", "react"]);
    }

    #[test]
    fn test_build_rejects_bad_config() {
        let corpus = vec![tokens(&["a"])];
        assert!(VocabularyIndex::build(&corpus, 1, 10).is_err());
        assert!(VocabularyIndex::build(&corpus, 10, 0).is_err());
    }
}
