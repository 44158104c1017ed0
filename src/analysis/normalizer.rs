//! Utterance normalization shared by training and inference.
//!
//! [`normalize`] is the single entry point both sides use: lowercase the
//! whole utterance, split it into alphabetic runs, drop stop words and any
//! token that is not purely alphabetic. It never fails; if the analyzer
//! reports an error the utterance normalizes to an empty sequence.

use std::fmt;
use std::sync::{Arc, LazyLock};

use log::warn;

use crate::analysis::analyzer::{Analyzer, EnglishAnalyzer};
use crate::error::Result;

static DEFAULT_NORMALIZER: LazyLock<Option<Normalizer>> = LazyLock::new(|| {
    Normalizer::english()
        .map_err(|e| warn!("English analyzer unavailable: {e}"))
        .ok()
});

/// Normalize an utterance with the default English pipeline.
pub fn normalize(text: &str) -> Vec<String> {
    match DEFAULT_NORMALIZER.as_ref() {
        Some(normalizer) => normalizer.normalize(text),
        None => Vec::new(),
    }
}

/// Normalize an utterance and join the tokens with single spaces.
pub fn normalize_to_string(text: &str) -> String {
    normalize(text).join(" ")
}

/// Lowercases an utterance and runs it through an analyzer.
#[derive(Clone)]
pub struct Normalizer {
    analyzer: Arc<dyn Analyzer>,
}

impl Normalizer {
    /// Create a normalizer around a custom analyzer.
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self { analyzer }
    }

    /// The default English normalizer.
    pub fn english() -> Result<Self> {
        Ok(Self::new(Arc::new(EnglishAnalyzer::new()?)))
    }

    /// Normalize an utterance into its token sequence.
    pub fn normalize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        match self.analyzer.analyze(&lowered) {
            Ok(tokens) => tokens.map(|token| token.text).collect(),
            Err(e) => {
                warn!("Normalization failed, treating utterance as empty: {e}");
                Vec::new()
            }
        }
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("analyzer", &self.analyzer.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("Hello"), vec!["hello"]);
        assert_eq!(normalize("How much does it cost?"), vec!["much", "cost"]);
        assert_eq!(
            normalize("React development, Node.js & MongoDB!"),
            vec!["react", "development", "node", "js", "mongodb"]
        );
    }

    #[test]
    fn test_normalize_drops_digits_and_punctuation() {
        assert_eq!(normalize("24/7 support"), vec!["support"]);
        assert!(normalize("?!... 123").is_empty());
    }

    #[test]
    fn test_normalize_empty_and_stopword_only() {
        assert!(normalize("").is_empty());
        assert!(normalize("   ").is_empty());
        assert!(normalize("What is it?").is_empty());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "Hi there!",
            "What's the PRICE of an e-commerce website??",
            "  Tell   me about   web development ",
            "Café au lait, s'il vous plaît",
            "ROI of website 2024",
            "",
        ];

        for input in inputs {
            let once = normalize(input);
            let twice = normalize(&normalize_to_string(input));
            assert_eq!(once, twice, "normalization not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_normalize_to_string() {
        assert_eq!(normalize_to_string("Good   Morning!"), "good morning");
    }
}
