//! Training corpus: intent records, validation and augmentation.
//!
//! The corpus is the JSON document `{"intents": [{"tag", "patterns", "responses"}]}`.
//! It is the input of training and, reduced to `tag -> responses`, the source
//! of the [`ResponseCatalog`].

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::ResponseCatalog;
use crate::error::{IntentError, Result};

const DEFAULT_CORPUS_JSON: &str = include_str!("../resources/default_intents.json");

/// One intent: its unique tag, example utterances and candidate replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub tag: String,
    pub patterns: Vec<String>,
    pub responses: Vec<String>,
}

impl IntentRecord {
    pub fn new<S: Into<String>>(tag: S, patterns: Vec<String>, responses: Vec<String>) -> Self {
        IntentRecord {
            tag: tag.into(),
            patterns,
            responses,
        }
    }
}

/// An utterance paired with its intent tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledUtterance {
    pub text: String,
    pub tag: String,
}

impl LabeledUtterance {
    pub fn new<T: Into<String>, G: Into<String>>(text: T, tag: G) -> Self {
        LabeledUtterance {
            text: text.into(),
            tag: tag.into(),
        }
    }
}

/// The full set of intent records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingCorpus {
    pub intents: Vec<IntentRecord>,
}

impl TrainingCorpus {
    pub fn new(intents: Vec<IntentRecord>) -> Self {
        TrainingCorpus { intents }
    }

    /// The built-in web-development assistant corpus.
    pub fn default_corpus() -> Result<Self> {
        Self::from_json_str(DEFAULT_CORPUS_JSON)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a corpus from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the corpus as pretty-printed JSON.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), self.to_json_string()?)?;
        Ok(())
    }

    /// Check that the corpus can be trained on.
    ///
    /// With `require_split`, every tag needs at least two patterns so that it
    /// can appear on both sides of a stratified split.
    pub fn validate(&self, require_split: bool) -> Result<()> {
        if self.intents.len() < 2 {
            return Err(IntentError::training_data(format!(
                "at least 2 intent classes are required, found {}",
                self.intents.len()
            )));
        }

        let mut tags = HashSet::new();
        for intent in &self.intents {
            if intent.tag.trim().is_empty() {
                return Err(IntentError::training_data("intent with an empty tag"));
            }
            if !tags.insert(intent.tag.as_str()) {
                return Err(IntentError::training_data(format!(
                    "duplicate tag '{}'",
                    intent.tag
                )));
            }
            if intent.patterns.is_empty() {
                return Err(IntentError::training_data(format!(
                    "tag '{}' has no patterns",
                    intent.tag
                )));
            }
            if intent.responses.is_empty() {
                return Err(IntentError::training_data(format!(
                    "tag '{}' has no responses",
                    intent.tag
                )));
            }
            if require_split && intent.patterns.len() < 2 {
                return Err(IntentError::training_data(format!(
                    "tag '{}' has {} pattern(s); at least 2 are required for a validation split",
                    intent.tag,
                    intent.patterns.len()
                )));
            }
        }

        Ok(())
    }

    /// Flatten into (utterance, tag) pairs in corpus order.
    pub fn examples(&self) -> Vec<LabeledUtterance> {
        self.intents
            .iter()
            .flat_map(|intent| {
                intent
                    .patterns
                    .iter()
                    .map(move |pattern| LabeledUtterance::new(pattern.as_str(), intent.tag.as_str()))
            })
            .collect()
    }

    /// Tags in corpus order.
    pub fn tags(&self) -> Vec<&str> {
        self.intents.iter().map(|intent| intent.tag.as_str()).collect()
    }

    /// Reduce the corpus to its response catalog.
    pub fn catalog(&self) -> ResponseCatalog {
        ResponseCatalog::from_corpus(self)
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

/// Add simple surface variants of every example.
///
/// For each pair: the original, `text + "?"` unless it already ends with a
/// question mark, and the whitespace-collapsed text when it differs.
pub fn augment(examples: &[LabeledUtterance]) -> Vec<LabeledUtterance> {
    let mut augmented = Vec::with_capacity(examples.len() * 3);

    for example in examples {
        augmented.push(example.clone());

        if !example.text.ends_with('?') {
            augmented.push(LabeledUtterance::new(
                format!("{}?", example.text),
                example.tag.as_str(),
            ));
        }

        let collapsed = example.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed != example.text {
            augmented.push(LabeledUtterance::new(collapsed, example.tag.as_str()));
        }
    }

    augmented
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: &str, patterns: &[&str], responses: &[&str]) -> IntentRecord {
        IntentRecord::new(
            tag,
            patterns.iter().map(|s| s.to_string()).collect(),
            responses.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_default_corpus() {
        let corpus = TrainingCorpus::default_corpus().unwrap();

        assert_eq!(corpus.len(), 10);
        assert_eq!(corpus.tags()[0], "greeting");
        assert!(corpus.tags().contains(&"goodbye"));
        corpus.validate(true).unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_corpora() {
        let single = TrainingCorpus::new(vec![record("greeting", &["Hi", "Hello"], &["Hello!"])]);
        assert!(matches!(
            single.validate(false),
            Err(IntentError::TrainingDataInvalid(_))
        ));

        let duplicate = TrainingCorpus::new(vec![
            record("greeting", &["Hi", "Hello"], &["Hello!"]),
            record("greeting", &["Hey", "Yo"], &["Hey!"]),
        ]);
        let err = duplicate.validate(false).unwrap_err();
        assert!(err.to_string().contains("duplicate tag 'greeting'"));

        let no_responses = TrainingCorpus::new(vec![
            record("greeting", &["Hi", "Hello"], &["Hello!"]),
            record("goodbye", &["Bye", "See you"], &[]),
        ]);
        assert!(no_responses.validate(false).is_err());

        let single_pattern = TrainingCorpus::new(vec![
            record("greeting", &["Hi", "Hello"], &["Hello!"]),
            record("goodbye", &["Bye"], &["Goodbye!"]),
        ]);
        assert!(single_pattern.validate(false).is_ok());
        let err = single_pattern.validate(true).unwrap_err();
        assert!(err.to_string().contains("goodbye"));
    }

    #[test]
    fn test_examples_preserve_order() {
        let corpus = TrainingCorpus::new(vec![
            record("greeting", &["Hi", "Hello"], &["Hello!"]),
            record("goodbye", &["Bye"], &["Goodbye!"]),
        ]);

        let examples = corpus.examples();
        assert_eq!(
            examples,
            vec![
                LabeledUtterance::new("Hi", "greeting"),
                LabeledUtterance::new("Hello", "greeting"),
                LabeledUtterance::new("Bye", "goodbye"),
            ]
        );
    }

    #[test]
    fn test_augment() {
        let examples = vec![
            LabeledUtterance::new("How much", "pricing"),
            LabeledUtterance::new("What is the cost?", "pricing"),
            LabeledUtterance::new("  web   design ", "services"),
        ];

        let augmented = augment(&examples);

        assert!(augmented.len() > examples.len());
        assert_eq!(
            augmented,
            vec![
                LabeledUtterance::new("How much", "pricing"),
                LabeledUtterance::new("How much?", "pricing"),
                LabeledUtterance::new("What is the cost?", "pricing"),
                LabeledUtterance::new("  web   design ", "services"),
                LabeledUtterance::new("  web   design ?", "services"),
                LabeledUtterance::new("web design", "services"),
            ]
        );
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intents.json");

        let corpus = TrainingCorpus::default_corpus().unwrap();
        corpus.to_json_file(&path).unwrap();

        let loaded = TrainingCorpus::from_json_file(&path).unwrap();
        assert_eq!(corpus, loaded);
    }
}
