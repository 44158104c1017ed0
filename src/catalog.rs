//! Response catalog and the fixed replies of the chat path.

use std::collections::HashMap;

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::corpus::TrainingCorpus;

/// Clarification prompts used when the classifier is not confident enough.
pub const FALLBACK_RESPONSES: [&str; 4] = [
    "I'm not entirely sure I understand. Could you please rephrase that?",
    "Could you be more specific about what you're looking for?",
    "I want to make sure I give you the right information. Can you ask that in a different way?",
    "Let me connect you with our team for more detailed assistance. In the meantime, feel free to browse our services on the website.",
];

/// Reply when the predicted intent has no catalog entry.
pub const CATALOG_MISS_RESPONSE: &str =
    "I'm not sure how to respond to that. Could you please rephrase your question?";

/// Reply to an empty or whitespace-only message.
pub const EMPTY_INPUT_RESPONSE: &str = "Please enter a message.";

/// Reply when inference fails.
pub const ERROR_RESPONSE: &str = "I'm experiencing technical difficulties. Please try again later.";

/// Pick one of the fallback prompts uniformly at random.
pub fn pick_fallback<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    FALLBACK_RESPONSES
        .choose(rng)
        .copied()
        .unwrap_or(FALLBACK_RESPONSES[0])
}

/// Intent tag to candidate replies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCatalog {
    entries: HashMap<String, Vec<String>>,
}

impl ResponseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the catalog from a corpus. Tags without responses are left out.
    pub fn from_corpus(corpus: &TrainingCorpus) -> Self {
        let mut catalog = Self::new();
        for intent in &corpus.intents {
            catalog.insert(intent.tag.clone(), intent.responses.clone());
        }
        catalog
    }

    /// Set the replies of a tag. An empty list removes the entry.
    pub fn insert(&mut self, tag: String, responses: Vec<String>) {
        if responses.is_empty() {
            self.entries.remove(&tag);
        } else {
            self.entries.insert(tag, responses);
        }
    }

    pub fn responses(&self, tag: &str) -> Option<&[String]> {
        self.entries.get(tag).map(Vec::as_slice)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    /// Pick a reply for `tag` uniformly at random, `None` on a catalog miss.
    pub fn pick<R: Rng + ?Sized>(&self, tag: &str, rng: &mut R) -> Option<&str> {
        self.entries
            .get(tag)
            .and_then(|responses| responses.choose(rng))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::IntentRecord;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_from_corpus() {
        let corpus = TrainingCorpus::new(vec![
            IntentRecord::new(
                "greeting",
                vec!["Hi".to_string()],
                vec!["Hello!".to_string(), "Hi there!".to_string()],
            ),
            IntentRecord::new("goodbye", vec!["Bye".to_string()], vec![]),
        ]);

        let catalog = corpus.catalog();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.responses("greeting").unwrap().len(), 2);
        assert!(!catalog.contains("goodbye"));
    }

    #[test]
    fn test_pick() {
        let mut catalog = ResponseCatalog::new();
        catalog.insert(
            "greeting".to_string(),
            vec!["Hello!".to_string(), "Hi there!".to_string()],
        );
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..20 {
            let reply = catalog.pick("greeting", &mut rng).unwrap();
            assert!(reply == "Hello!" || reply == "Hi there!");
        }
        assert!(catalog.pick("pricing", &mut rng).is_none());
    }

    #[test]
    fn test_pick_fallback_is_deterministic_for_seed() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);

        for _ in 0..10 {
            let reply = pick_fallback(&mut a);
            assert!(FALLBACK_RESPONSES.contains(&reply));
            assert_eq!(reply, pick_fallback(&mut b));
        }
    }
}
