//! Inference engine: utterance in, [`ChatExchange`] out.

use log::{error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::analysis::normalize;
use crate::catalog::{CATALOG_MISS_RESPONSE, ResponseCatalog, pick_fallback};
use crate::chat::exchange::{ChatExchange, ExchangeKind};
use crate::chat::history::ConversationHistory;
use crate::config::{ChatConfig, IntentConfig};
use crate::encoding::{LabelIndex, VocabularyIndex};
use crate::error::{IntentError, Result};
use crate::ml::{IntentModel, argmax};
use crate::storage::{ModelBundle, ModelStore};

/// Everything needed to answer a request.
#[derive(Debug)]
struct LoadedModel {
    model: Box<dyn IntentModel>,
    vocabulary: VocabularyIndex,
    labels: LabelIndex,
    catalog: ResponseCatalog,
}

/// Summary of what the engine has loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedInfo {
    pub num_classes: usize,
    pub vocab_size: usize,
    pub sequence_length: usize,
}

/// Classifies utterances, applies the confidence policy and keeps history.
///
/// The engine owns its history and random generator, so `chat` takes
/// `&mut self`; hosts that share an engine wrap it in a mutex.
#[derive(Debug)]
pub struct InferenceEngine {
    loaded: Option<LoadedModel>,
    store: Option<ModelStore>,
    history: ConversationHistory,
    rng: StdRng,
    threshold: f32,
}

impl InferenceEngine {
    /// Create an unloaded engine reading artifacts from the configured model location.
    pub fn new(config: &IntentConfig) -> Self {
        let mut engine = Self::unloaded(&config.chat);
        engine.store = Some(ModelStore::new(config.model.clone()));
        engine
    }

    fn unloaded(config: &ChatConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            loaded: None,
            store: None,
            history: ConversationHistory::new(config.history_capacity),
            rng,
            threshold: config.confidence_threshold,
        }
    }

    /// Build a loaded engine from in-memory parts.
    pub fn from_parts(
        model: Box<dyn IntentModel>,
        vocabulary: VocabularyIndex,
        labels: LabelIndex,
        catalog: ResponseCatalog,
        config: &ChatConfig,
    ) -> Result<Self> {
        let mut engine = Self::unloaded(config);
        engine.install(model, vocabulary, labels, catalog)?;
        Ok(engine)
    }

    fn install(
        &mut self,
        model: Box<dyn IntentModel>,
        vocabulary: VocabularyIndex,
        labels: LabelIndex,
        catalog: ResponseCatalog,
    ) -> Result<()> {
        if model.num_classes() != labels.len() {
            return Err(IntentError::mismatch(format!(
                "classifier '{}' has {} classes but the label index has {}",
                model.name(),
                model.num_classes(),
                labels.len()
            )));
        }
        for label in labels.labels() {
            if !catalog.contains(label) {
                warn!("Intent '{label}' has no responses in the catalog");
            }
        }

        self.loaded = Some(LoadedModel {
            model,
            vocabulary,
            labels,
            catalog,
        });
        Ok(())
    }

    /// Install a freshly trained or loaded bundle.
    pub fn install_bundle(&mut self, bundle: ModelBundle) -> Result<()> {
        let catalog = bundle.corpus.catalog();
        self.install(
            Box::new(bundle.classifier),
            bundle.vocabulary,
            bundle.labels,
            catalog,
        )
    }

    /// Load all artifacts from the model store.
    ///
    /// On failure the engine is left unloaded and `chat` answers with error exchanges.
    pub fn load(&mut self) -> Result<()> {
        let result = match &self.store {
            Some(store) => store.load(),
            None => Err(IntentError::not_loaded("engine has no model store")),
        };

        match result.and_then(|bundle| self.install_bundle(bundle)) {
            Ok(()) => {
                if let Some(info) = self.loaded_info() {
                    info!(
                        "Model loaded: {} intents, vocabulary of {}",
                        info.num_classes, info.vocab_size
                    );
                }
                Ok(())
            }
            Err(e) => {
                self.loaded = None;
                warn!("Failed to load model: {e}");
                Err(e)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn loaded_info(&self) -> Option<LoadedInfo> {
        self.loaded.as_ref().map(|loaded| LoadedInfo {
            num_classes: loaded.labels.len(),
            vocab_size: loaded.vocabulary.size(),
            sequence_length: loaded.vocabulary.sequence_length(),
        })
    }

    pub fn store(&self) -> Option<&ModelStore> {
        self.store.as_ref()
    }

    /// Default confidence threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Answer one utterance. Never fails: faults become error exchanges.
    ///
    /// Classified exchanges are appended to history; empty-input and error
    /// exchanges are only returned.
    pub fn chat(&mut self, utterance: &str, threshold: Option<f32>) -> ChatExchange {
        if utterance.trim().is_empty() {
            return ChatExchange::empty(utterance);
        }

        let threshold = threshold.unwrap_or(self.threshold);
        match self.classify(utterance, threshold) {
            Ok(exchange) => {
                self.history.append(exchange.clone());
                exchange
            }
            Err(e) => {
                error!("Inference failed for {utterance:?}: {e}");
                ChatExchange::failed(utterance, &e)
            }
        }
    }

    fn classify(&mut self, utterance: &str, threshold: f32) -> Result<ChatExchange> {
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| IntentError::not_loaded("no trained model is loaded"))?;

        let tokens = normalize(utterance);
        let encoded = loaded.vocabulary.encode(&tokens);
        let probabilities = loaded.model.predict(&encoded)?;
        if probabilities.len() != loaded.labels.len() {
            return Err(IntentError::mismatch(format!(
                "classifier returned {} probabilities for {} labels",
                probabilities.len(),
                loaded.labels.len()
            )));
        }

        let (class, confidence) = argmax(&probabilities)
            .ok_or_else(|| IntentError::other("classifier returned no probabilities"))?;
        let intent = loaded.labels.decode(class)?;

        let (kind, response) = if confidence >= threshold {
            match loaded.catalog.pick(intent, &mut self.rng) {
                Some(response) => (ExchangeKind::Answered, response.to_string()),
                None => {
                    warn!("No responses for intent '{intent}'");
                    (ExchangeKind::CatalogMiss, CATALOG_MISS_RESPONSE.to_string())
                }
            }
        } else {
            (ExchangeKind::Fallback, pick_fallback(&mut self.rng).to_string())
        };

        Ok(ChatExchange::classified(
            utterance, intent, kind, confidence, response,
        ))
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn reset_history(&mut self) {
        self.history.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EMPTY_INPUT_RESPONSE, ERROR_RESPONSE, FALLBACK_RESPONSES};
    use crate::chat::exchange::{EMPTY_INTENT, ERROR_INTENT};
    use crate::encoding::EncodedSequence;

    /// Returns fixed probabilities; any call on an empty sequence panics.
    #[derive(Debug)]
    struct FixedModel(Vec<f32>);

    impl IntentModel for FixedModel {
        fn predict(&self, sequence: &EncodedSequence) -> Result<Vec<f32>> {
            assert!(!sequence.is_empty());
            Ok(self.0.clone())
        }

        fn num_classes(&self) -> usize {
            self.0.len()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn engine(probabilities: Vec<f32>, catalog: ResponseCatalog) -> InferenceEngine {
        let vocabulary =
            VocabularyIndex::build(&[vec!["hello".to_string()]], 10, 5).unwrap();
        let labels = LabelIndex::fit(["greeting", "goodbye"]);
        let config = ChatConfig {
            seed: Some(1),
            ..ChatConfig::default()
        };
        InferenceEngine::from_parts(
            Box::new(FixedModel(probabilities)),
            vocabulary,
            labels,
            catalog,
            &config,
        )
        .unwrap()
    }

    fn catalog() -> ResponseCatalog {
        let mut catalog = ResponseCatalog::new();
        catalog.insert("greeting".to_string(), vec!["Hello!".to_string()]);
        catalog.insert("goodbye".to_string(), vec!["Goodbye!".to_string()]);
        catalog
    }

    #[test]
    fn test_confident_answer() {
        let mut engine = engine(vec![0.8, 0.2], catalog());
        let exchange = engine.chat("Hello", None);

        assert_eq!(exchange.kind, ExchangeKind::Answered);
        assert_eq!(exchange.intent, "greeting");
        assert_eq!(exchange.response, "Hello!");
        assert!((exchange.confidence - 0.8).abs() < 1e-6);
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn test_low_confidence_falls_back() {
        let mut engine = engine(vec![0.4, 0.6], catalog());
        let exchange = engine.chat("Hello", Some(0.7));

        assert_eq!(exchange.kind, ExchangeKind::Fallback);
        assert_eq!(exchange.intent, "goodbye");
        assert!(FALLBACK_RESPONSES.contains(&exchange.response.as_str()));
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut engine = engine(vec![0.5, 0.5], catalog());
        assert_eq!(engine.chat("Hello", None).kind, ExchangeKind::Answered);
    }

    #[test]
    fn test_catalog_miss() {
        let mut partial = ResponseCatalog::new();
        partial.insert("goodbye".to_string(), vec!["Goodbye!".to_string()]);
        let mut engine = engine(vec![0.9, 0.1], partial);

        let exchange = engine.chat("Hello", None);
        assert_eq!(exchange.kind, ExchangeKind::CatalogMiss);
        assert_eq!(exchange.intent, "greeting");
        assert_eq!(exchange.response, CATALOG_MISS_RESPONSE);
    }

    #[test]
    fn test_empty_input_skips_classifier() {
        // A model whose prediction would fail the mismatch check.
        let mut engine = engine(vec![1.0, 0.0], catalog());
        engine.loaded.as_mut().unwrap().model = Box::new(FixedModel(vec![1.0]));

        for input in ["", "   ", "\t\n"] {
            let exchange = engine.chat(input, None);
            assert_eq!(exchange.kind, ExchangeKind::Empty);
            assert_eq!(exchange.intent, EMPTY_INTENT);
            assert_eq!(exchange.confidence, 0.0);
            assert_eq!(exchange.response, EMPTY_INPUT_RESPONSE);
        }
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_unloaded_engine_answers_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = IntentConfig::default();
        config.model.directory = dir.path().to_path_buf();
        let mut engine = InferenceEngine::new(&config);

        assert!(matches!(
            engine.load(),
            Err(IntentError::ArtifactMissing { .. })
        ));
        assert!(!engine.is_loaded());

        let exchange = engine.chat("Hello", None);
        assert_eq!(exchange.kind, ExchangeKind::Error);
        assert_eq!(exchange.intent, ERROR_INTENT);
        assert_eq!(exchange.confidence, 0.0);
        assert_eq!(exchange.response, ERROR_RESPONSE);
        assert!(exchange.error.is_some());
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_class_count_mismatch_rejected() {
        let vocabulary = VocabularyIndex::build(&[vec!["hello".to_string()]], 10, 5).unwrap();
        let result = InferenceEngine::from_parts(
            Box::new(FixedModel(vec![0.2, 0.3, 0.5])),
            vocabulary,
            LabelIndex::fit(["greeting", "goodbye"]),
            catalog(),
            &ChatConfig::default(),
        );
        assert!(matches!(result, Err(IntentError::ArtifactMismatch(_))));
    }

    #[test]
    fn test_reset_history() {
        let mut engine = engine(vec![0.8, 0.2], catalog());
        engine.chat("Hello", None);
        engine.chat("Hi", None);
        assert_eq!(engine.history().len(), 2);

        engine.reset_history();
        assert!(engine.history().is_empty());
    }
}
