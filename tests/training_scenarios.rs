use std::path::Path;

use intent_chat::chat::{ChatRequest, ChatService, ExchangeKind, HistoryRequest, RetrainRequest};
use intent_chat::config::{ChatConfig, IntentConfig, ModelLocation, NetworkConfig, TrainingConfig};
use intent_chat::corpus::{IntentRecord, TrainingCorpus};
use intent_chat::error::{IntentError, Result};
use intent_chat::ml::Trainer;
use intent_chat::storage::ModelStore;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn greeting_corpus() -> TrainingCorpus {
    TrainingCorpus::new(vec![
        IntentRecord::new(
            "greeting",
            strings(&["Hello", "Hello friend", "Hi there", "Hey", "Hello hello"]),
            strings(&["Hello!"]),
        ),
        IntentRecord::new(
            "goodbye",
            strings(&["Bye", "Goodbye", "See you later", "Bye for now", "Farewell"]),
            strings(&["Goodbye!"]),
        ),
    ])
}

fn small_config(directory: &Path) -> IntentConfig {
    IntentConfig {
        model: ModelLocation::new(directory, "scenario_model"),
        training: TrainingConfig {
            epochs: 80,
            batch_size: 4,
            learning_rate: 0.01,
            validation_split: 0.0,
            early_stopping_patience: 80,
            lr_patience: 80,
            vocab_size: 100,
            sequence_length: 8,
            ..TrainingConfig::default()
        },
        network: NetworkConfig {
            embedding_dim: 16,
            lstm_units: [8, 8],
            dense_units: [16, 8],
            embedding_dropout: 0.0,
            lstm_dropout: 0.0,
            recurrent_dropout: 0.0,
            dense_dropout: [0.1, 0.1],
            ..NetworkConfig::default()
        },
        chat: ChatConfig {
            seed: Some(7),
            ..ChatConfig::default()
        },
    }
}

fn train(config: &IntentConfig, corpus: &TrainingCorpus) -> Result<()> {
    let store = ModelStore::new(config.model.clone());
    Trainer::from_config(config).train_and_save(corpus, &store)?;
    Ok(())
}

#[test]
fn trained_model_answers_greeting_from_its_catalog() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = small_config(dir.path());
    train(&config, &greeting_corpus())?;

    let service = ChatService::open(config);
    let status = service.status();
    assert!(status.ready);
    assert!(status.artifacts.all());
    assert_eq!(status.num_intents, Some(2));

    let reply = service.chat(&ChatRequest::new("Hello").with_threshold(0.0));
    assert_eq!(reply.intent, "greeting");
    assert_eq!(reply.response, "Hello!");
    assert!(reply.error.is_none());
    assert!(reply.confidence > 0.5);

    let history = service.history(&HistoryRequest::default());
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, ExchangeKind::Answered);
    Ok(())
}

#[test]
fn unreachable_threshold_always_falls_back() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = small_config(dir.path());
    train(&config, &greeting_corpus())?;

    let service = ChatService::open(config);
    for message in ["Hello", "Bye", "What is the weather like?"] {
        let reply = service.chat(&ChatRequest::new(message).with_threshold(1.01));
        assert_ne!(reply.response, "Hello!");
        assert_ne!(reply.response, "Goodbye!");
        assert!(reply.confidence <= 1.0);
    }

    let history = service.history(&HistoryRequest { limit: Some(10) });
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|e| e.kind == ExchangeKind::Fallback));
    Ok(())
}

#[test]
fn single_pattern_intent_is_rejected_before_writing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = small_config(dir.path());
    config.training.validation_split = 0.2;

    let mut corpus = greeting_corpus();
    corpus.intents.push(IntentRecord::new(
        "thanks",
        strings(&["Thanks"]),
        strings(&["You're welcome!"]),
    ));

    let err = train(&config, &corpus).unwrap_err();
    match err {
        IntentError::TrainingDataInvalid(message) => assert!(message.contains("thanks")),
        other => panic!("unexpected error: {other}"),
    }

    let store = ModelStore::new(config.model.clone());
    let presence = store.presence();
    assert!(!presence.classifier && !presence.vocabulary && !presence.labels && !presence.corpus);
    assert!(!store.paths().lock.exists());
    Ok(())
}

#[test]
fn training_takes_over_a_lock_left_by_a_dead_process() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = small_config(dir.path());
    config.training.epochs = 5;

    // An interrupted run leaves its lock file behind.
    let store = ModelStore::new(config.model.clone());
    std::fs::create_dir_all(&store.paths().directory)?;
    std::fs::write(&store.paths().lock, "999999\n")?;

    train(&config, &greeting_corpus())?;

    assert!(store.presence().all());
    assert!(ChatService::open(config).status().ready);
    Ok(())
}

#[test]
fn retrain_reloads_the_engine_from_the_stored_corpus() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = small_config(dir.path());
    train(&config, &greeting_corpus())?;

    let service = ChatService::open(config);
    service.chat(&ChatRequest::new("Hello"));

    let response = service.retrain(&RetrainRequest {
        epochs: Some(5),
        batch_size: Some(4),
    })?;
    assert_eq!(response.epochs, 5);
    assert_eq!(response.history.num_classes, 2);
    assert!(response.final_val_accuracy.is_none());

    let status = service.status();
    assert!(status.ready);
    assert_eq!(status.history_len, 1);

    let stored = TrainingCorpus::from_json_file(&ModelStore::new(ModelLocation::new(
        dir.path(),
        "scenario_model",
    ))
    .paths()
    .corpus)?;
    assert_eq!(stored, greeting_corpus());
    Ok(())
}
