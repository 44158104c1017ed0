//! Training procedure: corpus to vocabulary, labels and a trained classifier.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use candle_core::Tensor;
use candle_nn::loss::cross_entropy;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::normalize;
use crate::config::{IntentConfig, NetworkConfig, TrainingConfig};
use crate::corpus::{TrainingCorpus, augment};
use crate::encoding::{EncodedSequence, LabelIndex, VocabularyIndex};
use crate::error::{IntentError, Result};
use crate::ml::network::{NamedTensor, NetworkDims, NeuralIntentClassifier};
use crate::ml::schedule::{EarlyStopping, Progress, ReduceLrOnPlateau};
use crate::ml::split::stratified_split;
use crate::storage::{ModelBundle, ModelStore};

/// Metrics of one training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number.
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
    /// Learning rate used during the epoch.
    pub learning_rate: f64,
}

/// Summary of a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    /// Epoch whose weights were restored at the end.
    pub best_epoch: usize,
    pub stopped_early: bool,
    /// Examples after augmentation.
    pub num_examples: usize,
    pub num_train: usize,
    pub num_validation: usize,
    pub num_classes: usize,
    pub vocab_size: usize,
}

impl TrainingHistory {
    pub fn epochs_run(&self) -> usize {
        self.epochs.len()
    }

    /// Metrics of the final epoch.
    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Metrics of the epoch whose weights the model carries.
    pub fn best(&self) -> Option<&EpochMetrics> {
        self.epochs.iter().find(|m| m.epoch == self.best_epoch)
    }

    pub fn learning_rates(&self) -> Vec<f64> {
        self.epochs.iter().map(|m| m.learning_rate).collect()
    }
}

/// Everything a training run produces.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub model: ModelBundle,
    pub history: TrainingHistory,
}

struct Checkpoint {
    epoch: usize,
    accuracy: f64,
    loss: f64,
    weights: Vec<NamedTensor>,
}

/// Trains intent classifiers.
#[derive(Debug, Clone)]
pub struct Trainer {
    training: TrainingConfig,
    network: NetworkConfig,
    cancel: Arc<AtomicBool>,
}

impl Trainer {
    pub fn new(training: TrainingConfig, network: NetworkConfig) -> Self {
        Self {
            training,
            network,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &IntentConfig) -> Self {
        Self::new(config.training.clone(), config.network.clone())
    }

    /// Share a cancellation flag; setting it aborts training at the next batch.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn training_config(&self) -> &TrainingConfig {
        &self.training
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(IntentError::cancelled("training cancelled"));
        }
        Ok(())
    }

    /// Train, then persist all artifacts under the store's lock.
    ///
    /// Nothing is written unless training succeeds.
    pub fn train_and_save(
        &self,
        corpus: &TrainingCorpus,
        store: &ModelStore,
    ) -> Result<TrainingOutcome> {
        corpus.validate(self.training.has_validation())?;
        let lock = store.lock()?;
        let outcome = self.train(corpus)?;
        store.save(&outcome.model, &lock)?;
        info!(
            "Saved model '{}' to {}",
            store.location().name,
            store.location().directory.display()
        );
        Ok(outcome)
    }

    /// Run the full training procedure in memory.
    pub fn train(&self, corpus: &TrainingCorpus) -> Result<TrainingOutcome> {
        let config = &self.training;
        config.validate()?;
        self.network.validate()?;
        corpus.validate(config.has_validation())?;

        let examples = augment(&corpus.examples());
        let tokens: Vec<Vec<String>> = examples
            .par_iter()
            .map(|example| normalize(&example.text))
            .collect();

        let vocabulary = VocabularyIndex::build(&tokens, config.vocab_size, config.sequence_length)?;
        let sequences: Vec<EncodedSequence> =
            tokens.iter().map(|t| vocabulary.encode(t)).collect();

        let labels = LabelIndex::fit(examples.iter().map(|example| example.tag.as_str()));
        let targets = examples
            .iter()
            .map(|example| labels.encode(&example.tag))
            .collect::<Result<Vec<u32>>>()?;

        let split = stratified_split(&targets, config.validation_split, config.seed)?;
        info!(
            "Training on {} examples ({} train / {} validation), {} classes, vocabulary of {}",
            examples.len(),
            split.train.len(),
            split.validation.len(),
            labels.len(),
            vocabulary.size()
        );

        let dims = NetworkDims {
            vocab_size: vocabulary.size(),
            sequence_length: config.sequence_length,
            num_classes: labels.len(),
        };
        let classifier = NeuralIntentClassifier::new(self.network.clone(), dims, config.seed)?;

        let params = ParamsAdamW {
            lr: config.learning_rate,
            beta1: config.beta1,
            beta2: config.beta2,
            eps: config.epsilon,
            weight_decay: 0.0,
        };
        let mut optimizer = AdamW::new(classifier.trainable_vars()?, params)?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut early_stopping = EarlyStopping::new(config.early_stopping_patience);
        let mut plateau = ReduceLrOnPlateau::new(
            config.lr_factor,
            config.lr_patience,
            config.min_learning_rate,
        );
        let mut history = TrainingHistory {
            num_examples: examples.len(),
            num_train: split.train.len(),
            num_validation: split.validation.len(),
            num_classes: labels.len(),
            vocab_size: vocabulary.size(),
            ..TrainingHistory::default()
        };
        let mut best: Option<Checkpoint> = None;
        let mut order = split.train.clone();

        for epoch in 1..=config.epochs {
            order.shuffle(&mut rng);
            let learning_rate = optimizer.learning_rate();

            let mut loss_sum = 0.0;
            let mut correct = 0usize;
            for batch in order.chunks(config.batch_size) {
                self.check_cancelled()?;

                let inputs: Vec<&EncodedSequence> = batch.iter().map(|&i| &sequences[i]).collect();
                let expected: Vec<u32> = batch.iter().map(|&i| targets[i]).collect();

                let logits = classifier.logits(&inputs, Some(&mut rng))?;
                let target = Tensor::from_vec(expected.clone(), batch.len(), classifier.device())?;
                let loss = cross_entropy(&logits, &target)?;
                optimizer.backward_step(&loss)?;

                loss_sum += loss.to_scalar::<f32>()? as f64 * batch.len() as f64;
                correct += count_correct(&logits, &expected)?;
            }
            let loss = loss_sum / order.len() as f64;
            let accuracy = correct as f64 / order.len() as f64;

            let validation = if split.validation.is_empty() {
                None
            } else {
                Some(evaluate(
                    &classifier,
                    &sequences,
                    &targets,
                    &split.validation,
                    config.batch_size,
                )?)
            };
            let (monitored_loss, monitored_accuracy) = validation.unwrap_or((loss, accuracy));

            debug!(
                "epoch {epoch}: loss {loss:.4}, accuracy {accuracy:.4}, val_loss {:?}, val_accuracy {:?}, lr {learning_rate:e}",
                validation.map(|v| v.0),
                validation.map(|v| v.1),
            );
            history.epochs.push(EpochMetrics {
                epoch,
                loss,
                accuracy,
                val_loss: validation.map(|v| v.0),
                val_accuracy: validation.map(|v| v.1),
                learning_rate,
            });

            match early_stopping.update(monitored_accuracy, monitored_loss) {
                Progress::Improved => {
                    best = Some(Checkpoint {
                        epoch,
                        accuracy: monitored_accuracy,
                        loss: monitored_loss,
                        weights: classifier.snapshot()?,
                    });
                }
                Progress::Waiting => {}
                Progress::Exhausted => {
                    info!(
                        "Early stopping at epoch {epoch}: no improvement for {} epochs",
                        config.early_stopping_patience
                    );
                    history.stopped_early = true;
                    break;
                }
            }

            if let Some(reduced) = plateau.update(monitored_loss, learning_rate) {
                info!("Reducing learning rate to {reduced:e} after epoch {epoch}");
                optimizer.set_learning_rate(reduced);
            }
        }

        if let Some(checkpoint) = best {
            classifier.restore(&checkpoint.weights)?;
            history.best_epoch = checkpoint.epoch;
            info!(
                "Restored weights of epoch {} (accuracy {:.4}, loss {:.4})",
                checkpoint.epoch, checkpoint.accuracy, checkpoint.loss
            );
        }

        Ok(TrainingOutcome {
            model: ModelBundle {
                classifier,
                vocabulary,
                labels,
                corpus: corpus.clone(),
            },
            history,
        })
    }
}

fn count_correct(logits: &Tensor, expected: &[u32]) -> Result<usize> {
    let predicted = logits.argmax(1)?.to_vec1::<u32>()?;
    Ok(predicted
        .iter()
        .zip(expected)
        .filter(|(p, e)| p == e)
        .count())
}

/// Mean loss and accuracy over `indices` in inference mode.
fn evaluate(
    classifier: &NeuralIntentClassifier,
    sequences: &[EncodedSequence],
    targets: &[u32],
    indices: &[usize],
    batch_size: usize,
) -> Result<(f64, f64)> {
    let mut loss_sum = 0.0;
    let mut correct = 0usize;

    for batch in indices.chunks(batch_size) {
        let inputs: Vec<&EncodedSequence> = batch.iter().map(|&i| &sequences[i]).collect();
        let expected: Vec<u32> = batch.iter().map(|&i| targets[i]).collect();

        let logits = classifier.logits(&inputs, None)?;
        let target = Tensor::from_vec(expected.clone(), batch.len(), classifier.device())?;
        loss_sum += cross_entropy(&logits, &target)?.to_scalar::<f32>()? as f64 * batch.len() as f64;
        correct += count_correct(&logits, &expected)?;
    }

    let n = indices.len() as f64;
    Ok((loss_sum / n, correct as f64 / n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::IntentRecord;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn tiny_trainer(epochs: usize) -> Trainer {
        let training = TrainingConfig {
            epochs,
            batch_size: 4,
            learning_rate: 0.01,
            early_stopping_patience: epochs,
            ..TrainingConfig::default()
        };
        let network = NetworkConfig {
            embedding_dim: 8,
            lstm_units: [6, 4],
            dense_units: [8, 6],
            ..NetworkConfig::default()
        };
        Trainer::new(training, network)
    }

    fn corpus() -> TrainingCorpus {
        TrainingCorpus::new(vec![
            IntentRecord::new(
                "greeting",
                strings(&["Hello", "Hi there", "Hello friend", "Hey"]),
                strings(&["Hello!"]),
            ),
            IntentRecord::new(
                "goodbye",
                strings(&["Bye", "Goodbye", "See you later", "Bye for now"]),
                strings(&["Goodbye!"]),
            ),
        ])
    }

    #[test]
    fn test_history_shape() {
        let outcome = tiny_trainer(3).train(&corpus()).unwrap();
        let history = &outcome.history;

        assert_eq!(history.epochs_run(), 3);
        assert_eq!(history.num_classes, 2);
        assert_eq!(history.num_examples, 16);
        assert_eq!(history.num_train + history.num_validation, 16);
        assert!((1..=3).contains(&history.best_epoch));
        assert!(history.best().is_some());
        assert!(history.epochs.iter().all(|m| m.val_accuracy.is_some()));
        assert_eq!(outcome.model.labels.labels(), &["greeting", "goodbye"]);
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let a = tiny_trainer(2).train(&corpus()).unwrap();
        let b = tiny_trainer(2).train(&corpus()).unwrap();

        assert_eq!(a.history.epochs, b.history.epochs);
        assert_eq!(
            a.model.classifier.snapshot().unwrap(),
            b.model.classifier.snapshot().unwrap()
        );
    }

    #[test]
    fn test_early_stop_restores_last_improvement() {
        for patience in [1, 2] {
            let mut trainer = tiny_trainer(25);
            trainer.training.early_stopping_patience = patience;
            let history = trainer.train(&corpus()).unwrap().history;

            let best = history.best().unwrap();
            let monitored = |m: &EpochMetrics| (m.val_accuracy.unwrap(), m.val_loss.unwrap());
            let (best_accuracy, best_loss) = monitored(best);
            for metrics in &history.epochs {
                let (accuracy, loss) = monitored(metrics);
                assert!(
                    accuracy < best_accuracy || (accuracy == best_accuracy && loss >= best_loss),
                    "epoch {} beats the restored epoch {}",
                    metrics.epoch,
                    history.best_epoch
                );
            }
            if history.stopped_early {
                assert_eq!(history.best_epoch + patience, history.epochs_run());
            } else {
                assert_eq!(history.epochs_run(), 25);
            }
        }
    }

    #[test]
    fn test_cancelled_training() {
        let trainer = tiny_trainer(5);
        trainer.cancel_flag().store(true, Ordering::Relaxed);

        assert!(matches!(
            trainer.train(&corpus()),
            Err(IntentError::Cancelled(_))
        ));
    }

    #[test]
    fn test_rejects_single_class() {
        let corpus = TrainingCorpus::new(vec![IntentRecord::new(
            "greeting",
            strings(&["Hello", "Hi"]),
            strings(&["Hello!"]),
        )]);
        assert!(matches!(
            tiny_trainer(1).train(&corpus),
            Err(IntentError::TrainingDataInvalid(_))
        ));
    }
}
