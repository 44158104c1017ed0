//! The bidirectional LSTM intent network and its trained-classifier wrapper.

use std::collections::HashMap;
use std::fmt;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Embedding, Linear, Module, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::NetworkConfig;
use crate::encoding::{EncodedSequence, SENTINEL_ID};
use crate::error::{IntentError, Result};
use crate::ml::classifier::IntentModel;
use crate::ml::layers::{BiLstm, DenseBlock, RUNNING_STAT_NAMES, dropout_mask};

/// Sizes fixed by the training data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDims {
    /// Number of token ids, sentinel included.
    pub vocab_size: usize,
    /// Length of encoded sequences.
    pub sequence_length: usize,
    pub num_classes: usize,
}

/// A named f32 tensor in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Persisted form of a classifier: architecture plus every weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkArtifact {
    pub config: NetworkConfig,
    pub dims: NetworkDims,
    pub tensors: Vec<NamedTensor>,
}

/// Embedding, two stacked bidirectional LSTM layers, two dense blocks, linear head.
///
/// Produces logits; softmax is applied by the caller.
#[derive(Debug)]
pub struct IntentNetwork {
    embedding: Embedding,
    embedding_dropout: f32,
    encoder: BiLstm,
    summarizer: BiLstm,
    dense: Vec<DenseBlock>,
    head: Linear,
}

impl IntentNetwork {
    pub fn new(config: &NetworkConfig, dims: &NetworkDims, vb: VarBuilder) -> Result<Self> {
        let embedding =
            candle_nn::embedding(dims.vocab_size, config.embedding_dim, vb.pp("embedding"))?;
        let encoder = BiLstm::new(
            config.embedding_dim,
            config.lstm_units[0],
            config.lstm_dropout,
            config.recurrent_dropout,
            vb.pp("encoder.0"),
        )?;
        let summarizer = BiLstm::new(
            encoder.output_dim(),
            config.lstm_units[1],
            config.lstm_dropout,
            config.recurrent_dropout,
            vb.pp("encoder.1"),
        )?;

        let mut width = summarizer.output_dim();
        let mut dense = Vec::with_capacity(config.dense_units.len());
        for (i, (&units, &rate)) in config
            .dense_units
            .iter()
            .zip(config.dense_dropout.iter())
            .enumerate()
        {
            dense.push(DenseBlock::new(
                width,
                units,
                rate,
                config.batch_norm_momentum,
                config.batch_norm_epsilon,
                vb.pp(format!("dense.{i}")),
            )?);
            width = units;
        }
        let head = candle_nn::linear(width, dims.num_classes, vb.pp("head"))?;

        Ok(Self {
            embedding,
            embedding_dropout: config.embedding_dropout,
            encoder,
            summarizer,
            dense,
            head,
        })
    }

    /// `ids` is `(batch, steps)` u32, `mask` the matching f32 padding mask.
    pub fn forward(
        &self,
        ids: &Tensor,
        mask: &Tensor,
        mut rng: Option<&mut StdRng>,
    ) -> Result<Tensor> {
        let embedded = self
            .embedding
            .forward(ids)?
            .broadcast_mul(&mask.unsqueeze(2)?)?;

        let embedded = match rng.as_deref_mut() {
            Some(rng) if self.embedding_dropout > 0.0 => {
                let (batch, _, dim) = embedded.dims3()?;
                let channels =
                    dropout_mask((batch, 1, dim), self.embedding_dropout, rng, embedded.device())?;
                embedded.broadcast_mul(&channels)?
            }
            _ => embedded,
        };

        let sequence = self
            .encoder
            .forward_sequence(&embedded, mask, rng.as_deref_mut())?;
        let mut hidden = self
            .summarizer
            .forward_final(&sequence, mask, rng.as_deref_mut())?;
        for block in &self.dense {
            hidden = block.forward(&hidden, rng.as_deref_mut())?;
        }

        Ok(self.head.forward(&hidden)?)
    }
}

/// A trained (or trainable) intent network with its weights.
pub struct NeuralIntentClassifier {
    config: NetworkConfig,
    dims: NetworkDims,
    network: IntentNetwork,
    varmap: VarMap,
    device: Device,
}

impl NeuralIntentClassifier {
    /// Build a freshly initialized network. Initialization is seeded.
    pub fn new(config: NetworkConfig, dims: NetworkDims, seed: u64) -> Result<Self> {
        let classifier = Self::build(config, dims)?;
        classifier.initialize(seed)?;
        Ok(classifier)
    }

    /// Rebuild a classifier from its persisted form.
    pub fn from_artifact(artifact: &NetworkArtifact) -> Result<Self> {
        artifact.config.validate()?;
        let classifier = Self::build(artifact.config.clone(), artifact.dims)?;
        classifier.restore(&artifact.tensors)?;
        Ok(classifier)
    }

    fn build(config: NetworkConfig, dims: NetworkDims) -> Result<Self> {
        if dims.vocab_size < 2 || dims.sequence_length == 0 || dims.num_classes < 2 {
            return Err(IntentError::invalid_config(format!(
                "invalid network dimensions {dims:?}"
            )));
        }

        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let network = IntentNetwork::new(&config, &dims, vb)?;

        Ok(Self {
            config,
            dims,
            network,
            varmap,
            device,
        })
    }

    /// Glorot-uniform weights, small uniform embeddings, zero biases with the
    /// LSTM forget gate biased to 1.
    fn initialize(&self, seed: u64) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(seed);

        for (name, var) in self.named_vars()? {
            let dims = var.dims().to_vec();
            let count: usize = dims.iter().product();

            let values: Vec<f32> = if name.ends_with("embeddings") {
                (0..count).map(|_| rng.random_range(-0.05..0.05)).collect()
            } else if name.ends_with(".weight") && dims.len() == 2 {
                let limit = (6.0 / (dims[0] + dims[1]) as f32).sqrt();
                (0..count).map(|_| rng.random_range(-limit..limit)).collect()
            } else if name.ends_with("ih.bias") {
                let hidden = count / 4;
                (0..count)
                    .map(|i| if (hidden..2 * hidden).contains(&i) { 1.0 } else { 0.0 })
                    .collect()
            } else if name.ends_with(".bias") {
                vec![0.0; count]
            } else {
                continue;
            };

            var.set(&Tensor::from_vec(values, dims, &self.device)?)?;
        }

        Ok(())
    }

    /// Every variable, sorted by name.
    fn named_vars(&self) -> Result<Vec<(String, Var)>> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| IntentError::other("variable map lock poisoned"))?;
        let mut vars: Vec<(String, Var)> = data
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(vars)
    }

    /// Variables updated by the optimizer (batch-norm running statistics excluded).
    pub fn trainable_vars(&self) -> Result<Vec<Var>> {
        Ok(self
            .named_vars()?
            .into_iter()
            .filter(|(name, _)| !RUNNING_STAT_NAMES.iter().any(|stat| name.ends_with(stat)))
            .map(|(_, var)| var)
            .collect())
    }

    /// Copy every weight out of the network.
    pub fn snapshot(&self) -> Result<Vec<NamedTensor>> {
        self.named_vars()?
            .into_iter()
            .map(|(name, var)| {
                let tensor = var.as_tensor();
                Ok(NamedTensor {
                    name,
                    shape: tensor.dims().to_vec(),
                    data: tensor.flatten_all()?.to_vec1::<f32>()?,
                })
            })
            .collect()
    }

    /// Overwrite every weight. The set of names and shapes must match exactly.
    pub fn restore(&self, tensors: &[NamedTensor]) -> Result<()> {
        let vars: HashMap<String, Var> = self.named_vars()?.into_iter().collect();
        if tensors.len() != vars.len() {
            return Err(IntentError::mismatch(format!(
                "classifier has {} tensors, artifact has {}",
                vars.len(),
                tensors.len()
            )));
        }

        for tensor in tensors {
            let var = vars.get(&tensor.name).ok_or_else(|| {
                IntentError::mismatch(format!("unexpected tensor '{}'", tensor.name))
            })?;
            let expected: usize = tensor.shape.iter().product();
            if var.dims() != tensor.shape.as_slice() || tensor.data.len() != expected {
                return Err(IntentError::mismatch(format!(
                    "tensor '{}' has shape {:?}, expected {:?}",
                    tensor.name,
                    tensor.shape,
                    var.dims()
                )));
            }
            var.set(&Tensor::from_vec(
                tensor.data.clone(),
                tensor.shape.clone(),
                &self.device,
            )?)?;
        }

        Ok(())
    }

    pub fn to_artifact(&self) -> Result<NetworkArtifact> {
        Ok(NetworkArtifact {
            config: self.config.clone(),
            dims: self.dims,
            tensors: self.snapshot()?,
        })
    }

    /// Batch input tensors: ids and padding mask, trimmed to the longest content.
    ///
    /// Trailing steps that are padding in every row cannot change the result
    /// under masking, so they are not computed.
    pub fn batch_inputs(&self, sequences: &[&EncodedSequence]) -> Result<(Tensor, Tensor)> {
        if sequences.is_empty() {
            return Err(IntentError::other("empty batch"));
        }
        let steps = sequences
            .iter()
            .map(|sequence| sequence.content_len())
            .max()
            .unwrap_or(0)
            .max(1);

        let mut ids = Vec::with_capacity(sequences.len() * steps);
        let mut mask = Vec::with_capacity(sequences.len() * steps);
        for sequence in sequences {
            for step in 0..steps {
                let id = sequence.ids().get(step).copied().unwrap_or(SENTINEL_ID);
                if id as usize >= self.dims.vocab_size {
                    return Err(IntentError::mismatch(format!(
                        "token id {id} outside vocabulary of size {}",
                        self.dims.vocab_size
                    )));
                }
                ids.push(id);
                mask.push(if id == SENTINEL_ID { 0.0f32 } else { 1.0 });
            }
        }

        let shape = (sequences.len(), steps);
        Ok((
            Tensor::from_vec(ids, shape, &self.device)?,
            Tensor::from_vec(mask, shape, &self.device)?,
        ))
    }

    /// Logits for a batch. `Some(rng)` runs in training mode.
    pub fn logits(&self, sequences: &[&EncodedSequence], rng: Option<&mut StdRng>) -> Result<Tensor> {
        let (ids, mask) = self.batch_inputs(sequences)?;
        self.network.forward(&ids, &mask, rng)
    }

    /// Class probabilities for a batch in inference mode.
    pub fn predict_batch(&self, sequences: &[&EncodedSequence]) -> Result<Vec<Vec<f32>>> {
        let logits = self.logits(sequences, None)?;
        let probabilities = candle_nn::ops::softmax(&logits, 1)?;
        Ok(probabilities.to_vec2::<f32>()?)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn dims(&self) -> &NetworkDims {
        &self.dims
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl IntentModel for NeuralIntentClassifier {
    fn predict(&self, sequence: &EncodedSequence) -> Result<Vec<f32>> {
        self.predict_batch(&[sequence])?
            .into_iter()
            .next()
            .ok_or_else(|| IntentError::other("classifier returned no prediction"))
    }

    fn num_classes(&self) -> usize {
        self.dims.num_classes
    }

    fn name(&self) -> &str {
        "bilstm"
    }
}

impl fmt::Debug for NeuralIntentClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeuralIntentClassifier")
            .field("config", &self.config)
            .field("dims", &self.dims)
            .finish()
    }
}
