//! The classifier seam used by the inference engine.

use std::fmt::Debug;

use crate::encoding::EncodedSequence;
use crate::error::Result;

/// A trained model mapping an encoded utterance to class probabilities.
pub trait IntentModel: Send + Sync + Debug {
    /// Probability of every class, `num_classes()` values summing to 1.
    fn predict(&self, sequence: &EncodedSequence) -> Result<Vec<f32>>;

    /// Number of classes the model distinguishes.
    fn num_classes(&self) -> usize;

    /// Get the name of this model.
    fn name(&self) -> &str;
}

/// Index and value of the largest probability. Ties resolve to the lowest index.
pub fn argmax(probabilities: &[f32]) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((i, p)),
        })
}
