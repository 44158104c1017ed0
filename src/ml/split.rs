//! Stratified train/validation split.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{IntentError, Result};

/// Example indices on each side of a split, in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Split example indices so every class keeps its share on both sides.
///
/// A class with `n` examples contributes `clamp(round(n * fraction), 1, n - 1)`
/// examples to validation. With `fraction == 0` everything is training data.
pub fn stratified_split(labels: &[u32], fraction: f64, seed: u64) -> Result<Split> {
    if !(0.0..1.0).contains(&fraction) {
        return Err(IntentError::invalid_config(format!(
            "validation fraction must be in [0, 1), got {fraction}"
        )));
    }
    if fraction == 0.0 {
        return Ok(Split {
            train: (0..labels.len()).collect(),
            validation: Vec::new(),
        });
    }

    let mut by_class: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(index);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut validation = Vec::new();

    for (class, mut indices) in by_class {
        let n = indices.len();
        if n < 2 {
            return Err(IntentError::training_data(format!(
                "class {class} has {n} example(s); at least 2 are required for a validation split"
            )));
        }
        let held_out = ((n as f64 * fraction).round() as usize).clamp(1, n - 1);

        indices.shuffle(&mut rng);
        validation.extend_from_slice(&indices[..held_out]);
        train.extend_from_slice(&indices[held_out..]);
    }

    train.sort_unstable();
    validation.sort_unstable();
    Ok(Split { train, validation })
}
