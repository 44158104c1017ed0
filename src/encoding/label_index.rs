//! Label index: intent names to class ids.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{IntentError, Result};

/// Bijection between intent names and class ids in `[0, len)`.
///
/// Ids follow first-occurrence order of the labels passed to [`LabelIndex::fit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelIndex {
    labels: Vec<String>,
    ids: HashMap<String, u32>,
}

impl LabelIndex {
    /// Fit a label index over a sequence of labels (duplicates allowed).
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = LabelIndex {
            labels: Vec::new(),
            ids: HashMap::new(),
        };
        for label in labels {
            let label = label.as_ref();
            if !index.ids.contains_key(label) {
                index.ids.insert(label.to_string(), index.labels.len() as u32);
                index.labels.push(label.to_string());
            }
        }
        index
    }

    /// Class id of a fitted label.
    pub fn encode(&self, label: &str) -> Result<u32> {
        self.ids
            .get(label)
            .copied()
            .ok_or_else(|| IntentError::UnknownLabel(label.to_string()))
    }

    /// Label of a class id.
    ///
    /// An id outside `[0, len)` means the classifier and the label index were
    /// not produced by the same training run.
    pub fn decode(&self, id: usize) -> Result<&str> {
        self.labels
            .get(id)
            .map(String::as_str)
            .ok_or(IntentError::UnknownClass {
                id,
                num_classes: self.labels.len(),
            })
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no label was fitted.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in class id order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}
