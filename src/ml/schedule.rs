//! Epoch-level training callbacks: early stopping and learning-rate reduction.

/// Outcome of recording one epoch with [`EarlyStopping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// New best epoch; its weights should be checkpointed.
    Improved,
    /// No improvement, patience left.
    Waiting,
    /// No improvement for `patience` epochs; training should stop.
    Exhausted,
}

/// Tracks the best monitored epoch and stops training when it has not
/// improved for `patience` consecutive epochs.
///
/// An epoch improves on the best one with strictly higher accuracy, or with
/// equal accuracy and strictly lower loss. The same rule picks the checkpoint
/// restored at the end, so the best epoch is always the last improvement.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: Option<(f64, f64)>,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: None,
            wait: 0,
        }
    }

    /// Record an epoch's monitored accuracy and loss.
    pub fn update(&mut self, accuracy: f64, loss: f64) -> Progress {
        let improved = self.best.is_none_or(|(best_accuracy, best_loss)| {
            accuracy > best_accuracy || (accuracy == best_accuracy && loss < best_loss)
        });
        if improved {
            self.best = Some((accuracy, loss));
            self.wait = 0;
            return Progress::Improved;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            Progress::Exhausted
        } else {
            Progress::Waiting
        }
    }

    /// Accuracy and loss of the best epoch so far.
    pub fn best(&self) -> Option<(f64, f64)> {
        self.best
    }
}

/// Multiplies the learning rate by `factor` when a monitored loss has not
/// improved for `patience` epochs, never going below `min_lr`.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    factor: f64,
    patience: usize,
    min_lr: f64,
    best: Option<f64>,
    wait: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            factor,
            patience,
            min_lr,
            best: None,
            wait: 0,
        }
    }

    /// Record an epoch's loss. Returns the new learning rate when it changes.
    pub fn update(&mut self, loss: f64, current_lr: f64) -> Option<f64> {
        if self.best.is_none_or(|best| loss < best) {
            self.best = Some(loss);
            self.wait = 0;
            return None;
        }

        self.wait += 1;
        if self.wait < self.patience {
            return None;
        }

        self.wait = 0;
        let reduced = (current_lr * self.factor).max(self.min_lr);
        (reduced < current_lr).then_some(reduced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_early_stopping_requires_strict_improvement() {
        let mut stopping = EarlyStopping::new(2);

        assert_eq!(stopping.update(0.5, 1.0), Progress::Improved);
        assert_eq!(stopping.update(0.5, 1.0), Progress::Waiting);
        assert_eq!(stopping.update(0.4, 0.2), Progress::Exhausted);
        assert_eq!(stopping.best(), Some((0.5, 1.0)));
    }

    #[test]
    fn test_early_stopping_breaks_accuracy_ties_by_loss() {
        let mut stopping = EarlyStopping::new(2);

        assert_eq!(stopping.update(0.75, 0.9), Progress::Improved);
        assert_eq!(stopping.update(0.75, 0.8), Progress::Improved);
        assert_eq!(stopping.update(0.75, 0.85), Progress::Waiting);
        assert_eq!(stopping.update(1.0, 2.0), Progress::Improved);
        assert_eq!(stopping.update(1.0, 2.0), Progress::Waiting);
        assert_eq!(stopping.update(0.5, 0.1), Progress::Exhausted);
        assert_eq!(stopping.best(), Some((1.0, 2.0)));
    }

    #[test]
    fn test_plateau_halves_and_resets() {
        let mut plateau = ReduceLrOnPlateau::new(0.5, 2, 1e-6);

        assert_eq!(plateau.update(1.0, 1e-3), None);
        assert_eq!(plateau.update(1.1, 1e-3), None);
        assert_eq!(plateau.update(1.2, 1e-3), Some(5e-4));
        // Counter restarts after a reduction.
        assert_eq!(plateau.update(1.3, 5e-4), None);
        assert_eq!(plateau.update(1.3, 5e-4), Some(2.5e-4));
        assert_eq!(plateau.update(0.9, 2.5e-4), None);
    }

    #[test]
    fn test_plateau_respects_floor() {
        let mut plateau = ReduceLrOnPlateau::new(0.5, 1, 1e-6);

        plateau.update(1.0, 1.5e-6);
        assert_eq!(plateau.update(1.0, 1.5e-6), Some(1e-6));
        assert_eq!(plateau.update(1.0, 1e-6), None);
    }
}
