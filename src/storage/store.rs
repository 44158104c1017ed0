//! On-disk model store: artifact paths, locking, atomic save and load.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{debug, warn};
use serde::Serialize;

use crate::config::ModelLocation;
use crate::corpus::TrainingCorpus;
use crate::encoding::{LabelIndex, VocabularyIndex};
use crate::error::{IntentError, Result};
use crate::ml::{IntentModel, NetworkArtifact, NeuralIntentClassifier};
use crate::storage::envelope::{self, ArtifactKind};

/// The four artifacts of a trained model, in memory.
#[derive(Debug)]
pub struct ModelBundle {
    pub classifier: NeuralIntentClassifier,
    pub vocabulary: VocabularyIndex,
    pub labels: LabelIndex,
    pub corpus: TrainingCorpus,
}

impl ModelBundle {
    /// Check that the artifacts come from the same training run.
    pub fn check_consistency(&self) -> Result<()> {
        let dims = self.classifier.dims();
        if self.classifier.num_classes() != self.labels.len() {
            return Err(IntentError::mismatch(format!(
                "classifier has {} classes but the label index has {}",
                self.classifier.num_classes(),
                self.labels.len()
            )));
        }
        if dims.vocab_size != self.vocabulary.size() {
            return Err(IntentError::mismatch(format!(
                "classifier expects {} token ids but the vocabulary has {}",
                dims.vocab_size,
                self.vocabulary.size()
            )));
        }
        if dims.sequence_length != self.vocabulary.sequence_length() {
            return Err(IntentError::mismatch(format!(
                "classifier expects sequences of {} but the vocabulary encodes {}",
                dims.sequence_length,
                self.vocabulary.sequence_length()
            )));
        }
        Ok(())
    }
}

/// File locations of a model's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub directory: PathBuf,
    pub classifier: PathBuf,
    pub vocabulary: PathBuf,
    pub labels: PathBuf,
    pub corpus: PathBuf,
    pub lock: PathBuf,
}

impl ModelPaths {
    pub fn new(location: &ModelLocation) -> Self {
        let directory = location.directory.clone();
        let name = &location.name;
        Self {
            classifier: directory.join(format!("{name}.bin")),
            vocabulary: directory.join(format!("{name}_tokenizer.bin")),
            labels: directory.join(format!("{name}_label_encoder.bin")),
            corpus: directory.join(format!("{name}_training_data.json")),
            lock: directory.join(format!("{name}.lock")),
            directory,
        }
    }

    /// The four artifact paths in a fixed order.
    pub fn artifacts(&self) -> [&Path; 4] {
        [
            self.classifier.as_path(),
            self.vocabulary.as_path(),
            self.labels.as_path(),
            self.corpus.as_path(),
        ]
    }
}

/// Which artifacts exist on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArtifactPresence {
    pub classifier: bool,
    pub vocabulary: bool,
    pub labels: bool,
    pub corpus: bool,
}

impl ArtifactPresence {
    pub fn all(&self) -> bool {
        self.classifier && self.vocabulary && self.labels && self.corpus
    }
}

/// Exclusive advisory lock over a model's artifact set.
///
/// The lock lives on the open lock file, so the operating system releases it
/// when the holder exits, however it exits. A lock file left behind by a dead
/// process is simply locked again.
#[derive(Debug)]
pub struct ArtifactLock {
    path: PathBuf,
    file: File,
}

impl ArtifactLock {
    fn acquire(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            return Err(if e.kind() == fs2::lock_contended_error().kind() {
                IntentError::ArtifactLocked {
                    path: path.to_path_buf(),
                }
            } else {
                IntentError::Io(e)
            });
        }

        // Holder's PID, for whoever finds the lock taken.
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        debug!("Acquired lock {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release lock {}: {e}", self.path.display());
        }
    }
}

/// Reads and writes the artifacts of one model.
#[derive(Debug, Clone)]
pub struct ModelStore {
    location: ModelLocation,
    paths: ModelPaths,
}

impl ModelStore {
    pub fn new(location: ModelLocation) -> Self {
        let paths = ModelPaths::new(&location);
        Self { location, paths }
    }

    pub fn location(&self) -> &ModelLocation {
        &self.location
    }

    pub fn paths(&self) -> &ModelPaths {
        &self.paths
    }

    pub fn presence(&self) -> ArtifactPresence {
        ArtifactPresence {
            classifier: self.paths.classifier.is_file(),
            vocabulary: self.paths.vocabulary.is_file(),
            labels: self.paths.labels.is_file(),
            corpus: self.paths.corpus.is_file(),
        }
    }

    /// Take the artifact lock, creating the model directory if needed.
    pub fn lock(&self) -> Result<ArtifactLock> {
        fs::create_dir_all(&self.paths.directory)?;
        ArtifactLock::acquire(&self.paths.lock)
    }

    /// Write all four artifacts.
    ///
    /// Each file is written next to its destination first; only when every
    /// write succeeded are they renamed into place.
    pub fn save(&self, model: &ModelBundle, _lock: &ArtifactLock) -> Result<()> {
        model.check_consistency()?;

        let classifier = model.classifier.to_artifact()?;
        let staged = [
            (
                &self.paths.classifier,
                envelope::encode(ArtifactKind::Classifier, &classifier)?,
            ),
            (
                &self.paths.vocabulary,
                envelope::encode(ArtifactKind::Vocabulary, &model.vocabulary)?,
            ),
            (
                &self.paths.labels,
                envelope::encode(ArtifactKind::Labels, &model.labels)?,
            ),
            (
                &self.paths.corpus,
                model.corpus.to_json_string()?.into_bytes(),
            ),
        ];

        let mut temps = Vec::with_capacity(staged.len());
        for (path, bytes) in &staged {
            let temp = sibling(path, "tmp");
            temps.push(temp.clone());
            if let Err(e) = fs::write(&temp, bytes) {
                remove_files(&temps);
                return Err(e.into());
            }
        }

        let targets: Vec<&Path> = staged.iter().map(|(path, _)| path.as_path()).collect();
        if let Err(e) = swap_into_place(&targets, &temps) {
            remove_files(&temps);
            return Err(e);
        }
        debug!("Wrote artifacts to {}", self.paths.directory.display());
        Ok(())
    }

    /// Load all four artifacts; any missing file is an error.
    pub fn load(&self) -> Result<ModelBundle> {
        for path in self.paths.artifacts() {
            if !path.is_file() {
                return Err(IntentError::artifact_missing(path));
            }
        }

        let artifact: NetworkArtifact =
            envelope::read_artifact(&self.paths.classifier, ArtifactKind::Classifier)?;
        let classifier = NeuralIntentClassifier::from_artifact(&artifact)
            .map_err(|e| IntentError::corrupt_artifact(&self.paths.classifier, e.to_string()))?;
        let vocabulary: VocabularyIndex =
            envelope::read_artifact(&self.paths.vocabulary, ArtifactKind::Vocabulary)?;
        let labels: LabelIndex = envelope::read_artifact(&self.paths.labels, ArtifactKind::Labels)?;
        let corpus = TrainingCorpus::from_json_file(&self.paths.corpus)
            .map_err(|e| IntentError::corrupt_artifact(&self.paths.corpus, e.to_string()))?;

        let model = ModelBundle {
            classifier,
            vocabulary,
            labels,
            corpus,
        };
        model.check_consistency()?;
        Ok(model)
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Replace every target with its staged file, or leave the previous set in place.
///
/// Existing targets are moved aside first; any failure puts them back.
fn swap_into_place(targets: &[&Path], staged: &[PathBuf]) -> Result<()> {
    let mut backups: Vec<(&Path, PathBuf)> = Vec::new();
    for &target in targets {
        if !target.exists() {
            continue;
        }
        let backup = sibling(target, "bak");
        if let Err(e) = fs::rename(target, &backup) {
            restore_backups(&backups);
            return Err(e.into());
        }
        backups.push((target, backup));
    }

    let mut installed: Vec<PathBuf> = Vec::new();
    for (&target, temp) in targets.iter().zip(staged) {
        if let Err(e) = fs::rename(temp, target) {
            remove_files(&installed);
            restore_backups(&backups);
            return Err(e.into());
        }
        installed.push(target.to_path_buf());
    }

    let backup_files: Vec<PathBuf> = backups.into_iter().map(|(_, backup)| backup).collect();
    remove_files(&backup_files);
    Ok(())
}

fn restore_backups(backups: &[(&Path, PathBuf)]) {
    for (target, backup) in backups {
        if let Err(e) = fs::rename(backup, target) {
            warn!(
                "Failed to restore {} from {}: {e}",
                target.display(),
                backup.display()
            );
        }
    }
}

/// Best-effort removal; files that are already gone are fine.
fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {e}", path.display()),
        }
    }
}
