use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{NeuronErr, Result};

const CHECKPOINT_FILE: &str = "checkpoint.json";

/// One atomic unit of persisted training progress.
///
/// Model and optimizer state are opaque serialized blobs; their byte layout
/// belongs to the synapse collaborator and only needs to round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub epoch: u64,
    pub loss: f32,
    pub model_state: Vec<u8>,
    pub optimizer_state: Vec<u8>,
}

/// Builder for a `CheckpointRecord` that makes "missing field" a checked
/// result instead of a runtime surprise. All four fields are mandatory.
#[derive(Debug, Default)]
pub struct CheckpointDraft {
    epoch: Option<u64>,
    loss: Option<f32>,
    model_state: Option<Vec<u8>>,
    optimizer_state: Option<Vec<u8>>,
}

impl CheckpointDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(mut self, epoch: u64) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn loss(mut self, loss: f32) -> Self {
        self.loss = Some(loss);
        self
    }

    pub fn model_state(mut self, blob: Vec<u8>) -> Self {
        self.model_state = Some(blob);
        self
    }

    pub fn optimizer_state(mut self, blob: Vec<u8>) -> Self {
        self.optimizer_state = Some(blob);
        self
    }

    /// Validates the draft into a complete record.
    ///
    /// # Errors
    /// Returns `IncompleteCheckpoint` naming the first absent field.
    pub fn finish(self) -> Result<CheckpointRecord> {
        let missing = |missing| NeuronErr::IncompleteCheckpoint { missing };
        Ok(CheckpointRecord {
            epoch: self.epoch.ok_or(missing("epoch"))?,
            loss: self.loss.ok_or(missing("loss"))?,
            model_state: self.model_state.ok_or(missing("model_state"))?,
            optimizer_state: self.optimizer_state.ok_or(missing("optimizer_state"))?,
        })
    }
}

/// Durable storage for the run's single checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Creates a store rooted at `datapath`.
    pub fn new(datapath: &Path) -> Self {
        Self {
            path: datapath.join(CHECKPOINT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists `record` all-or-nothing: the bytes land in a temporary
    /// sibling first and are renamed into place, so a concurrent `load` sees
    /// either the previous checkpoint or this one, never a partial file.
    ///
    /// # Errors
    /// Returns an io error when the write or rename fails.
    pub fn save(&self, record: &CheckpointRecord) -> Result<()> {
        let bytes =
            serde_json::to_vec(record).map_err(|e| NeuronErr::Io(io::Error::other(e)))?;

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Reads the checkpoint back.
    ///
    /// # Errors
    /// Returns `CheckpointNotFound` when no file exists and
    /// `CorruptCheckpoint` when the file does not parse into a full record.
    pub fn load(&self) -> Result<CheckpointRecord> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(NeuronErr::CheckpointNotFound {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| NeuronErr::CorruptCheckpoint {
            path: self.path.clone(),
            detail: e.to_string(),
        })
    }
}
