use std::{fs, path::PathBuf};

use serde::Deserialize;

use crate::error::{NeuronErr, Result};

/// Runtime options for a neuron instance.
///
/// All fields carry defaults, so a config can be deserialized from an empty
/// document and selectively overridden.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NeuronConfig {
    /// Training initial learning rate, forwarded to the synapse's optimizer.
    pub learning_rate: f32,
    /// Training initial momentum, forwarded to the synapse's optimizer.
    pub momentum: f32,
    /// Training batch size.
    pub batch_size_train: usize,
    /// Testing batch size.
    pub batch_size_test: usize,
    /// Steps per epoch.
    pub epoch_size: u64,
    /// Directory for checkpoints and other run data. Created if absent.
    pub datapath: PathBuf,
    /// Block distance after which an emit+sync with the network is due.
    pub sync_threshold: u64,
    /// EMA decay used when blending learned weights into the shared state.
    pub blend_decay: f32,
}

impl Default for NeuronConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            momentum: 0.98,
            batch_size_train: 20,
            batch_size_test: 20,
            epoch_size: 50,
            datapath: PathBuf::from("data"),
            sync_threshold: 15,
            blend_decay: 0.05,
        }
    }
}

impl NeuronConfig {
    /// Parses a config from a JSON document.
    ///
    /// # Errors
    /// Returns `InvalidConfig` when the document does not deserialize.
    pub fn from_json(doc: &str) -> Result<Self> {
        serde_json::from_str(doc).map_err(|e| NeuronErr::InvalidConfig(e.to_string()))
    }

    /// Checks every bound and creates the data directory if it is absent.
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the first violated bound, or an io error
    /// when the data directory cannot be created.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(NeuronErr::InvalidConfig(
                "learning_rate must be a positive value".into(),
            ));
        }
        if !(self.momentum > 0.0 && self.momentum < 1.0) {
            return Err(NeuronErr::InvalidConfig(
                "momentum must be a value between 0 and 1".into(),
            ));
        }
        if self.batch_size_train == 0 {
            return Err(NeuronErr::InvalidConfig(
                "batch_size_train must be a positive value".into(),
            ));
        }
        if self.batch_size_test == 0 {
            return Err(NeuronErr::InvalidConfig(
                "batch_size_test must be a positive value".into(),
            ));
        }
        if self.epoch_size == 0 {
            return Err(NeuronErr::InvalidConfig(
                "epoch_size must be a positive value".into(),
            ));
        }
        if !(self.blend_decay > 0.0 && self.blend_decay < 1.0) {
            return Err(NeuronErr::InvalidConfig(
                "blend_decay must be a value between 0 and 1".into(),
            ));
        }
        fs::create_dir_all(&self.datapath)?;
        Ok(())
    }
}
