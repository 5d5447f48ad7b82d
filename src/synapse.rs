use ndarray::Array2;

use crate::error::Result;

/// Losses and learned peer scores produced by one forward/backward pass.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    /// The combined training loss driving the checkpoint decision.
    pub loss: f32,
    pub remote_loss: f32,
    pub local_loss: f32,
    pub distillation_loss: f32,

    /// Learned peer scores: one row per batch sample, one column per peer,
    /// column order matching the shared weight vector.
    pub weights: Array2<f32>,
}

/// Immutable model bytes handed to the network layer for serving.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub model_state: Vec<u8>,
}

/// Dataset partition to draw batches from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// The model collaborator. Architecture and autograd internals live behind
/// this seam; the driver only sees losses, learned scores, and opaque state.
pub trait Synapse {
    /// The batch representation this synapse consumes.
    type Batch;

    /// Runs one forward and backward pass, leaving gradients applied-ready.
    ///
    /// # Errors
    /// A computation failure here is fatal to the training loop.
    fn forward_backward(&mut self, inputs: &Self::Batch, labels: &Self::Batch)
    -> Result<BatchOutput>;

    /// Applies one optimizer step and one learning-rate-schedule step.
    fn apply_step(&mut self);

    /// Serialized model parameters.
    fn model_state(&self) -> Vec<u8>;

    /// Serialized optimizer state.
    fn optimizer_state(&self) -> Vec<u8>;

    /// Restores model and optimizer from previously serialized state.
    ///
    /// # Errors
    /// Returns an error when the blobs do not fit this synapse.
    fn restore(&mut self, model_state: &[u8], optimizer_state: &[u8]) -> Result<()>;
}

/// The dataset collaborator: a lazy, effectively infinite, restartable
/// sequence of (inputs, labels) pairs.
pub trait BatchSource {
    type Item;

    /// Draws the next batch from the given split. May suspend while data
    /// materializes; never signals exhaustion.
    ///
    /// # Errors
    /// A dataset failure here is fatal to the training loop.
    fn next_batch(
        &mut self,
        split: Split,
        batch_size: usize,
    ) -> impl Future<Output = Result<(Self::Item, Self::Item)>>;
}

/// The network/session collaborator: chain position, peer synchronization,
/// and model serving. Wire protocol internals live behind this seam.
pub trait Network {
    /// Current chain block height as reported by the metagraph.
    fn block(&self) -> u64;

    /// Publishes this neuron's state to peers.
    ///
    /// # Errors
    /// Recoverable; the driver retries at the next due cycle.
    fn emit(&mut self) -> impl Future<Output = Result<()>>;

    /// Pulls the latest peer state from the network.
    ///
    /// # Errors
    /// Recoverable; the driver retries at the next due cycle.
    fn sync(&mut self) -> impl Future<Output = Result<()>>;

    /// Exposes an immutable model snapshot for peers to query.
    fn serve(&mut self, snapshot: ModelSnapshot);
}
