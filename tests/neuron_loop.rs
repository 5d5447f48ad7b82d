//! End-to-end driver scenarios with scripted collaborators.

use std::{cell::Cell, collections::VecDeque};

use ndarray::Array2;
use tokio_util::sync::CancellationToken;

use mlm_neuron::{
    BatchOutput, BatchSource, ModelSnapshot, Network, Neuron, NeuronConfig, NeuronErr, Result,
    Split, Synapse, WeightVector,
};

const PEERS: usize = 4;

/// Synapse double that replays a scripted loss sequence and fails fatally
/// once the script runs out.
struct ScriptedSynapse {
    losses: VecDeque<f32>,
}

impl ScriptedSynapse {
    fn new(losses: impl IntoIterator<Item = f32>) -> Self {
        Self {
            losses: losses.into_iter().collect(),
        }
    }
}

impl Synapse for ScriptedSynapse {
    type Batch = Vec<f32>;

    fn forward_backward(
        &mut self,
        _inputs: &Self::Batch,
        _labels: &Self::Batch,
    ) -> Result<BatchOutput> {
        let loss = self
            .losses
            .pop_front()
            .ok_or_else(|| NeuronErr::Compute("loss script exhausted".into()))?;
        Ok(BatchOutput {
            loss,
            remote_loss: loss,
            local_loss: loss * 0.5,
            distillation_loss: loss * 0.25,
            weights: Array2::from_shape_fn((3, PEERS), |(_, peer)| peer as f32),
        })
    }

    fn apply_step(&mut self) {}

    fn model_state(&self) -> Vec<u8> {
        vec![0xAB, 0xCD]
    }

    fn optimizer_state(&self) -> Vec<u8> {
        vec![0xEF]
    }

    fn restore(&mut self, _model_state: &[u8], _optimizer_state: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Infinite constant batch source.
struct LoopSource;

impl BatchSource for LoopSource {
    type Item = Vec<f32>;

    async fn next_batch(&mut self, _split: Split, batch_size: usize) -> Result<(Vec<f32>, Vec<f32>)> {
        Ok((vec![0.0; batch_size], vec![0.0; batch_size]))
    }
}

/// Network double whose block height advances once per query, with call
/// recording for assertions.
struct FakeChain {
    block: Cell<u64>,
    emits: usize,
    syncs: usize,
    served: Vec<ModelSnapshot>,
}

impl FakeChain {
    fn new() -> Self {
        Self {
            block: Cell::new(0),
            emits: 0,
            syncs: 0,
            served: Vec::new(),
        }
    }
}

impl Network for FakeChain {
    fn block(&self) -> u64 {
        let next = self.block.get() + 1;
        self.block.set(next);
        next
    }

    async fn emit(&mut self) -> Result<()> {
        self.emits += 1;
        Ok(())
    }

    async fn sync(&mut self) -> Result<()> {
        self.syncs += 1;
        Ok(())
    }

    fn serve(&mut self, snapshot: ModelSnapshot) {
        self.served.push(snapshot);
    }
}

fn config(datapath: &std::path::Path) -> NeuronConfig {
    NeuronConfig {
        datapath: datapath.to_path_buf(),
        ..NeuronConfig::default()
    }
}

fn neuron(
    datapath: &std::path::Path,
    losses: impl IntoIterator<Item = f32>,
) -> Neuron<ScriptedSynapse, LoopSource, FakeChain> {
    Neuron::new(
        config(datapath),
        ScriptedSynapse::new(losses),
        LoopSource,
        FakeChain::new(),
        WeightVector::uniform((0..PEERS as u64).collect()),
    )
    .unwrap()
}

/// Fifty monotonically decreasing losses ending at 0.1.
fn improving_epoch() -> Vec<f32> {
    (0..50).map(|i| 5.0 - i as f32 * 0.1).collect()
}

#[tokio::test]
async fn improving_epoch_checkpoints_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut neuron = neuron(dir.path(), improving_epoch());
    let cancel = CancellationToken::new();

    neuron.train_epoch(&cancel).await.unwrap();

    let record = neuron.store().load().unwrap();
    assert_eq!(record.epoch, 0);
    assert!((record.loss - 0.1).abs() < 1e-5);
    assert_eq!(record.model_state, vec![0xAB, 0xCD]);
    assert_eq!(record.optimizer_state, vec![0xEF]);

    // Exactly one re-serve accompanies the checkpoint.
    assert_eq!(neuron.network().served.len(), 1);
    assert_eq!(neuron.metrics().checkpoints, 1);
    assert_eq!(neuron.metrics().steps, 50);
    assert_eq!(neuron.state().epoch, 1);
    assert_eq!(neuron.state().step, 0);
}

#[tokio::test]
async fn worse_epoch_keeps_prior_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let losses = improving_epoch()
        .into_iter()
        .chain(std::iter::repeat_n(0.5, 50));
    let mut neuron = neuron(dir.path(), losses);
    let cancel = CancellationToken::new();

    neuron.train_epoch(&cancel).await.unwrap();
    neuron.train_epoch(&cancel).await.unwrap();

    // Epoch 1 ended at 0.5, worse than the checkpointed 0.1: no new save.
    let record = neuron.store().load().unwrap();
    assert_eq!(record.epoch, 0);
    assert!((record.loss - 0.1).abs() < 1e-5);
    assert_eq!(neuron.network().served.len(), 1);
    assert_eq!(neuron.metrics().checkpoints, 1);
    assert_eq!(neuron.metrics().epochs, 2);
}

#[tokio::test]
async fn sync_triggers_past_block_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let mut neuron = neuron(dir.path(), improving_epoch());
    let cancel = CancellationToken::new();

    neuron.train_epoch(&cancel).await.unwrap();

    // Block height advances one per step; 50 steps cross the default
    // threshold of 15 at least twice, and emit always precedes sync.
    let metrics = neuron.metrics();
    assert!(metrics.syncs >= 2, "syncs = {}", metrics.syncs);
    assert_eq!(neuron.network().emits, metrics.syncs as usize);
    assert_eq!(neuron.network().syncs, metrics.syncs as usize);
}

#[tokio::test]
async fn blended_weights_are_published_as_distribution() {
    let dir = tempfile::tempdir().unwrap();
    let mut neuron = neuron(dir.path(), improving_epoch());
    let mut weights = neuron.subscribe_weights();
    let cancel = CancellationToken::new();

    neuron.train_epoch(&cancel).await.unwrap();

    assert!(weights.has_changed().unwrap());
    let current = weights.borrow_and_update().clone();
    let sum: f32 = current.probs().iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    // The scripted scores always favor the highest peer uid.
    assert!(current.probs()[PEERS - 1] > current.probs()[0]);
}

#[tokio::test]
async fn fatal_model_error_leaves_state_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut neuron = neuron(dir.path(), std::iter::empty());
    let cancel = CancellationToken::new();

    let err = neuron.train_epoch(&cancel).await.unwrap_err();
    assert!(matches!(err, NeuronErr::Compute(_)));
    assert_eq!(neuron.state().step, 0);
    assert_eq!(neuron.metrics().steps, 0);
    assert!(matches!(
        neuron.store().load(),
        Err(NeuronErr::CheckpointNotFound { .. })
    ));
}

#[tokio::test]
async fn cancellation_stops_at_step_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let mut neuron = neuron(dir.path(), improving_epoch());
    let cancel = CancellationToken::new();
    cancel.cancel();

    neuron.run(cancel).await.unwrap();
    assert_eq!(neuron.metrics().steps, 0);
    assert_eq!(neuron.state().epoch, 0);
}

#[tokio::test]
async fn restore_adopts_checkpointed_progress() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut first = neuron(dir.path(), improving_epoch());
        first.train_epoch(&CancellationToken::new()).await.unwrap();
    }

    let mut resumed = neuron(dir.path(), std::iter::empty());
    assert!(resumed.restore_from_checkpoint());
    assert_eq!(resumed.state().epoch, 1);
    assert!((resumed.state().best_loss - 0.1).abs() < 1e-5);

    // The restored model is served immediately, before any training.
    assert_eq!(resumed.network().served.len(), 1);
    assert_eq!(resumed.network().served[0].model_state, vec![0xAB, 0xCD]);
}

#[tokio::test]
async fn missing_checkpoint_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let mut neuron = neuron(dir.path(), std::iter::empty());

    assert!(!neuron.restore_from_checkpoint());
    assert_eq!(neuron.state().epoch, 0);
    assert!(neuron.state().best_loss.is_infinite());
    assert!(neuron.network().served.is_empty());
}

#[tokio::test]
async fn corrupt_checkpoint_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let mut neuron = neuron(dir.path(), std::iter::empty());
    std::fs::write(neuron.store().path(), b"garbage").unwrap();

    assert!(!neuron.restore_from_checkpoint());
    assert_eq!(neuron.state().epoch, 0);
}
