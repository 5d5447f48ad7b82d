use log::{error, info, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    checkpoint::{CheckpointDraft, CheckpointStore},
    config::NeuronConfig,
    consensus::{WeightConsensus, WeightVector, WeightsHandle},
    error::{NeuronErr, Result},
    metrics::NeuronMetrics,
    schedule::{SyncCursor, SyncSchedule},
    state::TrainingState,
    synapse::{BatchSource, ModelSnapshot, Network, Split, Synapse},
};

/// Orchestrates the training loop: sync scheduling, batch-by-batch training,
/// weight-consensus updates, and end-of-epoch checkpointing.
///
/// Single logical thread of control. Each step either completes fully or
/// leaves `TrainingState` and the published weights untouched; fatal
/// dataset/model errors propagate before any mutation.
pub struct Neuron<S, D, N>
where
    S: Synapse,
    D: BatchSource<Item = S::Batch>,
    N: Network,
{
    config: NeuronConfig,
    synapse: S,
    dataset: D,
    network: N,

    store: CheckpointStore,
    schedule: SyncSchedule,
    cursor: SyncCursor,
    consensus: WeightConsensus,
    weights: WeightsHandle,

    state: TrainingState,
    metrics: NeuronMetrics,
}

impl<S, D, N> Neuron<S, D, N>
where
    S: Synapse,
    D: BatchSource<Item = S::Batch>,
    N: Network,
{
    /// Wires a neuron together from its collaborators.
    ///
    /// # Args
    /// * `config` - Runtime options; validated here, including data-dir creation.
    /// * `synapse` - The model collaborator.
    /// * `dataset` - The batch source.
    /// * `network` - The network/session collaborator.
    /// * `weights` - Initial shared weight state, one entry per known peer.
    ///
    /// # Errors
    /// Returns `InvalidConfig` when any configured bound is violated.
    pub fn new(
        config: NeuronConfig,
        synapse: S,
        dataset: D,
        network: N,
        weights: WeightVector,
    ) -> Result<Self> {
        config.validate()?;
        let consensus = WeightConsensus::new(config.blend_decay)?;
        let store = CheckpointStore::new(&config.datapath);
        let schedule = SyncSchedule::new(config.sync_threshold);
        let cursor = SyncCursor::new(network.block());

        Ok(Self {
            config,
            synapse,
            dataset,
            network,
            store,
            schedule,
            cursor,
            consensus,
            weights: WeightsHandle::new(weights),
            state: TrainingState::new(),
            metrics: NeuronMetrics::default(),
        })
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn metrics(&self) -> &NeuronMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    /// A receiver over the shared weight vector for the network layer.
    pub fn subscribe_weights(&self) -> watch::Receiver<WeightVector> {
        self.weights.subscribe()
    }

    /// Tries to resume from the stored checkpoint. A missing checkpoint is
    /// normal; a corrupt or rejected one is logged and training starts from a
    /// freshly initialized model. Never aborts.
    ///
    /// On success the restored model is served to the network right away, so
    /// peers can query it before the first epoch completes.
    ///
    /// # Returns
    /// Whether a checkpoint was restored.
    pub fn restore_from_checkpoint(&mut self) -> bool {
        match self.store.load() {
            Ok(record) => {
                if let Err(e) = self
                    .synapse
                    .restore(&record.model_state, &record.optimizer_state)
                {
                    error!("synapse rejected stored checkpoint, starting fresh: {e}");
                    return false;
                }
                info!(epoch = record.epoch, loss = record.loss; "resumed from checkpoint");
                self.state.epoch = record.epoch + 1;
                self.state.best_loss = record.loss;
                self.network.serve(ModelSnapshot {
                    model_state: self.synapse.model_state(),
                });
                true
            }
            Err(NeuronErr::CheckpointNotFound { .. }) => {
                info!("no checkpoint found, starting fresh");
                false
            }
            Err(e) => {
                error!("could not read checkpoint, starting fresh: {e}");
                false
            }
        }
    }

    /// Runs epochs until the token is cancelled. Cancellation is honored at
    /// step boundaries only, so state is never left mid-step.
    ///
    /// # Errors
    /// Propagates fatal dataset/model failures; everything else is handled
    /// in-loop.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        while !cancel.is_cancelled() {
            self.train_epoch(&cancel).await?;
        }
        info!(epoch = self.state.epoch; "shutdown requested, stopped at step boundary");
        Ok(())
    }

    /// Runs one epoch of `epoch_size` steps plus the end-of-epoch checkpoint
    /// decision. Returns early (without the epoch transition) if cancelled.
    ///
    /// # Errors
    /// Propagates fatal dataset/model failures.
    pub async fn train_epoch(&mut self, cancel: &CancellationToken) -> Result<()> {
        let mut last_loss = f32::INFINITY;
        while self.state.step < self.config.epoch_size {
            if cancel.is_cancelled() {
                return Ok(());
            }
            last_loss = self.train_step().await?;
        }
        self.finish_epoch(last_loss);
        Ok(())
    }

    /// One full step: sync check, batch, forward/backward, optimizer step,
    /// weight blend, bookkeeping.
    async fn train_step(&mut self) -> Result<f32> {
        // (a) Emit and sync, if due. Checked before the batch is drawn so a
        // sync never lags more than one step behind the threshold crossing.
        self.cursor.advance_to(self.network.block());
        if self.schedule.is_sync_due(&self.cursor) {
            match self.emit_and_sync().await {
                Ok(()) => {
                    self.schedule.mark_synced(&mut self.cursor);
                    self.metrics.bump_sync();
                }
                Err(e) => warn!("peer sync failed, retrying next due cycle: {e}"),
            }
        }

        // (b) Next batch.
        let (inputs, labels) = self
            .dataset
            .next_batch(Split::Train, self.config.batch_size_train)
            .await?;

        // (c) Forward and backward pass.
        let output = self.synapse.forward_backward(&inputs, &labels)?;

        // (d) Optimizer and learning-rate-schedule step.
        self.synapse.apply_step();

        // (e) Blend learned weights into the shared state. Must consume this
        // step's output, so (c) through here stay strictly ordered.
        let next = self
            .consensus
            .blend(&self.weights.current(), output.weights.view())?;

        // Nothing past this point can fail; step state and published weights
        // move together.
        self.weights.publish(next);
        self.state.inc_step();
        self.metrics.bump_step();

        info!(
            epoch = self.state.epoch,
            step = self.state.step,
            epoch_size = self.config.epoch_size,
            remote_loss = output.remote_loss,
            local_loss = output.local_loss,
            distillation_loss = output.distillation_loss,
            loss = output.loss;
            "train step"
        );
        Ok(output.loss)
    }

    async fn emit_and_sync(&mut self) -> Result<()> {
        self.network.emit().await?;
        self.network.sync().await
    }

    /// End-of-epoch transition: checkpoint and re-serve when the final loss
    /// beats the best seen across the whole run.
    fn finish_epoch(&mut self, last_loss: f32) {
        if last_loss < self.state.best_loss {
            self.state.best_loss = last_loss;
            let draft = CheckpointDraft::new()
                .epoch(self.state.epoch)
                .loss(last_loss)
                .model_state(self.synapse.model_state())
                .optimizer_state(self.synapse.optimizer_state());

            match draft.finish().and_then(|record| self.store.save(&record)) {
                Ok(()) => {
                    info!(
                        epoch = self.state.epoch,
                        loss = last_loss,
                        path:% = self.store.path().display();
                        "saved checkpoint"
                    );
                    self.metrics.bump_checkpoint();
                    self.network.serve(ModelSnapshot {
                        model_state: self.synapse.model_state(),
                    });
                }
                Err(e) => error!("checkpoint save failed, continuing: {e}"),
            }
        }

        self.state.next_epoch();
        self.metrics.bump_epoch();
    }
}
