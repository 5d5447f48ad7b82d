//! Training-loop orchestration for a masked-language-model neuron in a
//! peer-scored distributed learning network.
//!
//! The crate owns the scheduling and consensus logic only: when to emit+sync
//! with peers, how learned trust scores fold into the shared weight
//! distribution, and when the best-performing model state is checkpointed.
//! Model architecture, tokenization, datasets, and the wire protocol stay
//! behind the collaborator traits in [`synapse`].

pub mod checkpoint;
pub mod config;
pub mod consensus;
pub mod error;
pub mod metrics;
pub mod neuron;
pub mod schedule;
pub mod state;
pub mod synapse;

pub use checkpoint::{CheckpointDraft, CheckpointRecord, CheckpointStore};
pub use config::NeuronConfig;
pub use consensus::{WeightConsensus, WeightVector, WeightsHandle};
pub use error::{NeuronErr, Result};
pub use metrics::NeuronMetrics;
pub use neuron::Neuron;
pub use schedule::{SyncCursor, SyncSchedule};
pub use state::TrainingState;
pub use synapse::{BatchOutput, BatchSource, ModelSnapshot, Network, Split, Synapse};
