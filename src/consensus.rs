use ndarray::{ArrayView2, Axis};
use tokio::sync::watch;

use crate::error::{NeuronErr, Result};

/// Tolerance used when checking that a weight vector sums to one.
pub const DISTRIBUTION_TOLERANCE: f32 = 1e-6;

/// The shared per-peer trust weights: a probability distribution over the
/// known peer uids, in a fixed order.
///
/// Only constructible as a valid distribution; `blend` preserves that
/// invariant inductively.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector {
    uids: Vec<u64>,
    probs: Vec<f32>,
}

impl WeightVector {
    /// The uniform distribution over `uids`.
    pub fn uniform(uids: Vec<u64>) -> Self {
        let n = uids.len().max(1);
        let probs = vec![1.0 / n as f32; uids.len()];
        Self { uids, probs }
    }

    /// Builds a weight vector from explicit probabilities.
    ///
    /// # Errors
    /// Returns `WeightShapeMismatch` when lengths differ and
    /// `InvalidDistribution` when any entry is negative or non-finite, or
    /// the entries do not sum to one within tolerance.
    pub fn from_probs(uids: Vec<u64>, probs: Vec<f32>) -> Result<Self> {
        if uids.len() != probs.len() {
            return Err(NeuronErr::WeightShapeMismatch {
                got: probs.len(),
                expected: uids.len(),
            });
        }
        if probs.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(NeuronErr::InvalidDistribution {
                detail: "entries must be finite and non-negative".into(),
            });
        }
        let sum: f32 = probs.iter().sum();
        if (sum - 1.0).abs() > DISTRIBUTION_TOLERANCE {
            return Err(NeuronErr::InvalidDistribution {
                detail: format!("entries sum to {sum}, expected 1"),
            });
        }
        Ok(Self { uids, probs })
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    pub fn uids(&self) -> &[u64] {
        &self.uids
    }

    pub fn probs(&self) -> &[f32] {
        &self.probs
    }
}

/// Numerically stable softmax; equal inputs map to the uniform distribution.
fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Blends freshly learned per-peer scores into the shared weight state with a
/// fixed EMA decay.
#[derive(Debug, Clone)]
pub struct WeightConsensus {
    decay: f32,
}

impl WeightConsensus {
    pub const DEFAULT_DECAY: f32 = 0.05;

    /// # Errors
    /// Returns `InvalidConfig` unless `decay` lies in `[0, 1)`. Zero is
    /// admitted as the identity blend.
    pub fn new(decay: f32) -> Result<Self> {
        if !(decay >= 0.0 && decay < 1.0) {
            return Err(NeuronErr::InvalidConfig(
                "blend decay must lie in [0, 1)".into(),
            ));
        }
        Ok(Self { decay })
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    /// Folds a batch of learned scores into `state`.
    ///
    /// `learned` has one row per batch sample and one column per peer, in the
    /// same order as `state`. Rows are averaged, softmaxed into a
    /// distribution, EMA-blended into the state, and the result is passed
    /// through a final softmax so floating-point accumulation can never drift
    /// it away from a valid distribution.
    ///
    /// An empty batch degrades to uniform learned scores rather than failing.
    /// With `decay == 0` the state is returned unchanged, making repeated
    /// application exactly idempotent.
    ///
    /// # Errors
    /// Returns `WeightShapeMismatch` when the column count disagrees with the
    /// state's peer count.
    pub fn blend(&self, state: &WeightVector, learned: ArrayView2<f32>) -> Result<WeightVector> {
        let n = state.len();
        if learned.nrows() > 0 && learned.ncols() != n {
            return Err(NeuronErr::WeightShapeMismatch {
                got: learned.ncols(),
                expected: n,
            });
        }
        if self.decay == 0.0 {
            return Ok(state.clone());
        }

        let scores = match learned.mean_axis(Axis(0)) {
            Some(mean) => mean.to_vec(),
            None => vec![0.0; n],
        };
        let learned_probs = softmax(&scores);

        let blended: Vec<f32> = state
            .probs
            .iter()
            .zip(&learned_probs)
            .map(|(s, l)| (1.0 - self.decay) * s + self.decay * l)
            .collect();

        Ok(WeightVector {
            uids: state.uids.clone(),
            probs: softmax(&blended),
        })
    }
}

impl Default for WeightConsensus {
    fn default() -> Self {
        Self {
            decay: Self::DEFAULT_DECAY,
        }
    }
}

/// Single-writer handoff of the shared weights to the network layer.
///
/// The driver publishes whole replacement vectors; readers always observe
/// either the pre-blend or the post-blend state, never a partial write.
#[derive(Debug)]
pub struct WeightsHandle {
    tx: watch::Sender<WeightVector>,
}

impl WeightsHandle {
    pub fn new(initial: WeightVector) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Replaces the published vector.
    pub fn publish(&self, next: WeightVector) {
        self.tx.send_replace(next);
    }

    /// A snapshot of the currently published vector.
    pub fn current(&self) -> WeightVector {
        self.tx.borrow().clone()
    }

    /// A receiver for the network layer to observe (and transmit) updates.
    pub fn subscribe(&self) -> watch::Receiver<WeightVector> {
        self.tx.subscribe()
    }
}
