use std::{error::Error, fmt, io, path::PathBuf};

/// The neuron crate's result type.
pub type Result<T> = std::result::Result<T, NeuronErr>;

/// Neuron runtime failures.
#[derive(Debug)]
pub enum NeuronErr {
    /// Invalid configuration — caught before any training starts.
    InvalidConfig(String),
    /// A checkpoint record is missing a mandatory field; detected before any I/O.
    IncompleteCheckpoint { missing: &'static str },
    /// No checkpoint exists at the configured location.
    CheckpointNotFound { path: PathBuf },
    /// A checkpoint exists but does not parse into the expected shape.
    CorruptCheckpoint { path: PathBuf, detail: String },
    /// Learned weights do not line up with the shared weight vector.
    WeightShapeMismatch { got: usize, expected: usize },
    /// Proposed weight entries do not form a probability distribution.
    InvalidDistribution { detail: String },
    /// A network-layer operation (emit, sync) failed; recoverable.
    NetworkOp { op: &'static str, detail: String },
    /// The model collaborator failed its forward/backward pass; fatal.
    Compute(String),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for NeuronErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::IncompleteCheckpoint { missing } => {
                write!(f, "checkpoint record is missing '{missing}'")
            }
            Self::CheckpointNotFound { path } => {
                write!(f, "no checkpoint at {}", path.display())
            }
            Self::CorruptCheckpoint { path, detail } => {
                write!(f, "corrupt checkpoint at {}: {detail}", path.display())
            }
            Self::WeightShapeMismatch { got, expected } => write!(
                f,
                "learned weights cover {got} peers, shared state has {expected}"
            ),
            Self::InvalidDistribution { detail } => {
                write!(f, "not a probability distribution: {detail}")
            }
            Self::NetworkOp { op, detail } => write!(f, "network {op} failed: {detail}"),
            Self::Compute(msg) => write!(f, "model computation failed: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for NeuronErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for NeuronErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
