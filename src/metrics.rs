/// In-process counters for observability at shutdown or from tests.
#[derive(Debug, Default, Clone)]
pub struct NeuronMetrics {
    pub steps: u64,
    pub syncs: u64,
    pub epochs: u64,
    pub checkpoints: u64,
}

impl NeuronMetrics {
    #[inline]
    pub fn bump_step(&mut self) {
        self.steps += 1;
    }

    #[inline]
    pub fn bump_sync(&mut self) {
        self.syncs += 1;
    }

    #[inline]
    pub fn bump_epoch(&mut self) {
        self.epochs += 1;
    }

    #[inline]
    pub fn bump_checkpoint(&mut self) {
        self.checkpoints += 1;
    }
}
