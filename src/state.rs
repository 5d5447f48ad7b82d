/// Driver-private training progress. No external synchronization required.
#[derive(Debug)]
pub struct TrainingState {
    pub epoch: u64,

    /// Step within the current epoch; resets at every epoch boundary.
    pub step: u64,

    /// Best end-of-epoch loss seen across the whole run.
    pub best_loss: f32,
}

impl TrainingState {
    pub fn new() -> Self {
        Self {
            epoch: 0,
            step: 0,
            best_loss: f32::INFINITY,
        }
    }

    #[inline]
    pub fn inc_step(&mut self) {
        self.step += 1;
    }

    #[inline]
    pub fn next_epoch(&mut self) {
        self.step = 0;
        self.epoch += 1;
    }
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}
