/// Chain position tracked between synchronizations.
///
/// `current_block` advances externally (the network layer reports it);
/// `last_sync_block` only moves through [`SyncSchedule::mark_synced`].
#[derive(Debug, Clone, Copy)]
pub struct SyncCursor {
    pub last_sync_block: u64,
    pub current_block: u64,
}

impl SyncCursor {
    pub fn new(block: u64) -> Self {
        Self {
            last_sync_block: block,
            current_block: block,
        }
    }

    #[inline]
    pub fn advance_to(&mut self, block: u64) {
        self.current_block = block;
    }
}

/// Defines when an emit+sync with the network is due.
#[derive(Debug, Clone)]
pub struct SyncSchedule {
    threshold: u64,
}

impl SyncSchedule {
    pub const DEFAULT_THRESHOLD: u64 = 15;

    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    /// Returns true once the cursor has drifted more than `threshold` blocks
    /// past the last synchronization. Pure; the caller performs the side
    /// effects and then calls [`Self::mark_synced`].
    #[inline]
    pub fn is_sync_due(&self, cursor: &SyncCursor) -> bool {
        cursor.current_block.saturating_sub(cursor.last_sync_block) > self.threshold
    }

    /// Records that a synchronization completed at the cursor's current block.
    #[inline]
    pub fn mark_synced(&self, cursor: &mut SyncCursor) {
        cursor.last_sync_block = cursor.current_block;
    }
}

impl Default for SyncSchedule {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}
