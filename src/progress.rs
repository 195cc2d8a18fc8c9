/// Receives progress updates from a run.
///
/// Called from worker threads, so implementations must be `Sync`. Updates are
/// monotonic: `advance` is only ever called with positive deltas.
pub trait Progress: Sync {
    fn set_total(&self, total: u64);
    fn advance(&self, delta: u64);
    fn finish(&self);
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn set_total(&self, _total: u64) {}
    fn advance(&self, _delta: u64) {}
    fn finish(&self) {}
}

#[cfg(feature = "cli")]
impl Progress for indicatif::ProgressBar {
    fn set_total(&self, total: u64) {
        self.set_length(total);
    }

    fn advance(&self, delta: u64) {
        self.inc(delta);
    }

    fn finish(&self) {
        indicatif::ProgressBar::finish(self);
    }
}
