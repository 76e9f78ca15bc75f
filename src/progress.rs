use log::{debug, info};

/// Receives progress from the smoothing and lacing phases. Implementations
/// must tolerate calls from several worker threads at once.
pub trait ProgressReporter: Sync {
    /// A new phase starts with `total` units of work.
    fn phase(&self, name: &str, total: usize);

    /// `done` of `total` units of the current phase are complete.
    fn advance(&self, done: usize, total: usize);
}

/// Reports through the `log` facade: phase boundaries at info level, and a
/// debug line every `interval` units.
pub struct LogProgress {
    interval: usize,
}

impl LogProgress {
    pub fn new(interval: usize) -> Self {
        LogProgress {
            interval: interval.max(1),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        LogProgress::new(100)
    }
}

impl ProgressReporter for LogProgress {
    fn phase(&self, name: &str, total: usize) {
        info!("{} ({} items)", name, total);
    }

    fn advance(&self, done: usize, total: usize) {
        if done % self.interval == 0 || done == total {
            debug!(
                "{}/{} {:.3}%",
                done,
                total,
                done as f64 / total.max(1) as f64 * 100.0
            );
        }
    }
}

/// Discards all progress.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn phase(&self, _name: &str, _total: usize) {}

    fn advance(&self, _done: usize, _total: usize) {}
}
