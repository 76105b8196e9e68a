use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Cooperative cancellation flag shared by every component of a pipeline run.
///
/// Clones observe the same flag. Components check it at each loop iteration
/// and after every poll sleep, so cancellation is never observed halfway
/// through a staging map mutation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sleeps for one poll interval and reports whether cancellation was requested.
    pub fn pause(&self, interval: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        thread::sleep(interval);
        self.is_cancelled()
    }
}
