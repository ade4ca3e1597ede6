// cancellation.rs - Cooperative one-shot cancellation flag shared by a task and its body.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheaply cloneable, one-shot cancel flag. `cancel()` never aborts the
/// running body; it only sets the flag for the body to observe at its own
/// checkpoints.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clears the flag. Only meaningful before a token is handed to a task;
    /// resetting a token whose body already observed cancellation does not
    /// resurrect that body.
    #[inline]
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}
