// hallticket-pdf: cooperative cancellation shared by a batch's workers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloned into every worker of a batch; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
