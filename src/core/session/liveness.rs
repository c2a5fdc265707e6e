//! Cooperative session liveness flag
//!
//! The host sets the flag to dead on teardown. Drivers check it after every
//! resumed continuation and discard results without further side effects;
//! in-flight remote calls are not actively aborted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared liveness flag for one load session
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    /// A live flag.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Whether the session is still wanted.
    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Mark the session as no longer wanted.
    pub fn kill(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}
