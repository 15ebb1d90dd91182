//! Cooperative shutdown flag for long-lived loops.
//!
//! Shutdown is normally whole-process exit; the flag exists so embedders and
//! tests can wind an endpoint down. Loops observe it between blocking units
//! of work, so a loop parked in a blocking read only notices on its next
//! wakeup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Clonable shutdown token shared by every thread of an endpoint.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// Create a new, untriggered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
