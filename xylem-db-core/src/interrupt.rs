//! Cooperative interruption for long-running batch operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// A batch operation observed an interrupt at one of its safe points.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation interrupted")]
pub struct Interrupted;

/// Shared stop flag.
///
/// The job scheduler raises it; batch loops poll [`InterruptFlag::check`]
/// at safe points only (between whole-key iterations, never in the middle
/// of a record), so an interrupted batch always leaves its structures
/// consistent.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask in-flight batches to stop at their next safe point.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Relaxed);
    }

    /// Clear the flag so the holder can be reused for the next job.
    pub fn reset(&self) {
        self.raised.store(false, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Relaxed)
    }

    /// Poll point for batch loops.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_raised() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}
