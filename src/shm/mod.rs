//! Shared-memory plumbing: segment manager, bounded channels, signal flags.
//!
//! Everything here is allocated through a [`SharedMemoryManager`] handle,
//! which must be started before any channel exists and must outlive every
//! worker that uses it. Workers borrow the manager, so the borrow checker
//! enforces the second rule.

mod channel;
mod flag;
mod segment;

pub use channel::{Channel, ChannelError, Record};
pub use flag::SignalFlag;
pub use segment::Segment;

use crate::error::{Result, WorkerError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

/// Owner of every shared mapping allocated for channels and flags.
///
/// Segments are reference counted: stopping the manager releases its own
/// references, and each mapping is unmapped once the last channel or flag
/// using it is dropped.
#[derive(Debug)]
pub struct SharedMemoryManager {
    segments: Mutex<Vec<Arc<Segment>>>,
    running: AtomicBool,
}

impl SharedMemoryManager {
    /// Start a new manager, ready to allocate.
    pub fn start() -> Self {
        debug!("Shared memory manager started");
        Self {
            segments: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
        }
    }

    /// Whether the manager still accepts allocations.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Allocate a zeroed shared segment of at least `len` bytes.
    pub fn allocate(&self, len: usize) -> Result<Arc<Segment>> {
        if !self.is_running() {
            return Err(WorkerError::ManagerStopped);
        }
        let segment = Arc::new(Segment::map(len)?);
        trace!(len = segment.len(), "Allocated shared segment");
        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&segment));
        Ok(segment)
    }

    /// Number of segments allocated so far.
    pub fn segment_count(&self) -> usize {
        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total bytes mapped by this manager.
    pub fn allocated_bytes(&self) -> usize {
        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.len())
            .sum()
    }

    /// Stop the manager and release its segments.
    ///
    /// Takes `self` so it cannot be called while any worker still borrows
    /// the manager.
    pub fn stop(self) {
        // Drop does the work.
    }

    fn release(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut segments = self.segments.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(
            segments = segments.len(),
            bytes = segments.iter().map(|s| s.len()).sum::<usize>(),
            "Shared memory manager stopped"
        );
        segments.clear();
    }
}

impl Drop for SharedMemoryManager {
    fn drop(&mut self) {
        self.release();
    }
}
