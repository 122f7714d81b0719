//! One-shot cross-process boolean.

use super::{Segment, SharedMemoryManager};
use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Granularity of [`SignalFlag::wait`].
const WAIT_SLICE: Duration = Duration::from_millis(1);

/// A flag that goes from unset to set once and stays set.
///
/// Backed by an `AtomicU32` in a shared segment, so a set in one process is
/// seen by every process that shares the mapping.
#[derive(Clone)]
pub struct SignalFlag {
    segment: Arc<Segment>,
    offset: usize,
}

impl SignalFlag {
    /// Allocate a standalone flag.
    pub fn create(manager: &SharedMemoryManager) -> Result<Self> {
        let segment = manager.allocate(std::mem::size_of::<AtomicU32>())?;
        Ok(Self { segment, offset: 0 })
    }

    /// A flag stored inside an existing segment.
    ///
    /// Panics if `offset` is misaligned or out of range.
    pub(crate) fn in_segment(segment: Arc<Segment>, offset: usize) -> Self {
        assert!(offset % std::mem::align_of::<AtomicU32>() == 0);
        assert!(offset + std::mem::size_of::<AtomicU32>() <= segment.len());
        Self { segment, offset }
    }

    fn cell(&self) -> &AtomicU32 {
        // Safety: bounds and alignment checked at construction.
        unsafe { self.segment.at(self.offset) }
    }

    pub fn set(&self) {
        self.cell().store(1, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.cell().load(Ordering::Acquire) != 0
    }

    /// Block until the flag is set or `timeout` elapses.
    ///
    /// Returns whether the flag was set. A timeout too large to represent as
    /// a deadline waits without one.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if self.is_set() {
                return true;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    WAIT_SLICE.min(deadline - now)
                }
                None => WAIT_SLICE,
            };
            std::thread::sleep(slice);
        }
    }
}

impl std::fmt::Debug for SignalFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalFlag")
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_visible_through_clone() {
        let manager = SharedMemoryManager::start();
        let flag = SignalFlag::create(&manager).unwrap();
        let other = flag.clone();
        assert!(!other.is_set());
        flag.set();
        assert!(other.is_set());
    }

    #[test]
    fn test_wait_times_out() {
        let manager = SharedMemoryManager::start();
        let flag = SignalFlag::create(&manager).unwrap();
        let start = Instant::now();
        assert!(!flag.wait(Duration::from_millis(30)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_wait_sees_set_from_other_thread() {
        let manager = SharedMemoryManager::start();
        let flag = SignalFlag::create(&manager).unwrap();
        let setter = flag.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            setter.set();
        });
        assert!(flag.wait(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_with_unbounded_timeout() {
        let manager = SharedMemoryManager::start();
        let flag = SignalFlag::create(&manager).unwrap();
        let setter = flag.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            setter.set();
        });
        assert!(flag.wait(Duration::MAX));
        handle.join().unwrap();
    }

    #[test]
    fn test_in_segment_offsets_are_independent() {
        let manager = SharedMemoryManager::start();
        let segment = manager.allocate(64).unwrap();
        let a = SignalFlag::in_segment(Arc::clone(&segment), 0);
        let b = SignalFlag::in_segment(segment, 4);
        a.set();
        assert!(a.is_set());
        assert!(!b.is_set());
    }
}
