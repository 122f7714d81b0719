//! Cooperative Ctrl-C handling for the controller.
//!
//! The handler only raises a flag; loops check it between rounds and stop
//! their workers through the normal stop path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared "interrupt requested" flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// A flag that is only raised through [`trigger`](Self::trigger).
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a process-wide Ctrl-C handler that raises the returned flag.
    ///
    /// Can be installed once per process.
    pub fn install() -> Result<Self, ctrlc::Error> {
        let interrupt = Self::new();
        let flag = Arc::clone(&interrupt.flag);
        ctrlc::set_handler(move || {
            eprintln!("\nReceived Ctrl+C, stopping worker...");
            flag.store(true, Ordering::SeqCst);
        })?;
        Ok(interrupt)
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}
