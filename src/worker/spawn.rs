//! Worker process creation.
//!
//! Workers are created with `fork(2)` so they inherit the shared mappings
//! and the computation unit by value. The child runs its body and leaves via
//! `_exit`, never returning into the caller's stack.

use super::proc::Proc;
use crate::error::{Result, WorkerError};
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::unistd::{ForkResult, fork};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::debug;

/// Exit status of a worker that stopped on request.
pub const EXIT_OK: i32 = 0;
/// Exit status of a worker whose loop returned an error.
pub const EXIT_FAILED: i32 = 1;
/// Exit status of a worker whose body panicked (matches Rust's own).
pub const EXIT_PANICKED: i32 = 101;

/// Fork a child process that runs `body` and exits with its return value.
///
/// A panic in `body` exits the child with [`EXIT_PANICKED`].
pub fn spawn_worker<F>(name: &str, body: F) -> Result<Proc>
where
    F: FnOnce() -> i32,
{
    // Safety: the child branch only runs `body` and then calls `_exit`, so
    // it never unwinds into, or returns through, the parent's frames.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            debug!(pid = %child, name, "Forked worker process");
            Ok(Proc::new(child))
        }
        Ok(ForkResult::Child) => {
            init_child();
            let code = catch_unwind(AssertUnwindSafe(body)).unwrap_or(EXIT_PANICKED);
            // Safety: `_exit` skips atexit handlers and stdio flushing that
            // belong to the parent's copy of this address space.
            unsafe { libc::_exit(code) }
        }
        Err(e) => Err(WorkerError::Spawn(format!("fork failed: {}", e))),
    }
}

/// Process-wide setup in the child before the body runs.
fn init_child() {
    // Ctrl-C on the terminal is the controller's to handle; it stops the
    // worker through the command channel.
    // Safety: SigIgn installs no handler code.
    unsafe {
        signal(Signal::SIGINT, SigHandler::SigIgn).ok();
    }
}
