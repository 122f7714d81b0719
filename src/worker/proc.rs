//! Process handle for a forked worker.

use crate::error::{Result, WorkerError};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::time::{Duration, Instant};

/// How often `wait_timeout` polls the child.
const REAP_POLL: Duration = Duration::from_millis(5);

/// Handle to a child process that this process is responsible for reaping.
#[derive(Debug)]
pub struct Proc {
    /// Process ID
    pid: Pid,
    /// Exit status, once the process has been reaped
    status: Option<WaitStatus>,
}

impl Proc {
    pub fn new(pid: Pid) -> Self {
        Self { pid, status: None }
    }

    /// Get the process ID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Wait for the process to exit (blocking).
    ///
    /// Once reaped, further calls return the recorded status immediately.
    pub fn wait(&mut self) -> Result<WaitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::StillAlive) => continue,
                Ok(status) => return Ok(self.record(status)),
                Err(Errno::EINTR) => continue, // Retry on interrupt
                Err(e) => return Err(WorkerError::Process(format!("waitpid failed: {}", e))),
            }
        }
    }

    /// Try to wait for the process (non-blocking).
    ///
    /// Returns `None` if the process is still running.
    pub fn try_wait(&mut self) -> Result<Option<WaitStatus>> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => Ok(None),
            Ok(status) => Ok(Some(self.record(status))),
            Err(Errno::EINTR) => Ok(None),
            Err(e) => Err(WorkerError::Process(format!("waitpid failed: {}", e))),
        }
    }

    /// Wait up to `timeout` for the process to exit.
    ///
    /// A timeout past the representable range of `Instant` behaves like
    /// [`Proc::wait`].
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<WaitStatus>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait().map(Some);
        };
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(REAP_POLL.min(deadline - now));
        }
    }

    /// Send SIGTERM to the process.
    pub fn terminate(&self) -> Result<()> {
        if self.status.is_some() {
            return Ok(());
        }
        signal::kill(self.pid, Signal::SIGTERM)
            .map_err(|e| WorkerError::Process(format!("Failed to send SIGTERM: {}", e)))
    }

    /// Send SIGKILL to the process and wait for it to exit.
    pub fn kill(&mut self) -> Result<WaitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        signal::kill(self.pid, Signal::SIGKILL)
            .map_err(|e| WorkerError::Process(format!("Failed to send SIGKILL: {}", e)))?;
        self.wait()
    }

    fn record(&mut self, status: WaitStatus) -> WaitStatus {
        self.status = Some(status);
        status
    }
}

impl Drop for Proc {
    fn drop(&mut self) {
        if self.status.is_none() {
            // Never leave a zombie behind.
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
        }
    }
}
