//! Controller-side handle for one worker process.

use super::compute::Computation;
use super::control::{Counter, Endpoints, WorkerStats};
use super::proc::Proc;
use super::protocol::Command;
use super::run_loop::WorkerLoop;
use super::signals::{TerminationReason, analyze_wait_status};
use super::spawn::{EXIT_FAILED, EXIT_OK, spawn_worker};
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::payload::{Array, Element, Layout};
use crate::shm::SharedMemoryManager;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Granularity of the launch wait; liveness is checked between slices.
const READY_SLICE: Duration = Duration::from_millis(10);

/// How long a worker gets to honor SIGTERM before SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(100);

/// A computation unit running in its own process, fed through shared
/// memory channels.
///
/// The handle borrows the [`SharedMemoryManager`] its channels were
/// allocated from, so the manager cannot be stopped while a worker exists.
///
/// # Example
///
/// ```no_run
/// use shm_worker::{Array, Doubler, SharedMemoryManager, Worker, WorkerConfig};
///
/// let manager = SharedMemoryManager::start();
/// let example = Array::<i32>::zeros([1, 3]);
/// let unit = Doubler::new(&example);
/// let mut worker = Worker::new(&manager, &example, &example, unit, WorkerConfig::default())?;
///
/// worker.scope(|w| {
///     w.put_to_input(&Array::from_vec([1, 3], vec![10, 20, 30])?);
///     std::thread::sleep(std::time::Duration::from_millis(50));
///     println!("{:?}", w.get_from_output(1));
///     Ok::<_, shm_worker::WorkerError>(())
/// })?;
/// # Ok::<(), shm_worker::WorkerError>(())
/// ```
pub struct Worker<'m, I: Element, O: Element, U: Computation<I, O>> {
    endpoints: Endpoints<I, O>,
    unit: U,
    config: WorkerConfig,
    input_layout: Layout,
    proc: Option<Proc>,
    termination: Option<TerminationReason>,
    _manager: PhantomData<&'m SharedMemoryManager>,
}

impl<'m, I: Element, O: Element, U: Computation<I, O>> Worker<'m, I, O, U> {
    /// Allocate the channels and flags for a worker. No process is started.
    pub fn new(
        manager: &'m SharedMemoryManager,
        input_example: &Array<I>,
        output_example: &Array<O>,
        unit: U,
        config: WorkerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let endpoints =
            Endpoints::allocate(manager, input_example, output_example, config.capacity)?;

        debug!(
            input = %input_example.layout(),
            output = %output_example.layout(),
            capacity = config.capacity,
            "Allocated worker channels"
        );

        Ok(Self {
            endpoints,
            unit,
            config,
            input_layout: input_example.layout(),
            proc: None,
            termination: None,
            _manager: PhantomData,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn input_layout(&self) -> &Layout {
        &self.input_layout
    }

    pub fn output_layout(&self) -> &Layout {
        self.endpoints.outputs.descriptor()
    }

    /// Process ID, once started.
    pub fn pid(&self) -> Option<Pid> {
        self.proc.as_ref().map(Proc::pid)
    }

    /// Fork the worker process.
    ///
    /// With `wait`, blocks until the worker reports ready, failing with
    /// [`WorkerError::LaunchTimeout`] after `launch_timeout` or with
    /// [`WorkerError::LaunchFailed`] if the process dies first. A worker that
    /// times out is shut down before the error is returned.
    pub fn start(&mut self, wait: bool) -> Result<()> {
        if self.proc.is_some() {
            return Err(WorkerError::AlreadyStarted);
        }

        let poll_interval = self.config.poll_interval;
        let verbose = self.config.verbose;
        let endpoints = &mut self.endpoints;
        let unit = &mut self.unit;
        let proc = spawn_worker("shm-worker", move || {
            match WorkerLoop::new(endpoints, unit, poll_interval, verbose).run() {
                Ok(()) => EXIT_OK,
                Err(e) => {
                    eprintln!("Worker error: {:#}", e);
                    EXIT_FAILED
                }
            }
        })?;

        info!(pid = %proc.pid(), "Worker started");
        self.proc = Some(proc);

        if wait {
            self.wait_until_ready()?;
        }
        Ok(())
    }

    fn wait_until_ready(&mut self) -> Result<()> {
        let timeout = self.config.launch_timeout;
        let started = Instant::now();
        // No deadline when the timeout overflows `Instant`.
        let deadline = started.checked_add(timeout);

        loop {
            let slice = deadline.map_or(READY_SLICE, |deadline| {
                READY_SLICE.min(deadline.saturating_duration_since(Instant::now()))
            });
            if self.endpoints.control.ready.wait(slice) {
                debug!(elapsed = ?started.elapsed(), "Worker ready");
                return Ok(());
            }
            if let Some(reason) = self.poll_exit()? {
                return Err(WorkerError::LaunchFailed(reason));
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                error!(?timeout, "Worker did not become ready; shutting it down");
                self.shutdown();
                return Err(WorkerError::LaunchTimeout { timeout });
            }
        }
    }

    /// Ask the worker to stop.
    ///
    /// With `wait`, blocks until the process has exited. Once the exit has
    /// been observed, further calls return immediately. Does nothing on a
    /// worker that was never started.
    pub fn stop(&mut self, wait: bool) -> Result<()> {
        if self.proc.is_none() || self.termination.is_some() {
            return Ok(());
        }
        if self.poll_exit()?.is_some() {
            return Ok(());
        }

        if self.endpoints.commands.put(&Command::Stop.into()).is_err() {
            self.diagnostic("Command channel is full; stop request dropped");
        } else {
            debug!("Stop requested");
        }

        if wait && let Some(proc) = self.proc.as_mut() {
            let status = proc.wait()?;
            self.record_exit(status);
        }
        Ok(())
    }

    /// Whether the worker loop has completed its first tick.
    pub fn is_ready(&self) -> bool {
        self.endpoints.control.ready.is_set()
    }

    /// Whether the worker process is running. Reaps it if it has exited.
    pub fn is_alive(&mut self) -> bool {
        if self.proc.is_none() {
            return false;
        }
        matches!(self.poll_exit(), Ok(None))
    }

    /// Why the worker process exited, once that has been observed.
    pub fn termination(&self) -> Option<&TerminationReason> {
        self.termination.as_ref()
    }

    /// Whether the worker has set its stop flag.
    pub fn is_stopping(&self) -> bool {
        self.endpoints.control.stop.is_set()
    }

    pub fn stats(&self) -> WorkerStats {
        self.endpoints.control.snapshot()
    }

    /// Offer a payload to the worker.
    ///
    /// Never blocks: if the input channel is full the payload is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the payload's shape differs from the input example's.
    pub fn put_to_input(&mut self, payload: &Array<I>) {
        assert_eq!(
            payload.shape(),
            self.input_layout.shape(),
            "input shape does not match the worker's declared input"
        );

        if self.endpoints.inputs.put(payload).is_err() {
            self.endpoints.control.bump(Counter::DroppedInputs, 1);
            self.diagnostic("Input channel is full; dropping input");
        }
    }

    /// Collect results.
    ///
    /// `k == 0` drains everything buffered; otherwise at most the `k` most
    /// recent results are returned and older ones are discarded. Returns an
    /// empty vector when nothing is buffered.
    pub fn get_from_output(&mut self, k: usize) -> Vec<Array<O>> {
        let drained = if k == 0 {
            self.endpoints.outputs.get_all()
        } else {
            self.endpoints.outputs.get_k(k)
        };

        drained.unwrap_or_else(|_| {
            if self.config.verbose {
                info!("Output channel is empty");
            } else {
                trace!("Output channel is empty");
            }
            Vec::new()
        })
    }

    /// Start the worker, wait until it is ready, and return a guard that
    /// stops it when dropped.
    pub fn enter(&mut self) -> Result<Session<'_, 'm, I, O, U>> {
        self.start(true)?;
        Ok(Session {
            worker: self,
            finished: false,
        })
    }

    /// Run `f` against a started worker and stop it afterwards.
    ///
    /// The worker is stopped (and joined) before any error from `f` is
    /// returned.
    pub fn scope<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        E: From<WorkerError>,
    {
        self.start(true)?;
        let result = f(self);
        let stopped = self.stop(true);
        let value = result?;
        stopped?;
        Ok(value)
    }

    /// Reap the process if it has exited.
    fn poll_exit(&mut self) -> Result<Option<TerminationReason>> {
        if let Some(reason) = &self.termination {
            return Ok(Some(reason.clone()));
        }
        let Some(proc) = self.proc.as_mut() else {
            return Ok(None);
        };
        match proc.try_wait()? {
            Some(status) => Ok(Some(self.record_exit(status))),
            None => Ok(None),
        }
    }

    fn record_exit(&mut self, status: WaitStatus) -> TerminationReason {
        let reason = analyze_wait_status(status);
        if self.termination.is_none() {
            let pid = self.pid().map(|p| p.as_raw()).unwrap_or_default();
            if reason.is_success() {
                debug!(pid, "Worker exited");
            } else {
                warn!(pid, %reason, "Worker exited abnormally");
            }
            self.termination = Some(reason.clone());
        }
        reason
    }

    /// Request a stop, escalating to SIGTERM after `shutdown_grace` and to
    /// SIGKILL after [`TERM_GRACE`].
    fn shutdown(&mut self) {
        if self.proc.is_none() || self.termination.is_some() {
            return;
        }

        let _ = self.endpoints.commands.put(&Command::Stop.into());
        let grace = self.config.shutdown_grace;
        let exited = self
            .proc
            .as_mut()
            .and_then(|proc| proc.wait_timeout(grace).ok().flatten());

        let status = match exited {
            Some(status) => Some(status),
            None => {
                warn!(?grace, "Worker still running after stop request; terminating");
                self.proc.as_mut().and_then(|proc| {
                    let _ = proc.terminate();
                    match proc.wait_timeout(TERM_GRACE) {
                        Ok(Some(status)) => Some(status),
                        _ => proc.kill().ok(),
                    }
                })
            }
        };
        if let Some(status) = status {
            self.record_exit(status);
        }
    }

    fn diagnostic(&self, message: &str) {
        if self.config.verbose {
            warn!("{}", message);
        } else {
            trace!("{}", message);
        }
    }
}

impl<I: Element, O: Element, U: Computation<I, O>> Drop for Worker<'_, I, O, U> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A started worker that is stopped when the guard goes out of scope.
pub struct Session<'w, 'm, I: Element, O: Element, U: Computation<I, O>> {
    worker: &'w mut Worker<'m, I, O, U>,
    finished: bool,
}

impl<I: Element, O: Element, U: Computation<I, O>> Session<'_, '_, I, O, U> {
    /// Stop the worker now and report any error.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.worker.stop(true)
    }
}

impl<'m, I: Element, O: Element, U: Computation<I, O>> Deref for Session<'_, 'm, I, O, U> {
    type Target = Worker<'m, I, O, U>;

    fn deref(&self) -> &Self::Target {
        self.worker
    }
}

impl<I: Element, O: Element, U: Computation<I, O>> DerefMut for Session<'_, '_, I, O, U> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.worker
    }
}

impl<I: Element, O: Element, U: Computation<I, O>> Drop for Session<'_, '_, I, O, U> {
    fn drop(&mut self) {
        if !self.finished
            && let Err(e) = self.worker.stop(true)
        {
            error!("Failed to stop worker: {}", e);
        }
    }
}
