//! The polling loop that runs inside the worker process.
//!
//! Each tick drains commands first, then inputs, so a pending stop is always
//! seen before any more data is processed. Only the newest input of a tick is
//! computed; older ones are discarded.

use super::compute::Computation;
use super::control::{Counter, Endpoints};
use super::protocol::Command;
use crate::error::WorkerError;
use crate::payload::{Array, Element, Layout};
use crate::shm::ChannelError;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Lifecycle of the loop. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Running,
    Stopping,
    Terminated,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No input was pending.
    Idle,
    /// One input was computed (its result may still have been dropped).
    Processed,
    /// A stop command was observed; no data was touched.
    Stopped,
}

pub(crate) struct WorkerLoop<'a, I: Element, O: Element, U: Computation<I, O>> {
    endpoints: &'a mut Endpoints<I, O>,
    unit: &'a mut U,
    output_layout: Layout,
    poll_interval: Duration,
    verbose: bool,
    state: LoopState,
}

impl<'a, I: Element, O: Element, U: Computation<I, O>> WorkerLoop<'a, I, O, U> {
    pub fn new(
        endpoints: &'a mut Endpoints<I, O>,
        unit: &'a mut U,
        poll_interval: Duration,
        verbose: bool,
    ) -> Self {
        let output_layout = endpoints.outputs.descriptor().clone();
        Self {
            endpoints,
            unit,
            output_layout,
            poll_interval,
            verbose,
            state: LoopState::Starting,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run one iteration without sleeping.
    ///
    /// Errors from the computation unit, or a result whose layout differs
    /// from the declared output, are returned unchanged; the loop does not
    /// recover from them.
    pub fn tick(&mut self) -> anyhow::Result<TickOutcome> {
        if self.observe_commands() {
            self.endpoints.control.stop.set();
            self.state = LoopState::Stopping;
            debug!("Stop command received");
            return Ok(TickOutcome::Stopped);
        }

        let outcome = match self.endpoints.inputs.get_all() {
            Ok(mut batch) => {
                let stale = batch.len() - 1;
                if stale > 0 {
                    self.endpoints
                        .control
                        .bump(Counter::StaleInputs, stale as u64);
                    trace!(stale, "Discarding older inputs");
                }
                match batch.pop() {
                    Some(latest) => {
                        self.process(&latest)?;
                        TickOutcome::Processed
                    }
                    None => TickOutcome::Idle,
                }
            }
            Err(ChannelError::Empty | ChannelError::Full) => TickOutcome::Idle,
        };

        if self.state == LoopState::Starting {
            self.endpoints.control.ready.set();
            self.state = LoopState::Running;
            debug!("Worker loop ready");
        }
        self.endpoints.control.bump(Counter::Ticks, 1);

        Ok(outcome)
    }

    fn observe_commands(&mut self) -> bool {
        let Ok(commands) = self.endpoints.commands.get_all() else {
            return false;
        };
        for record in commands {
            match record.command() {
                Some(Command::Stop) => return true,
                None => {
                    self.endpoints.control.bump(Counter::UnknownCommands, 1);
                    trace!(tag = record.cmd, "Ignoring unknown command");
                }
            }
        }
        false
    }

    fn process(&mut self, input: &Array<I>) -> anyhow::Result<()> {
        let output = self.unit.update(input)?;
        if output.layout() != self.output_layout {
            return Err(WorkerError::LayoutMismatch {
                expected: self.output_layout.clone(),
                actual: output.layout(),
            }
            .into());
        }
        self.endpoints.control.bump(Counter::Processed, 1);

        if self.endpoints.outputs.put(&output).is_err() {
            self.endpoints.control.bump(Counter::DroppedOutputs, 1);
            if self.verbose {
                warn!("Output channel is full; dropping result");
            } else {
                trace!("Output channel is full; dropping result");
            }
        }
        Ok(())
    }

    /// Tick until a stop command arrives, sleeping `poll_interval` between
    /// ticks.
    pub fn run(mut self) -> anyhow::Result<()> {
        while self.tick()? != TickOutcome::Stopped {
            std::thread::sleep(self.poll_interval);
        }
        self.state = LoopState::Terminated;
        if self.verbose {
            debug!(state = ?self.state(), "Exiting the main loop");
        }
        Ok(())
    }
}
