//! Shared control block: ready/stop flags and loop counters.
//!
//! One small segment per worker. The worker writes both flags and every
//! counter except `DroppedInputs`, which belongs to the controller.

use crate::error::Result;
use crate::payload::{Array, Element};
use crate::shm::{Channel, Segment, SharedMemoryManager, SignalFlag};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::protocol::{Command, CommandRecord};

const READY_OFFSET: usize = 0;
const STOP_OFFSET: usize = 4;
const COUNTERS_OFFSET: usize = 64;
const CONTROL_LEN: usize = 128;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    Ticks = 0,
    Processed,
    StaleInputs,
    DroppedInputs,
    DroppedOutputs,
    UnknownCommands,
}

/// Counters describing what a worker has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Loop iterations completed.
    pub ticks: u64,
    /// Computation invocations.
    pub processed: u64,
    /// Inputs discarded because a newer one arrived in the same tick.
    pub stale_inputs: u64,
    /// Inputs dropped by the controller on a full input channel.
    pub dropped_inputs: u64,
    /// Results dropped by the worker on a full output channel.
    pub dropped_outputs: u64,
    /// Commands with a tag the worker did not recognize.
    pub unknown_commands: u64,
}

pub(crate) struct ControlBlock {
    segment: Arc<Segment>,
    pub ready: SignalFlag,
    pub stop: SignalFlag,
}

impl ControlBlock {
    pub fn allocate(manager: &SharedMemoryManager) -> Result<Self> {
        let segment = manager.allocate(CONTROL_LEN)?;
        Ok(Self {
            ready: SignalFlag::in_segment(Arc::clone(&segment), READY_OFFSET),
            stop: SignalFlag::in_segment(Arc::clone(&segment), STOP_OFFSET),
            segment,
        })
    }

    fn counter(&self, counter: Counter) -> &AtomicU64 {
        // Safety: six u64 counters fit between COUNTERS_OFFSET and
        // CONTROL_LEN, and the offset is 8-byte aligned.
        unsafe { self.segment.at(COUNTERS_OFFSET + counter as usize * 8) }
    }

    pub fn bump(&self, counter: Counter, by: u64) {
        self.counter(counter).fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStats {
        let get = |c| self.counter(c).load(Ordering::Relaxed);
        WorkerStats {
            ticks: get(Counter::Ticks),
            processed: get(Counter::Processed),
            stale_inputs: get(Counter::StaleInputs),
            dropped_inputs: get(Counter::DroppedInputs),
            dropped_outputs: get(Counter::DroppedOutputs),
            unknown_commands: get(Counter::UnknownCommands),
        }
    }
}

/// Everything the controller and the worker share: three channels and the
/// control block.
pub(crate) struct Endpoints<I: Element, O: Element> {
    pub commands: Channel<CommandRecord>,
    pub inputs: Channel<Array<I>>,
    pub outputs: Channel<Array<O>>,
    pub control: ControlBlock,
}

impl<I: Element, O: Element> Endpoints<I, O> {
    pub fn allocate(
        manager: &SharedMemoryManager,
        input_example: &Array<I>,
        output_example: &Array<O>,
        capacity: usize,
    ) -> Result<Self> {
        Ok(Self {
            commands: Channel::create_from_example(
                manager,
                &CommandRecord::from(Command::Stop),
                capacity,
            )?,
            inputs: Channel::create_from_example(manager, input_example, capacity)?,
            outputs: Channel::create_from_example(manager, output_example, capacity)?,
            control: ControlBlock::allocate(manager)?,
        })
    }
}
