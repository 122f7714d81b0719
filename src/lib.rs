//! shm-worker - run a computation in its own process, fed through shared
//! memory.
//!
//! The controller allocates bounded channels from a [`SharedMemoryManager`],
//! forks a [`Worker`] that runs a [`Computation`] on the latest input of
//! every tick, and exchanges fixed-shape [`Array`] payloads with it without
//! ever blocking on a full or empty channel.

pub mod config;
pub mod error;
pub mod interrupt;
pub mod logging;
pub mod payload;
pub mod shm;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use interrupt::Interrupt;
pub use payload::{Array, DType, Element, Layout};
pub use shm::{Channel, ChannelError, SharedMemoryManager, SignalFlag};
pub use worker::{Computation, Doubler, Session, TerminationReason, Worker, WorkerStats};
