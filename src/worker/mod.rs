//! Worker process supervision.
//!
//! A [`Worker`] owns one forked process that runs a [`Computation`] in a
//! polling loop. The controller and the worker talk only through shared
//! memory:
//!
//! ```text
//!   controller                                  worker process
//!  ┌──────────────┐   commands (Stop)   ┌──────────────────────────┐
//!  │              │ ──────────────────► │  tick:                   │
//!  │   Worker     │   inputs            │   1. drain commands      │
//!  │   handle     │ ──────────────────► │   2. keep latest input   │
//!  │              │   outputs           │   3. update() → output   │
//!  │              │ ◄────────────────── │   4. set ready (once)    │
//!  │              │   ready / stop      │   5. sleep poll_interval │
//!  │              │ ◄────────────────── │                          │
//!  └──────────────┘                     └──────────────────────────┘
//! ```
//!
//! Puts and gets never block. A full channel drops the new item; an empty
//! one yields nothing. Only `start(true)` (bounded by `launch_timeout`) and
//! `stop(true)` wait.

mod compute;
mod control;
mod handle;
mod proc;
mod protocol;
mod run_loop;
mod signals;
mod spawn;

pub use compute::{Computation, Doubler};
pub use control::WorkerStats;
pub use handle::{Session, Worker};
pub use protocol::{Command, CommandRecord};
pub use run_loop::{LoopState, TickOutcome};
pub use signals::{TerminationReason, analyze_wait_status};
pub use spawn::{EXIT_FAILED, EXIT_OK, EXIT_PANICKED};
