// src/exec/mod.rs

//! Job execution layer.
//!
//! This module is responsible for actually running the jobs of a task, and
//! reporting back to the reactor via `RuntimeEvent`s.
//!
//! - [`executor`] defines the `Executor` capability every variant implements.
//! - [`runner`] owns the repeat/stop state machine around one executor.
//! - [`child_process`] runs the task script as a supervised subprocess.
//! - [`collector`] samples CPU and memory statistics on the blocking pool.
//! - [`crash_scan`] triggers harvest passes on the harvester thread.
//! - [`backend`] provides the `JobBackend` trait and a concrete
//!   `RealJobBackend` that the reactor uses in production, and which tests
//!   can replace with a fake implementation.

pub mod backend;
pub mod child_process;
pub mod collector;
pub mod crash_scan;
pub mod executor;
pub mod runner;

pub use backend::{JobBackend, RealJobBackend};
pub use executor::{ExecFuture, ExecOutcome, Executor};
pub use runner::{JobRunner, RunnerHandle};
