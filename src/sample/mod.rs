// src/sample/mod.rs

//! OS statistics sampling used by the periodic collectors.
//!
//! Sampling walks the process table and is blocking I/O, so it always runs
//! on the blocking pool, never on the reactor thread. A sampler only
//! produces immutable snapshots; merging them is the reactor's job.

use crate::errors::Result;
use crate::telemetry::{CpuSnapshot, MemSnapshot};

pub mod procfs;

pub use procfs::ProcfsSampler;

/// Source of CPU and memory snapshots.
pub trait StatSampler: Send + Sync {
    /// Per-core and per-process CPU usage since the previous call.
    fn sample_top(&self) -> Result<CpuSnapshot>;

    /// Per-process memory breakdown plus the system memory summary.
    fn sample_smaps(&self) -> Result<MemSnapshot>;
}
