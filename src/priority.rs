// src/priority.rs

//! Scheduling priority of the agent's process group.
//!
//! The agent shares the device with the workload it observes, so it lowers
//! its own group's priority at startup. Task scripts inherit it.

use std::io;

use tracing::{info, warn};

/// Set the niceness of process group `pgid` (0 = the caller's group).
#[cfg(unix)]
pub fn renice_group(pgid: u32, nice: i32) -> io::Result<()> {
    // SAFETY: setpriority(2) has no memory-safety preconditions.
    let rc = unsafe { libc::setpriority(libc::PRIO_PGRP, pgid as libc::id_t, nice) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn renice_group(_pgid: u32, _nice: i32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process priorities are not supported on this platform",
    ))
}

/// Apply `nice` to the agent's own process group. Failure is logged and the
/// agent keeps running at its inherited priority.
pub fn lower_own_priority(nice: i32) {
    match renice_group(0, nice) {
        Ok(()) => info!(nice, "process group priority set"),
        Err(e) => warn!(nice, error = %e, "cannot change process group priority"),
    }
}
