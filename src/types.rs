// src/types.rs

//! Small shared enums used across the engine, executors and wire messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task as reported to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Running,
    Succeed,
    Failed,
}

/// Agent-level state announced on every (re)connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    Idle,
    Running,
}

/// Why a task was ended.
///
/// Only `NoError` maps to [`TaskStatus::Succeed`]; everything else is a
/// failure. A deadline expiring is a normal end and uses `NoError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskErrorCode {
    NoError,
    MultiTask,
}

impl TaskErrorCode {
    pub fn is_success(self) -> bool {
        matches!(self, TaskErrorCode::NoError)
    }
}

impl fmt::Display for TaskErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskErrorCode::NoError => f.write_str("NO_ERROR"),
            TaskErrorCode::MultiTask => f.write_str("MULTI_TASK"),
        }
    }
}

/// Kind of scheduled activity a job runner drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    SpawnChild,
    CollectTop,
    CollectSmap,
    CrashScan,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobType::SpawnChild => "spawn_child",
            JobType::CollectTop => "collect_top",
            JobType::CollectSmap => "collect_smap",
            JobType::CrashScan => "crash_scan",
        };
        f.write_str(s)
    }
}

/// Scheduling state of a job runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running,
    Stopped,
}

/// Result of asking a runner to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    /// Cancellation was requested; the runner reports `RunnerStopped` once
    /// its executor has torn down.
    Requested,
    /// The runner had already finished on its own (or was already asked to
    /// stop). Treated as success.
    AlreadyStopped,
}
