// src/engine/mod.rs

//! Task orchestration engine.
//!
//! This module ties together:
//! - the single active task and its conflict policy
//! - the telemetry aggregate and its flush cadence
//! - the task deadline
//! - the job runners spawned for a task
//!
//! The pure orchestrator state machine lives in [`core`]; the async reactor
//! shell that owns timers, runners and the transport is in [`runtime`].

use std::time::Duration;

use crate::identity::DeviceIdentity;
use crate::model::{JobPlan, Task};
use crate::telemetry::Sample;
use crate::transport::TransportEvent;
use crate::types::JobType;

/// Identifier assigned to each job runner by the reactor.
pub type RunnerId = u64;

/// Default period between telemetry flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5000);

/// Options fixed for the lifetime of the orchestrator.
#[derive(Debug, Clone)]
pub struct CoreOptions {
    /// Drop telemetry on flush instead of sending it.
    pub disable_upload: bool,
    pub flush_interval: Duration,
    pub plan: JobPlan,
    pub identity: DeviceIdentity,
}

/// Events flowing into the reactor from the transport, runners and timers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Inbound frame or connectivity change.
    Transport(TransportEvent),
    /// Task loaded from the local descriptor at startup.
    TaskBootstrapped(Task),
    /// A collector finished a sampling pass.
    SampleCollected(Sample),
    /// A job runner reached `Stopped` and can be pruned.
    RunnerStopped { runner: RunnerId, kind: JobType },
    /// Telemetry flush timer fired.
    FlushTick,
    /// Task deadline timer fired.
    TaskDeadline,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
