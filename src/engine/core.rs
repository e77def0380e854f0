// src/engine/core.rs

//! Pure orchestrator state machine.
//!
//! Consumes [`RuntimeEvent`]s and produces:
//! - an updated orchestrator state (active task, telemetry aggregate)
//! - a list of commands describing what the reactor shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels and timers
//! - starting and stopping job runners
//! - handing encoded messages to the transport
//!
//! Nothing here touches Tokio, sockets or processes, so the task policy can
//! be unit tested deterministically.

use tracing::debug;

use crate::engine::event_handlers::{
    handle_deadline, handle_flush, handle_sample, handle_shutdown, handle_start,
    handle_transport_event, CoreStep,
};
use crate::engine::{CoreOptions, RuntimeEvent};
use crate::model::Task;
use crate::telemetry::TelemetryAggregate;

/// Mutable orchestrator state. Only ever touched from the reactor.
#[derive(Debug)]
pub struct OrchestratorState {
    pub task: Option<Task>,
    pub telemetry: TelemetryAggregate,
}

#[derive(Debug)]
pub struct CoreRuntime {
    state: OrchestratorState,
    options: CoreOptions,
}

impl CoreRuntime {
    pub fn new(options: CoreOptions) -> Self {
        Self {
            state: OrchestratorState {
                task: None,
                telemetry: TelemetryAggregate::default(),
            },
            options,
        }
    }

    pub fn active_task(&self) -> Option<&Task> {
        self.state.task.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryAggregate {
        &self.state.telemetry
    }

    pub fn options(&self) -> &CoreOptions {
        &self.options
    }

    /// Handle a single event at wall-clock time `now_ms`, updating state and
    /// returning the commands for the reactor shell.
    pub fn step(&mut self, event: RuntimeEvent, now_ms: u64) -> CoreStep {
        match event {
            RuntimeEvent::Transport(ev) => {
                handle_transport_event(&mut self.state, &self.options, ev, now_ms)
            }
            RuntimeEvent::TaskBootstrapped(task) => {
                handle_start(&mut self.state, &self.options, task, now_ms)
            }
            RuntimeEvent::SampleCollected(sample) => handle_sample(&mut self.state, sample),
            RuntimeEvent::FlushTick => handle_flush(&mut self.state, &self.options, now_ms),
            RuntimeEvent::TaskDeadline => handle_deadline(&mut self.state),
            RuntimeEvent::RunnerStopped { runner, kind } => {
                // Pruning is done by the shell; the task outcome does not
                // depend on individual runners.
                debug!(runner, job = %kind, "runner stopped");
                CoreStep::idle()
            }
            RuntimeEvent::ShutdownRequested => handle_shutdown(&self.state),
        }
    }
}
