// src/engine/event_handlers.rs

//! Event handling logic for the orchestrator core.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::engine::core::OrchestratorState;
use crate::engine::CoreOptions;
use crate::message::{
    CommandKind, DeviceStatusReport, InboundMessage, OutboundMessage, TaskCommand,
    TaskStatusReport,
};
use crate::model::{JobConfig, Task};
use crate::telemetry::{Sample, TelemetryAggregate};
use crate::transport::TransportEvent;
use crate::types::{DeviceState, TaskErrorCode, TaskStatus};

/// Command produced by the pure core, to be executed by the reactor shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Create and start one runner per config, in order.
    StartJobs(Vec<JobConfig>),
    /// Stop every task runner and clear the runner set.
    StopJobs,
    /// Arm the repeating flush timer and the one-shot deadline timer.
    ArmTimers {
        flush_every: Duration,
        deadline: Duration,
    },
    /// Cancel both task timers.
    DisarmTimers,
    /// Serialize and hand a message to the transport.
    Send(OutboundMessage),
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the reactor loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn idle() -> Self {
        Self::run(Vec::new())
    }

    fn run(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Handle a transport event: inbound frame or connectivity change.
pub fn handle_transport_event(
    state: &mut OrchestratorState,
    options: &CoreOptions,
    event: TransportEvent,
    now_ms: u64,
) -> CoreStep {
    match event {
        TransportEvent::Connected => CoreStep::run(vec![CoreCommand::Send(device_status(
            state, options, now_ms,
        ))]),
        TransportEvent::Disconnected => {
            warn!("transport disconnected");
            CoreStep::idle()
        }
        TransportEvent::Message(frame) => match InboundMessage::decode(&frame) {
            Ok(InboundMessage::TaskCommand(cmd)) => {
                handle_task_command(state, options, cmd, now_ms)
            }
            Ok(InboundMessage::Unknown) => {
                warn!(%frame, "unknown message type, ignored");
                CoreStep::idle()
            }
            Err(err) => {
                error!(error = %err, "cannot decode inbound message, ignored");
                CoreStep::idle()
            }
        },
    }
}

/// Handle a decoded task command.
pub fn handle_task_command(
    state: &mut OrchestratorState,
    options: &CoreOptions,
    cmd: TaskCommand,
    now_ms: u64,
) -> CoreStep {
    match cmd.command {
        CommandKind::Start => {
            let task = Task::from_command(&cmd, now_ms);
            handle_start(state, options, task, now_ms)
        }
        CommandKind::Cancel => {
            if state.task.is_none() {
                warn!(task_id = cmd.task_id, "cancel without an active task, ignored");
                return CoreStep::idle();
            }
            info!(task_id = cmd.task_id, "cancel task");
            CoreStep::run(end_task(state, TaskErrorCode::NoError))
        }
        CommandKind::Other => {
            warn!(task_id = cmd.task_id, "unsupported task command, ignored");
            CoreStep::idle()
        }
    }
}

/// Activate `task`, applying the single-task conflict policy.
///
/// - Same id as the active task: already running, ignored.
/// - Different id while a task is active: the active task ends as
///   `MULTI_TASK` and the new task is reported `FAILED` without ever being
///   activated.
/// - No active task: the task becomes active and its jobs and timers start.
pub fn handle_start(
    state: &mut OrchestratorState,
    options: &CoreOptions,
    task: Task,
    now_ms: u64,
) -> CoreStep {
    info!(task_id = task.id, shell_id = task.shell_id, "start new task");

    if let Some(active) = &state.task {
        if active.id == task.id {
            warn!(task_id = task.id, "task is already running, start ignored");
            return CoreStep::idle();
        }

        let message = format!("multi task {}, {}", active.id, task.id);
        warn!(active = active.id, rejected = task.id, "{message}");

        let mut commands = end_task(state, TaskErrorCode::MultiTask);
        commands.push(CoreCommand::Send(OutboundMessage::TaskStatus(
            TaskStatusReport {
                task_id: task.id,
                shell_id: task.shell_id,
                timestamp: now_ms,
                status: TaskStatus::Failed,
                message,
            },
        )));
        return CoreStep::run(commands);
    }

    let jobs = options.plan.jobs_for(&task);
    let deadline = task.timeout;
    state.task = Some(task);
    state.telemetry = TelemetryAggregate::new(now_ms / 1000);

    CoreStep::run(vec![
        CoreCommand::StartJobs(jobs),
        CoreCommand::ArmTimers {
            flush_every: options.flush_interval,
            deadline,
        },
    ])
}

/// End the active task with `code`.
///
/// Idempotent: with no active task this only logs. Otherwise the returned
/// commands disarm the timers, stop every runner and report the final
/// status, and the task slot is cleared.
///
/// The report carries the task's scheduled end time, not the time it ended.
pub fn end_task(state: &mut OrchestratorState, code: TaskErrorCode) -> Vec<CoreCommand> {
    let message = format!("end task with code: {code}");
    let Some(mut task) = state.task.take() else {
        error!(%code, "stop requested but no task is running, ignored");
        return Vec::new();
    };

    info!(task_id = task.id, %code, "ending task");
    task.status = if code.is_success() {
        TaskStatus::Succeed
    } else {
        TaskStatus::Failed
    };

    vec![
        CoreCommand::DisarmTimers,
        CoreCommand::StopJobs,
        CoreCommand::Send(OutboundMessage::TaskStatus(TaskStatusReport {
            task_id: task.id,
            shell_id: task.shell_id,
            timestamp: task.scheduled_at_ms,
            status: task.status,
            message,
        })),
    ]
}

/// The deadline is a normal end of the task, not a failure.
pub fn handle_deadline(state: &mut OrchestratorState) -> CoreStep {
    info!("task deadline reached");
    CoreStep::run(end_task(state, TaskErrorCode::NoError))
}

/// Flush the current aggregate and start a fresh generation.
pub fn handle_flush(
    state: &mut OrchestratorState,
    options: &CoreOptions,
    now_ms: u64,
) -> CoreStep {
    if state.task.is_none() {
        debug!("flush tick without an active task, ignored");
        return CoreStep::idle();
    }

    let generation =
        std::mem::replace(&mut state.telemetry, TelemetryAggregate::new(now_ms / 1000));

    if options.disable_upload {
        info!("telemetry upload is disabled, dropping collected data");
        return CoreStep::idle();
    }

    debug!(
        cores = generation.cpu.cores.len(),
        processes = generation.cpu.processes.len(),
        "sending collected data"
    );
    CoreStep::run(vec![CoreCommand::Send(OutboundMessage::CollectData(
        generation,
    ))])
}

/// Merge a finished sample if it belongs to the active task.
pub fn handle_sample(state: &mut OrchestratorState, sample: Sample) -> CoreStep {
    match &state.task {
        Some(task) if task.id == sample.task_id => state.telemetry.merge(sample),
        _ => debug!(task_id = sample.task_id, "sample for inactive task dropped"),
    }
    CoreStep::idle()
}

/// Stop everything and leave the reactor loop.
pub fn handle_shutdown(state: &OrchestratorState) -> CoreStep {
    info!(
        active_task = state.task.as_ref().map(|t| t.id),
        "shutdown requested"
    );
    CoreStep {
        commands: vec![CoreCommand::DisarmTimers, CoreCommand::StopJobs],
        keep_running: false,
    }
}

fn device_status(
    state: &OrchestratorState,
    options: &CoreOptions,
    now_ms: u64,
) -> OutboundMessage {
    let (status, shell_id) = match &state.task {
        Some(task) => (DeviceState::Running, task.shell_id),
        None => (DeviceState::Idle, 0),
    };
    info!(?status, shell_id, "connected, reporting device status");
    OutboundMessage::DeviceStatus(DeviceStatusReport {
        timestamp: now_ms,
        sn: options.identity.serial.clone(),
        version: options.identity.firmware_version.clone(),
        status,
        shell_id,
    })
}
