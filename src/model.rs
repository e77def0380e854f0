// src/model.rs

//! Task and job descriptions owned by the orchestrator.

use std::time::Duration;

use serde::Deserialize;

use crate::message::TaskCommand;
use crate::types::{JobType, TaskStatus};

/// How long a task runs when the server (or the local descriptor) gives no
/// end timestamp.
pub const DEFAULT_TASK_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// The single remote-issued unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: i64,
    pub shell_id: u32,
    pub shell_content: String,
    pub shell_type: String,
    /// Scheduled end, epoch milliseconds. 0 means "now + 24h".
    pub scheduled_at_ms: u64,
    /// Time until the deadline timer forces the task to end.
    pub timeout: Duration,
    pub status: TaskStatus,
}

impl Task {
    /// Build a task from a START command received at `now_ms`.
    pub fn from_command(cmd: &TaskCommand, now_ms: u64) -> Self {
        Self::new(
            cmd.task_id,
            cmd.shell_id,
            cmd.shell_content.clone(),
            cmd.shell_type.clone(),
            cmd.timestamp,
            now_ms,
        )
    }

    /// Build a task from the local bootstrap descriptor.
    pub fn from_local(desc: LocalTaskDescriptor, now_ms: u64) -> Self {
        Self::new(
            desc.id,
            desc.shell_id,
            desc.shell,
            desc.shell_type,
            desc.timestamp,
            now_ms,
        )
    }

    fn new(
        id: i64,
        shell_id: u32,
        shell_content: String,
        shell_type: String,
        timestamp_ms: u64,
        now_ms: u64,
    ) -> Self {
        let (scheduled_at_ms, timeout) = if timestamp_ms == 0 {
            let timeout = DEFAULT_TASK_DURATION;
            (now_ms + timeout.as_millis() as u64, timeout)
        } else {
            (
                timestamp_ms,
                Duration::from_millis(timestamp_ms.saturating_sub(now_ms)),
            )
        };

        Self {
            id,
            shell_id,
            shell_content,
            shell_type,
            scheduled_at_ms,
            timeout,
            status: TaskStatus::Running,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            id: self.id,
            shell_id: self.shell_id,
        }
    }
}

/// Lightweight back-reference from a job to the task that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub id: i64,
    pub shell_id: u32,
}

/// Local task JSON used for offline bootstrapping (`--task-json`).
///
/// ```json
/// {"id": 7, "type": "START", "shellId": 3, "shell": "echo hi",
///  "shellType": "sh", "timestamp": 0}
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalTaskDescriptor {
    pub id: i64,
    #[serde(default, rename = "type")]
    pub kind: String,
    pub shell_id: u32,
    pub shell: String,
    #[serde(default)]
    pub shell_type: String,
    #[serde(default)]
    pub timestamp: u64,
}

/// Immutable description of one scheduled activity.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub kind: JobType,
    pub enabled: bool,
    pub repeat: bool,
    /// Per-invocation budget; zero means unbounded.
    pub timeout: Duration,
    /// Pause between invocations when repeating.
    pub interval: Duration,
    /// Opaque data for the executor (the script body for `SpawnChild`).
    pub payload: Option<String>,
    /// Owning task; `None` for background jobs such as crash scanning.
    pub task: Option<TaskKey>,
}

/// Periods used when fanning a task out into jobs.
///
/// The memory walk is paced by the sampler's per-process sleep, so its
/// length grows with the process count; it has no per-invocation timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPlan {
    pub top_interval: Duration,
    pub top_timeout: Duration,
    pub smap_interval: Duration,
    pub smap_timeout: Duration,
}

impl Default for JobPlan {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(5000))
    }
}

impl JobPlan {
    /// Plan for the configured collection periods. A CPU pass may take up
    /// to two periods before it is abandoned.
    pub fn new(top_interval: Duration, smap_interval: Duration) -> Self {
        Self {
            top_interval,
            top_timeout: top_interval * 2,
            smap_interval,
            smap_timeout: Duration::ZERO,
        }
    }

    /// Jobs started for a freshly activated task, in start order.
    pub fn jobs_for(&self, task: &Task) -> Vec<JobConfig> {
        let key = Some(task.key());
        vec![
            JobConfig {
                kind: JobType::SpawnChild,
                enabled: true,
                repeat: true,
                timeout: Duration::ZERO,
                interval: Duration::ZERO,
                payload: Some(task.shell_content.clone()),
                task: key,
            },
            JobConfig {
                kind: JobType::CollectTop,
                enabled: true,
                repeat: true,
                timeout: self.top_timeout,
                interval: self.top_interval,
                payload: None,
                task: key,
            },
            JobConfig {
                kind: JobType::CollectSmap,
                enabled: true,
                repeat: true,
                timeout: self.smap_timeout,
                interval: self.smap_interval,
                payload: None,
                task: key,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CommandKind;

    fn start(timestamp: u64) -> TaskCommand {
        TaskCommand {
            command: CommandKind::Start,
            task_id: 9,
            shell_id: 2,
            shell_content: "echo hi".into(),
            shell_type: "sh".into(),
            timestamp,
        }
    }

    #[test]
    fn zero_timestamp_runs_for_a_day() {
        let task = Task::from_command(&start(0), 1_000);
        assert_eq!(task.timeout, DEFAULT_TASK_DURATION);
        assert_eq!(task.scheduled_at_ms, 1_000 + 86_400_000);
        assert_eq!(task.status, TaskStatus::Running);
    }

    #[test]
    fn explicit_timestamp_sets_deadline_from_now() {
        let task = Task::from_command(&start(11_000), 1_000);
        assert_eq!(task.timeout, Duration::from_millis(10_000));

        let late = Task::from_command(&start(500), 1_000);
        assert_eq!(late.timeout, Duration::ZERO);
    }

    #[test]
    fn fan_out_order_and_periods() {
        let task = Task::from_command(&start(0), 0);
        let jobs = JobPlan::default().jobs_for(&task);
        let kinds: Vec<_> = jobs.iter().map(|j| j.kind).collect();
        assert_eq!(
            kinds,
            vec![JobType::SpawnChild, JobType::CollectTop, JobType::CollectSmap]
        );
        assert!(jobs.iter().all(|j| j.repeat && j.enabled));
        assert_eq!(jobs[0].interval, Duration::ZERO);
        assert_eq!(jobs[0].payload.as_deref(), Some("echo hi"));
        assert_eq!(jobs[1].interval, Duration::from_millis(1000));
        assert_eq!(jobs[2].interval, Duration::from_millis(5000));
        assert_eq!(jobs[2].timeout, Duration::ZERO);
    }

    #[test]
    fn plan_timeouts_follow_intervals() {
        let plan = JobPlan::new(Duration::from_millis(700), Duration::from_secs(30));
        assert_eq!(plan.top_timeout, Duration::from_millis(1400));
        assert_eq!(plan.smap_timeout, Duration::ZERO);
        assert_eq!(plan.smap_interval, Duration::from_secs(30));
    }
}
