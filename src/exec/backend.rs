// src/exec/backend.rs

//! Pluggable job backend abstraction.
//!
//! The reactor talks to a `JobBackend` instead of building executors itself.
//! This makes it easy to swap in a fake backend in tests while keeping the
//! production executors in this module's siblings.
//!
//! - `RealJobBackend` maps each [`JobType`] to its executor and spawns a
//!   [`JobRunner`] for it.
//! - Tests can provide their own `JobBackend` that, for example, records
//!   which jobs were started and hands out handles to idle fake runners.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::crash::HarvestHandle;
use crate::engine::{RunnerId, RuntimeEvent};
use crate::errors::{AgentError, Result};
use crate::model::JobConfig;
use crate::sample::StatSampler;
use crate::types::JobType;

use super::child_process::ChildProcessExecutor;
use super::collector::{CollectExecutor, CollectKind};
use super::crash_scan::CrashScanExecutor;
use super::executor::Executor;
use super::runner::{JobRunner, RunnerHandle};

/// Trait abstracting how job runners are created.
///
/// Production code uses [`RealJobBackend`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait JobBackend: Send {
    /// Create and start a runner for `config`.
    ///
    /// The runner must report `RuntimeEvent::RunnerStopped { runner: id, .. }`
    /// on `events` when it reaches `Stopped`.
    fn start_job(
        &mut self,
        id: RunnerId,
        config: JobConfig,
        events: mpsc::Sender<RuntimeEvent>,
    ) -> Result<RunnerHandle>;
}

/// Real job backend used in production.
pub struct RealJobBackend {
    sampler: Arc<dyn StatSampler>,
    script_dir: PathBuf,
    kill_grace: Duration,
    harvester: Option<HarvestHandle>,
}

impl RealJobBackend {
    pub fn new(
        sampler: Arc<dyn StatSampler>,
        script_dir: PathBuf,
        kill_grace: Duration,
        harvester: Option<HarvestHandle>,
    ) -> Self {
        Self {
            sampler,
            script_dir,
            kill_grace,
            harvester,
        }
    }

    fn executor_for(&self, config: &JobConfig) -> Result<Box<dyn Executor>> {
        let task = config.task;
        let task_id = task.map(|t| t.id).unwrap_or_default();

        let executor: Box<dyn Executor> = match config.kind {
            JobType::SpawnChild => {
                let task = task.ok_or_else(|| {
                    AgentError::Config("spawn_child job without an owning task".into())
                })?;
                let script = config.payload.clone().unwrap_or_default();
                Box::new(ChildProcessExecutor::new(
                    task,
                    script,
                    self.script_dir.clone(),
                    self.kill_grace,
                ))
            }
            JobType::CollectTop => Box::new(CollectExecutor::new(
                CollectKind::Top,
                task_id,
                Arc::clone(&self.sampler),
            )),
            JobType::CollectSmap => Box::new(CollectExecutor::new(
                CollectKind::Smap,
                task_id,
                Arc::clone(&self.sampler),
            )),
            JobType::CrashScan => {
                let harvester = self.harvester.clone().ok_or_else(|| {
                    AgentError::Config("crash_scan job without a harvester".into())
                })?;
                Box::new(CrashScanExecutor::new(harvester))
            }
        };
        Ok(executor)
    }
}

impl JobBackend for RealJobBackend {
    fn start_job(
        &mut self,
        id: RunnerId,
        config: JobConfig,
        events: mpsc::Sender<RuntimeEvent>,
    ) -> Result<RunnerHandle> {
        let executor = self.executor_for(&config)?;
        Ok(JobRunner::new(id, config, executor, events).spawn())
    }
}
