use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fleet_agent::engine::{RunnerId, RuntimeEvent};
use fleet_agent::errors::Result;
use fleet_agent::exec::{JobBackend, RunnerHandle};
use fleet_agent::model::JobConfig;

/// A fake job backend that:
/// - records every `JobConfig` it was asked to start
/// - spawns an idle runner per job that waits for cancellation and then
///   reports `RunnerStopped`, like a real runner.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    started: Arc<Mutex<Vec<(RunnerId, JobConfig)>>>,
    stopped: Arc<Mutex<Vec<RunnerId>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs started so far, in start order.
    pub fn started(&self) -> Vec<JobConfig> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cfg)| cfg.clone())
            .collect()
    }

    /// Runners whose fake task observed cancellation.
    pub fn stopped(&self) -> Vec<RunnerId> {
        self.stopped.lock().unwrap().clone()
    }

    /// Number of started runners that have not been stopped yet.
    pub fn live(&self) -> usize {
        self.started.lock().unwrap().len() - self.stopped.lock().unwrap().len()
    }
}

impl JobBackend for RecordingBackend {
    fn start_job(
        &mut self,
        id: RunnerId,
        config: JobConfig,
        events: mpsc::Sender<RuntimeEvent>,
    ) -> Result<RunnerHandle> {
        let kind = config.kind;
        self.started.lock().unwrap().push((id, config));

        let cancel = CancellationToken::new();
        let stopped = Arc::clone(&self.stopped);
        let join = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                cancel.cancelled().await;
                stopped.lock().unwrap().push(id);
                let _ = events
                    .send(RuntimeEvent::RunnerStopped { runner: id, kind })
                    .await;
            }
        });

        Ok(RunnerHandle::new(kind, cancel, join))
    }
}
