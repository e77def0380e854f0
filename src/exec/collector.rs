// src/exec/collector.rs

//! Periodic stat collectors (CPU top and memory maps).
//!
//! Each invocation runs one sampling pass on the blocking pool and returns
//! the snapshot as [`ExecOutcome::Sampled`]; the runner forwards it to the
//! reactor, which is the only place the aggregate is touched.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::now_secs;
use crate::sample::StatSampler;
use crate::telemetry::{Sample, SampleBody};

use super::executor::{ExecFuture, ExecOutcome, Executor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectKind {
    Top,
    Smap,
}

pub struct CollectExecutor {
    kind: CollectKind,
    task_id: i64,
    sampler: Arc<dyn StatSampler>,
}

impl CollectExecutor {
    pub fn new(kind: CollectKind, task_id: i64, sampler: Arc<dyn StatSampler>) -> Self {
        Self {
            kind,
            task_id,
            sampler,
        }
    }

    async fn collect(&self, cancel: &CancellationToken) -> ExecOutcome {
        let sampler = Arc::clone(&self.sampler);
        let kind = self.kind;
        let mut unit = tokio::task::spawn_blocking(move || match kind {
            CollectKind::Top => sampler.sample_top().map(SampleBody::Cpu),
            CollectKind::Smap => sampler.sample_smaps().map(SampleBody::Mem),
        });

        let joined = tokio::select! {
            res = &mut unit => res,
            _ = cancel.cancelled() => {
                // Only a unit that has not started yet is actually cancelled;
                // a running one finishes and its sample is handed back.
                unit.abort();
                match unit.await {
                    Ok(Ok(body)) => Ok(Ok(body)),
                    _ => {
                        debug!(task_id = self.task_id, ?kind, "collection cancelled");
                        return ExecOutcome::Cancelled;
                    }
                }
            }
        };

        match joined {
            Ok(Ok(body)) => ExecOutcome::Sampled(Sample {
                task_id: self.task_id,
                taken_at: now_secs(),
                body,
            }),
            Ok(Err(e)) => {
                // Transient: a later pass may succeed.
                warn!(task_id = self.task_id, ?kind, error = %e, "sampling failed");
                ExecOutcome::Completed
            }
            Err(e) => ExecOutcome::Failed(format!("sampling unit panicked: {e}")),
        }
    }
}

impl Executor for CollectExecutor {
    fn name(&self) -> &'static str {
        match self.kind {
            CollectKind::Top => "collect_top",
            CollectKind::Smap => "collect_smap",
        }
    }

    fn execute<'a>(&'a mut self, cancel: &'a CancellationToken) -> ExecFuture<'a> {
        Box::pin(self.collect(cancel))
    }
}
