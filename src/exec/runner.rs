// src/exec/runner.rs

//! Job runner: drives one executor through repeated invocations.
//!
//! State machine:
//! - `Idle` until spawned
//! - `Running` while invocations are being scheduled
//! - `Stopped` after a non-repeating completion, a failure or a stop request
//!
//! The runner never holds more than one outstanding invocation. When it
//! reaches `Stopped` it sends [`RuntimeEvent::RunnerStopped`] so the reactor
//! can prune it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{RunnerId, RuntimeEvent};
use crate::model::JobConfig;
use crate::types::{JobType, RunnerState, StopStatus};

use super::executor::{ExecOutcome, Executor};

pub struct JobRunner {
    id: RunnerId,
    config: JobConfig,
    executor: Box<dyn Executor>,
    events: mpsc::Sender<RuntimeEvent>,
    state: RunnerState,
}

impl JobRunner {
    pub fn new(
        id: RunnerId,
        config: JobConfig,
        executor: Box<dyn Executor>,
        events: mpsc::Sender<RuntimeEvent>,
    ) -> Self {
        Self {
            id,
            config,
            executor,
            events,
            state: RunnerState::Idle,
        }
    }

    /// Start the runner on the current Tokio runtime.
    pub fn spawn(self) -> RunnerHandle {
        let cancel = CancellationToken::new();
        let kind = self.config.kind;
        let join = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                self.run(cancel).await;
            }
        });
        RunnerHandle::new(kind, cancel, join)
    }

    /// Run invocations until the job is done or `cancel` fires.
    ///
    /// Returns the final state, which is always `Stopped`.
    pub async fn run(mut self, cancel: CancellationToken) -> RunnerState {
        let runner = self.id;
        let job = self.config.kind;

        if !self.config.enabled {
            debug!(runner, %job, "job disabled; not starting");
            return self.finish().await;
        }

        self.state = RunnerState::Running;
        info!(runner, %job, executor = self.executor.name(), "job runner started");

        let mut invocations: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let outcome = self.invoke(&cancel).await;
            invocations += 1;

            match outcome {
                ExecOutcome::Completed => {
                    debug!(runner, %job, invocations, "invocation completed");
                }
                ExecOutcome::Sampled(sample) => {
                    if self
                        .events
                        .send(RuntimeEvent::SampleCollected(sample))
                        .await
                        .is_err()
                    {
                        debug!(runner, %job, "reactor gone; stopping");
                        break;
                    }
                }
                ExecOutcome::TimedOut => {
                    warn!(
                        runner,
                        %job,
                        timeout_ms = self.config.timeout.as_millis() as u64,
                        "invocation timed out"
                    );
                }
                ExecOutcome::Cancelled => {
                    debug!(runner, %job, "invocation cancelled");
                    break;
                }
                ExecOutcome::Failed(reason) => {
                    error!(runner, %job, %reason, "invocation failed; stopping job");
                    break;
                }
            }

            if !self.config.repeat {
                break;
            }

            if !pause(self.config.interval, &cancel).await {
                break;
            }
        }

        self.finish().await
    }

    /// Run one invocation under the per-invocation timeout, if any.
    async fn invoke(&mut self, cancel: &CancellationToken) -> ExecOutcome {
        let token = cancel.child_token();
        let timeout = self.config.timeout;
        let mut fut = self.executor.execute(&token);

        if timeout.is_zero() {
            return fut.await;
        }

        tokio::select! {
            outcome = &mut fut => outcome,
            _ = tokio::time::sleep(timeout) => {
                token.cancel();
                // Teardown still has to finish. A sample produced meanwhile
                // is still valid and is kept.
                match fut.await {
                    ExecOutcome::Sampled(sample) => {
                        debug!(runner = self.id, job = %self.config.kind, "late sample kept");
                        ExecOutcome::Sampled(sample)
                    }
                    _ if cancel.is_cancelled() => ExecOutcome::Cancelled,
                    _ => ExecOutcome::TimedOut,
                }
            }
        }
    }

    async fn finish(mut self) -> RunnerState {
        self.state = RunnerState::Stopped;
        info!(runner = self.id, job = %self.config.kind, "job runner stopped");
        let _ = self
            .events
            .send(RuntimeEvent::RunnerStopped {
                runner: self.id,
                kind: self.config.kind,
            })
            .await;
        self.state
    }
}

/// Wait `interval` before the next invocation. Returns `false` if the runner
/// was cancelled meanwhile.
async fn pause(interval: Duration, cancel: &CancellationToken) -> bool {
    if interval.is_zero() {
        tokio::task::yield_now().await;
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}

/// Reactor-side handle to a spawned runner.
#[derive(Debug)]
pub struct RunnerHandle {
    kind: JobType,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl RunnerHandle {
    /// Wrap an already spawned runner task. Test backends use this to hand
    /// out handles for fake runners.
    pub fn new(kind: JobType, cancel: CancellationToken, join: JoinHandle<()>) -> Self {
        Self { kind, cancel, join }
    }

    pub fn kind(&self) -> JobType {
        self.kind
    }

    /// Request orderly cancellation. Idempotent.
    ///
    /// A runner that already finished on its own (or was already asked to
    /// stop) yields [`StopStatus::AlreadyStopped`], which callers treat as
    /// success.
    pub fn stop(&self) -> StopStatus {
        if self.join.is_finished() || self.cancel.is_cancelled() {
            return StopStatus::AlreadyStopped;
        }
        self.cancel.cancel();
        StopStatus::Requested
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the runner task to end.
    pub async fn wait(self) -> Result<(), JoinError> {
        self.join.await
    }

    /// Handle used to give up on a runner that did not tear down in time.
    pub fn abort_handle(&self) -> AbortHandle {
        self.join.abort_handle()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::exec::executor::ExecFuture;
    use crate::telemetry::{CpuSnapshot, Sample, SampleBody};

    /// Executor replaying a fixed script of outcomes, then blocking until
    /// cancelled.
    struct Scripted {
        outcomes: VecDeque<ExecOutcome>,
        calls: Arc<AtomicUsize>,
        hang: Duration,
    }

    impl Scripted {
        fn new(outcomes: Vec<ExecOutcome>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    outcomes: outcomes.into(),
                    calls: calls.clone(),
                    hang: Duration::ZERO,
                },
                calls,
            )
        }
    }

    impl Executor for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn execute<'a>(&'a mut self, cancel: &'a CancellationToken) -> ExecFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.hang.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return ExecOutcome::Cancelled,
                        _ = tokio::time::sleep(self.hang) => {}
                    }
                }
                match self.outcomes.pop_front() {
                    Some(outcome) => outcome,
                    None => {
                        cancel.cancelled().await;
                        ExecOutcome::Cancelled
                    }
                }
            })
        }
    }

    fn config(repeat: bool, interval_ms: u64, timeout_ms: u64) -> JobConfig {
        JobConfig {
            kind: JobType::CollectTop,
            enabled: true,
            repeat,
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(interval_ms),
            payload: None,
            task: None,
        }
    }

    fn sample() -> Sample {
        Sample {
            task_id: 1,
            taken_at: 0,
            body: SampleBody::Cpu(CpuSnapshot::default()),
        }
    }

    async fn next_stopped(rx: &mut mpsc::Receiver<RuntimeEvent>) -> RunnerId {
        loop {
            match rx.recv().await {
                Some(RuntimeEvent::RunnerStopped { runner, .. }) => return runner,
                Some(_) => continue,
                None => panic!("channel closed before RunnerStopped"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_job_stops_without_invoking() {
        let (tx, mut rx) = mpsc::channel(8);
        let (exec, calls) = Scripted::new(vec![]);
        let mut cfg = config(true, 10, 0);
        cfg.enabled = false;

        let state = JobRunner::new(3, cfg, Box::new(exec), tx)
            .run(CancellationToken::new())
            .await;

        assert_eq!(state, RunnerState::Stopped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(next_stopped(&mut rx).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_job_runs_once() {
        let (tx, mut rx) = mpsc::channel(8);
        let (exec, calls) = Scripted::new(vec![ExecOutcome::Completed]);

        let state = JobRunner::new(1, config(false, 0, 0), Box::new(exec), tx)
            .run(CancellationToken::new())
            .await;

        assert_eq!(state, RunnerState::Stopped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(next_stopped(&mut rx).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_job_forwards_samples_until_stopped() {
        let (tx, mut rx) = mpsc::channel(8);
        let (exec, calls) = Scripted::new(vec![
            ExecOutcome::Sampled(sample()),
            ExecOutcome::Sampled(sample()),
        ]);

        let handle = JobRunner::new(5, config(true, 1000, 0), Box::new(exec), tx).spawn();

        for _ in 0..2 {
            match rx.recv().await {
                Some(RuntimeEvent::SampleCollected(s)) => assert_eq!(s.task_id, 1),
                other => panic!("expected sample, got {other:?}"),
            }
        }

        assert_eq!(handle.stop(), StopStatus::Requested);
        assert_eq!(handle.stop(), StopStatus::AlreadyStopped);
        assert_eq!(next_stopped(&mut rx).await, 5);
        handle.wait().await.unwrap();
        // Stopped during the pause, before a third invocation.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_stops_a_repeating_job() {
        let (tx, mut rx) = mpsc::channel(8);
        let (exec, calls) = Scripted::new(vec![
            ExecOutcome::Failed("spawn: no such file".into()),
            ExecOutcome::Completed,
        ]);

        let state = JobRunner::new(2, config(true, 0, 0), Box::new(exec), tx)
            .run(CancellationToken::new())
            .await;

        assert_eq!(state, RunnerState::Stopped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(next_stopped(&mut rx).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_invocation_is_cancelled_and_job_continues() {
        let (tx, _rx) = mpsc::channel(8);
        let (mut exec, calls) = Scripted::new(vec![ExecOutcome::Completed]);
        exec.hang = Duration::from_secs(60);

        let cancel = CancellationToken::new();
        let runner = JobRunner::new(9, config(true, 100, 500), Box::new(exec), tx);
        let join = tokio::spawn(runner.run(cancel.clone()));

        // Two invocations time out (500ms each + 100ms pause), the third is
        // in flight.
        tokio::time::sleep(Duration::from_millis(1250)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cancel.cancel();
        assert_eq!(join.await.unwrap(), RunnerState::Stopped);
    }

    /// Executor whose unit cannot be interrupted: it always finishes its
    /// pass and returns the sample, like a collector already on the pool.
    struct Uninterruptible {
        pass: Duration,
    }

    impl Executor for Uninterruptible {
        fn name(&self) -> &'static str {
            "uninterruptible"
        }

        fn execute<'a>(&'a mut self, _cancel: &'a CancellationToken) -> ExecFuture<'a> {
            Box::pin(async move {
                tokio::time::sleep(self.pass).await;
                ExecOutcome::Sampled(sample())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sample_finished_after_timeout_is_still_delivered() {
        let (tx, mut rx) = mpsc::channel(8);
        let exec = Uninterruptible {
            pass: Duration::from_secs(3),
        };
        let handle = JobRunner::new(6, config(true, 1000, 500), Box::new(exec), tx).spawn();

        match rx.recv().await {
            Some(RuntimeEvent::SampleCollected(s)) => assert_eq!(s.task_id, 1),
            other => panic!("expected the late sample, got {other:?}"),
        }

        handle.stop();
        assert_eq!(next_stopped(&mut rx).await, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_after_natural_end_is_already_stopped() {
        let (tx, mut rx) = mpsc::channel(8);
        let (exec, _) = Scripted::new(vec![ExecOutcome::Completed]);

        let handle = JobRunner::new(4, config(false, 0, 0), Box::new(exec), tx).spawn();
        assert_eq!(next_stopped(&mut rx).await, 4);
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }

        assert_eq!(handle.stop(), StopStatus::AlreadyStopped);
    }
}
