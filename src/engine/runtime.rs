// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

use crate::clock::now_ms;
use crate::errors::Result;
use crate::exec::{JobBackend, RunnerHandle};
use crate::message::OutboundMessage;
use crate::model::JobConfig;
use crate::transport::{SendResult, Transport};
use crate::types::StopStatus;

use super::core::CoreRuntime;
use super::{CoreCommand, RunnerId, RuntimeEvent};

/// Default time allowed for runners to tear down on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The reactor: drives the orchestrator in response to `RuntimeEvent`s and
/// timer ticks, and delegates job execution to a `JobBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// task semantics. This struct handles async IO: reading events from
/// channels, owning the flush and deadline timers, starting and stopping
/// runners and handing frames to the transport.
pub struct Runtime<B: JobBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    // Weak so the loop ends once every producer is gone.
    event_tx: mpsc::WeakSender<RuntimeEvent>,
    transport: Box<dyn Transport>,
    backend: B,
    background: Vec<JobConfig>,
    task_runners: HashMap<RunnerId, RunnerHandle>,
    background_runners: HashMap<RunnerId, RunnerHandle>,
    /// Stopped task runners still tearing down.
    draining: HashMap<RunnerId, RunnerHandle>,
    next_runner: RunnerId,
    flush: Option<Interval>,
    deadline: Option<Pin<Box<Sleep>>>,
    shutdown_grace: Duration,
}

impl<B: JobBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("task_runners", &self.task_runners.len())
            .field("background_runners", &self.background_runners.len())
            .finish_non_exhaustive()
    }
}

impl<B: JobBackend> Runtime<B> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: &mpsc::Sender<RuntimeEvent>,
        transport: Box<dyn Transport>,
        backend: B,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx: event_tx.downgrade(),
            transport,
            backend,
            background: Vec::new(),
            task_runners: HashMap::new(),
            background_runners: HashMap::new(),
            draining: HashMap::new(),
            next_runner: 1,
            flush: None,
            deadline: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Jobs started with the reactor and independent of any task.
    pub fn with_background_jobs(mut self, jobs: Vec<JobConfig>) -> Self {
        self.background = jobs;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Main event loop.
    ///
    /// - Starts background jobs.
    /// - Consumes `RuntimeEvent`s and timer ticks.
    /// - Feeds them into the core and executes the returned commands.
    /// - On exit, stops every runner and waits for them to tear down.
    pub async fn run(mut self) -> Result<()> {
        info!("fleet agent reactor started");

        for config in std::mem::take(&mut self.background) {
            if let Some((id, handle)) = self.start_runner(config) {
                self.background_runners.insert(id, handle);
            }
        }

        loop {
            let event = tokio::select! {
                ev = self.event_rx.recv() => match ev {
                    Some(ev) => ev,
                    None => {
                        info!("runtime event channel closed; exiting");
                        break;
                    }
                },
                _ = next_flush(&mut self.flush) => RuntimeEvent::FlushTick,
                _ = deadline_elapsed(&mut self.deadline) => {
                    self.deadline = None;
                    RuntimeEvent::TaskDeadline
                }
            };

            debug!(?event, "runtime received event");

            if let RuntimeEvent::RunnerStopped { runner, .. } = &event {
                self.prune(*runner);
            }

            // Feed the event into the pure core and get commands back.
            let step = self.core.step(event, now_ms());

            for command in step.commands {
                self.execute_command(command);
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        self.shutdown().await;
        info!("runtime exiting");
        Ok(())
    }

    /// Execute a single command from the core.
    fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::StartJobs(configs) => {
                for config in configs {
                    if let Some((id, handle)) = self.start_runner(config) {
                        self.task_runners.insert(id, handle);
                    }
                }
            }
            CoreCommand::StopJobs => self.stop_task_runners(),
            CoreCommand::ArmTimers {
                flush_every,
                deadline,
            } => {
                debug!(
                    flush_ms = flush_every.as_millis() as u64,
                    deadline_ms = deadline.as_millis() as u64,
                    "arming task timers"
                );
                // interval_at panics on a zero period.
                self.flush = (!flush_every.is_zero()).then(|| {
                    let mut flush =
                        tokio::time::interval_at(Instant::now() + flush_every, flush_every);
                    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    flush
                });
                self.deadline = Some(Box::pin(tokio::time::sleep(deadline)));
            }
            CoreCommand::DisarmTimers => {
                self.flush = None;
                self.deadline = None;
            }
            CoreCommand::Send(message) => self.send(message),
        }
    }

    fn start_runner(&mut self, config: JobConfig) -> Option<(RunnerId, RunnerHandle)> {
        let Some(events) = self.event_tx.upgrade() else {
            warn!(job = %config.kind, "event channel closed; job not started");
            return None;
        };
        let id = self.next_runner;
        self.next_runner += 1;
        let kind = config.kind;

        match self.backend.start_job(id, config, events) {
            Ok(handle) => {
                debug!(runner = id, job = %kind, "job runner spawned");
                Some((id, handle))
            }
            Err(e) => {
                error!(runner = id, job = %kind, error = %e, "cannot start job");
                None
            }
        }
    }

    /// Request stop on every task runner and clear the set at once; teardown
    /// continues in the background.
    fn stop_task_runners(&mut self) {
        for (id, handle) in self.task_runners.drain() {
            match handle.stop() {
                StopStatus::Requested => {
                    debug!(runner = id, job = %handle.kind(), "stop requested");
                    self.draining.insert(id, handle);
                }
                StopStatus::AlreadyStopped => {
                    debug!(runner = id, job = %handle.kind(), "runner already stopped");
                }
            }
        }
    }

    fn prune(&mut self, runner: RunnerId) {
        if self.draining.remove(&runner).is_some() || self.task_runners.remove(&runner).is_some()
        {
            return;
        }
        if let Some(handle) = self.background_runners.remove(&runner) {
            warn!(runner, job = %handle.kind(), "background job stopped");
        }
    }

    fn send(&mut self, message: OutboundMessage) {
        let kind = message.kind();
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!(kind, error = %e, "cannot encode outbound message");
                return;
            }
        };

        let ack = self.transport.send(frame);
        tokio::spawn(async move {
            match ack.await {
                SendResult::Delivered => debug!(kind, "message delivered"),
                SendResult::Failed(reason) => warn!(kind, %reason, "message not delivered"),
            }
        });
    }

    async fn shutdown(&mut self) {
        self.flush = None;
        self.deadline = None;
        // Runners blocked on a full channel must not keep us waiting.
        self.event_rx.close();

        let handles: Vec<RunnerHandle> = self
            .task_runners
            .drain()
            .chain(self.background_runners.drain())
            .chain(self.draining.drain())
            .map(|(_, handle)| handle)
            .collect();
        if handles.is_empty() {
            return;
        }

        for handle in &handles {
            handle.stop();
        }
        let aborts: Vec<_> = handles.iter().map(RunnerHandle::abort_handle).collect();

        info!(runners = handles.len(), "waiting for job runners to stop");
        let waits = join_all(handles.into_iter().map(RunnerHandle::wait));
        if tokio::time::timeout(self.shutdown_grace, waits).await.is_err() {
            warn!(
                grace_ms = self.shutdown_grace.as_millis() as u64,
                "job runners did not stop in time; aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

async fn next_flush(flush: &mut Option<Interval>) {
    match flush {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn deadline_elapsed(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}
