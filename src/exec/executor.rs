// src/exec/executor.rs

//! Capability contract shared by every executor variant.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::telemetry::Sample;

/// How a single executor invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    /// The invocation ran to its natural end.
    Completed,
    /// A collector finished and produced a sample for the reactor to merge.
    Sampled(Sample),
    /// The invocation was stopped through its cancellation token.
    Cancelled,
    /// The runner's per-invocation budget elapsed.
    TimedOut,
    /// A resource failure; the owning runner stops instead of repeating.
    Failed(String),
}

impl ExecOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecOutcome::Failed(_))
    }
}

/// Future returned by [`Executor::execute`].
pub type ExecFuture<'a> = Pin<Box<dyn Future<Output = ExecOutcome> + Send + 'a>>;

/// One kind of scheduled activity.
///
/// `execute` begins one invocation and must never block the reactor thread;
/// blocking work is offloaded by the implementation. The invocation stops
/// early once `cancel` fires and releases every resource it acquired before
/// the returned future resolves. The owning [`super::JobRunner`] decides
/// whether to repeat.
pub trait Executor: Send {
    fn name(&self) -> &'static str;

    fn execute<'a>(&'a mut self, cancel: &'a CancellationToken) -> ExecFuture<'a>;
}
