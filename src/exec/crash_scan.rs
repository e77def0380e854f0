// src/exec/crash_scan.rs

//! Crash scan executor: one harvest pass per invocation.
//!
//! The pass itself runs on the harvester thread; this executor only queues
//! the request and waits for the report.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::crash::HarvestHandle;

use super::executor::{ExecFuture, ExecOutcome, Executor};

pub struct CrashScanExecutor {
    harvester: HarvestHandle,
}

impl CrashScanExecutor {
    pub fn new(harvester: HarvestHandle) -> Self {
        Self { harvester }
    }

    async fn scan(&self, cancel: &CancellationToken) -> ExecOutcome {
        let abort = Arc::new(AtomicBool::new(false));
        let reply = match self.harvester.request(Arc::clone(&abort)) {
            Ok(rx) => rx,
            Err(e) => return ExecOutcome::Failed(e.to_string()),
        };

        tokio::select! {
            report = reply => match report {
                Ok(report) => {
                    if report.found > 0 {
                        info!(
                            found = report.found,
                            uploaded = report.uploaded,
                            failed = report.failed,
                            aborted = report.aborted,
                            "crash scan finished"
                        );
                    } else {
                        debug!(aborted = report.aborted, "crash scan found nothing");
                    }
                    if report.aborted {
                        ExecOutcome::Cancelled
                    } else {
                        ExecOutcome::Completed
                    }
                }
                Err(_) => ExecOutcome::Failed("harvester thread exited".to_string()),
            },
            _ = cancel.cancelled() => {
                // The artifact in flight is finished; the rest of the pass is skipped.
                abort.store(true, Ordering::Relaxed);
                ExecOutcome::Cancelled
            }
        }
    }
}

impl Executor for CrashScanExecutor {
    fn name(&self) -> &'static str {
        "crash_scan"
    }

    fn execute<'a>(&'a mut self, cancel: &'a CancellationToken) -> ExecFuture<'a> {
        Box::pin(self.scan(cancel))
    }
}
