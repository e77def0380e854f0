// tests/crash_harvest.rs

mod common;
use crate::common::init_tracing;

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fleet_agent::crash::{CrashHarvester, CrashUploader, HarvestWorker, UploadRequest, UploadResponse};
use fleet_agent::errors::Result;
use fleet_agent::exec::crash_scan::CrashScanExecutor;
use fleet_agent::exec::{ExecOutcome, Executor};

/// Answers uploads with queued status codes (200 once the queue is empty)
/// and records every request.
#[derive(Clone, Default)]
struct ScriptedUploader {
    statuses: Arc<Mutex<VecDeque<u16>>>,
    seen: Arc<Mutex<Vec<UploadRequest>>>,
}

impl CrashUploader for ScriptedUploader {
    fn upload(&self, request: &UploadRequest) -> Result<UploadResponse> {
        self.seen.lock().unwrap().push(request.clone());
        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(200);
        Ok(UploadResponse {
            status,
            body: String::new(),
        })
    }
}

fn executor(dir: PathBuf, uploader: ScriptedUploader) -> CrashScanExecutor {
    let (handle, _join) = HarvestWorker::spawn(move || {
        Ok(CrashHarvester::new(
            vec![dir],
            vec!["core".into()],
            "SN-TEST".into(),
            "http://crash.local/".into(),
            Box::new(uploader),
        )
        .with_pause(Duration::ZERO))
    })
    .unwrap();
    CrashScanExecutor::new(handle)
}

#[tokio::test]
async fn failed_upload_is_retried_and_success_is_not_repeated() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("vui.1700000000.42.x.core");
    fs::write(&artifact, b"dump").unwrap();
    fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let uploader = ScriptedUploader::default();
    uploader.statuses.lock().unwrap().push_back(503);
    let mut exec = executor(dir.path().to_path_buf(), uploader.clone());
    let cancel = CancellationToken::new();

    // Rejected: the artifact stays for the next pass.
    assert_eq!(exec.execute(&cancel).await, ExecOutcome::Completed);
    assert!(artifact.exists());

    // Accepted: the artifact is removed.
    assert_eq!(exec.execute(&cancel).await, ExecOutcome::Completed);
    assert!(!artifact.exists());

    // Nothing left to upload.
    assert_eq!(exec.execute(&cancel).await, ExecOutcome::Completed);

    let seen = uploader.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    let req = &seen[1];
    assert_eq!(req.url, "http://crash.local/server/coredump/put");
    assert_eq!(req.header("Device-SN"), Some("SN-TEST"));
    assert_eq!(req.header("APP-Fullname"), Some("vui"));
    assert_eq!(req.header("Report-Time"), Some("1700000000"));
    assert_eq!(req.header("APP-PID"), Some("42"));
    assert_eq!(req.header("Content-Type"), Some("application/zip"));
    assert!(fs::read(dir.path().join("notes.txt")).is_ok());
}

#[tokio::test]
async fn unconventional_name_uploads_with_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("oddname.core"), b"dump").unwrap();

    let uploader = ScriptedUploader::default();
    let mut exec = executor(dir.path().to_path_buf(), uploader.clone());
    assert_eq!(
        exec.execute(&CancellationToken::new()).await,
        ExecOutcome::Completed
    );

    let seen = uploader.seen.lock().unwrap();
    assert_eq!(seen[0].header("APP-Fullname"), Some("unknownApp"));
    assert_eq!(seen[0].header("APP-PID"), Some("0"));
}

#[tokio::test]
async fn dead_harvester_is_a_failure() {
    let (handle, join) = HarvestWorker::spawn(|| {
        Err(anyhow::anyhow!("no uploader available").into())
    })
    .unwrap();
    join.join().unwrap();

    let mut exec = CrashScanExecutor::new(handle);
    let outcome = exec.execute(&CancellationToken::new()).await;
    assert!(outcome.is_failure(), "got {outcome:?}");
}
