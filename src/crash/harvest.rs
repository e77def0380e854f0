// src/crash/harvest.rs

//! Crash harvester and the dedicated thread it runs on.
//!
//! A harvest pass walks every scan directory and, per matching artifact:
//! 1. compresses it into a temporary zip (always removed afterwards)
//! 2. parses the filename into identity fields
//! 3. uploads the archive
//! 4. deletes the original artifact on a 2xx response
//!
//! Failed uploads leave the artifact in place for the next pass. Uploads are
//! synchronous, so passes run on one long-lived `std::thread` that owns the
//! uploader; the reactor only sends it requests.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc as std_mpsc};
use std::thread;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::clock::now_secs;
use crate::errors::{AgentError, Result};

use super::artifact::{CrashArtifact, find_artifacts};
use super::upload::{CrashUploader, UploadRequest};

/// Default pause between two uploads.
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(1);

/// Counters for one harvest pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub found: usize,
    pub uploaded: usize,
    pub failed: usize,
    /// The pass stopped early on request.
    pub aborted: bool,
}

pub struct CrashHarvester {
    scan_dirs: Vec<PathBuf>,
    suffixes: Vec<String>,
    serial: String,
    base_url: String,
    uploader: Box<dyn CrashUploader>,
    pause: Duration,
}

impl CrashHarvester {
    pub fn new(
        scan_dirs: Vec<PathBuf>,
        suffixes: Vec<String>,
        serial: String,
        base_url: String,
        uploader: Box<dyn CrashUploader>,
    ) -> Self {
        Self {
            scan_dirs,
            suffixes,
            serial,
            base_url,
            uploader,
            pause: DEFAULT_PAUSE,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Run one pass over every scan directory.
    ///
    /// `abort` is checked before each artifact; an artifact already being
    /// uploaded is finished first.
    pub fn harvest_pass(&self, abort: &AtomicBool) -> HarvestReport {
        let mut report = HarvestReport::default();

        for dir in &self.scan_dirs {
            for path in find_artifacts(dir, &self.suffixes) {
                if abort.load(Ordering::Relaxed) {
                    report.aborted = true;
                    return report;
                }
                if report.found > 0 && !self.pause.is_zero() {
                    thread::sleep(self.pause);
                }
                report.found += 1;

                match self.harvest_one(&path) {
                    Ok(true) => report.uploaded += 1,
                    Ok(false) => report.failed += 1,
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "crash upload failed");
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    /// Returns whether the artifact was accepted (and deleted).
    fn harvest_one(&self, path: &Path) -> Result<bool> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AgentError::Config(format!("no file name in {}", path.display())))?;

        let body = compress(path, &filename)?;
        let artifact = CrashArtifact::parse(&filename, now_secs());
        debug!(
            path = %path.display(),
            app = %artifact.app_name,
            pid = %artifact.pid,
            unused = %artifact.unused,
            zip_bytes = body.len(),
            "uploading crash artifact"
        );

        let request = UploadRequest::new(&self.base_url, &self.serial, &artifact, body);
        let response = self.uploader.upload(&request)?;

        if response.is_success() {
            fs::remove_file(path)?;
            info!(path = %path.display(), status = response.status, "crash artifact uploaded");
            Ok(true)
        } else {
            warn!(
                path = %path.display(),
                status = response.status,
                body = %response.body,
                "crash upload rejected; keeping artifact"
            );
            Ok(false)
        }
    }
}

/// Deflate `path` into a temporary zip holding one entry named `entry_name`
/// and return the archive bytes. The temporary file is removed on every path.
pub fn compress(path: &Path, entry_name: &str) -> Result<Vec<u8>> {
    let mut tmp = NamedTempFile::new()?;
    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(entry_name, options)?;
        let mut src = File::open(path)?;
        io::copy(&mut src, &mut zip)?;
        zip.finish()?;
    }
    let bytes = fs::read(tmp.path())?;
    tmp.close()?;
    Ok(bytes)
}

/// One harvest request sent to the worker thread.
#[derive(Debug)]
pub struct HarvestJob {
    pub abort: Arc<AtomicBool>,
    pub reply: oneshot::Sender<HarvestReport>,
}

/// Cloneable sender side of the harvester thread.
#[derive(Debug, Clone)]
pub struct HarvestHandle {
    tx: std_mpsc::Sender<HarvestJob>,
}

impl HarvestHandle {
    /// Queue a pass; the receiver resolves with its report.
    pub fn request(&self, abort: Arc<AtomicBool>) -> Result<oneshot::Receiver<HarvestReport>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(HarvestJob { abort, reply })
            .map_err(|_| AgentError::Config("harvester thread is not running".into()))?;
        Ok(rx)
    }
}

pub struct HarvestWorker;

impl HarvestWorker {
    /// Start the harvester thread.
    ///
    /// `factory` runs on the new thread, so the harvester (and its blocking
    /// HTTP client) is created and dropped there. The thread exits once
    /// every [`HarvestHandle`] is dropped.
    pub fn spawn<F>(factory: F) -> Result<(HarvestHandle, thread::JoinHandle<()>)>
    where
        F: FnOnce() -> Result<CrashHarvester> + Send + 'static,
    {
        let (tx, rx) = std_mpsc::channel::<HarvestJob>();
        let join = thread::Builder::new()
            .name("fleet-agent-harvester".into())
            .spawn(move || {
                let harvester = match factory() {
                    Ok(h) => h,
                    Err(e) => {
                        error!(error = %e, "cannot build crash harvester");
                        return;
                    }
                };
                info!("crash harvester thread started");

                for job in rx {
                    if job.abort.load(Ordering::Relaxed) {
                        continue;
                    }
                    let report = harvester.harvest_pass(&job.abort);
                    debug!(?report, "harvest pass finished");
                    let _ = job.reply.send(report);
                }

                info!("crash harvester thread stopped");
            })?;
        Ok((HarvestHandle { tx }, join))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::Mutex;

    use super::*;
    use crate::crash::upload::UploadResponse;

    struct Recording {
        status: u16,
        seen: Arc<Mutex<Vec<UploadRequest>>>,
    }

    impl CrashUploader for Recording {
        fn upload(&self, request: &UploadRequest) -> Result<UploadResponse> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(UploadResponse {
                status: self.status,
                body: String::new(),
            })
        }
    }

    fn harvester(dir: &Path, status: u16) -> (CrashHarvester, Arc<Mutex<Vec<UploadRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let h = CrashHarvester::new(
            vec![dir.to_path_buf()],
            vec!["core".into()],
            "SN01".into(),
            "http://crash.local".into(),
            Box::new(Recording {
                status,
                seen: seen.clone(),
            }),
        )
        .with_pause(Duration::ZERO);
        (h, seen)
    }

    #[test]
    fn compress_produces_single_entry_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.1.2.x.core");
        fs::write(&path, b"core bytes").unwrap();

        let bytes = compress(&path, "app.1.2.x.core").unwrap();
        let mut archive = zip::ZipArchive::new(io::Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "app.1.2.x.core");
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "core bytes");
    }

    #[test]
    fn accepted_upload_deletes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vui.100.7.x.core");
        fs::write(&path, b"dump").unwrap();
        let (h, seen) = harvester(dir.path(), 200);

        let report = h.harvest_pass(&AtomicBool::new(false));
        assert_eq!(report.uploaded, 1);
        assert!(!path.exists());

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].header("APP-Fullname"), Some("vui"));
        assert_eq!(seen[0].header("APP-PID"), Some("7"));
    }

    #[test]
    fn rejected_upload_keeps_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vui.100.7.x.core");
        fs::write(&path, b"dump").unwrap();
        let (h, _) = harvester(dir.path(), 503);

        let report = h.harvest_pass(&AtomicBool::new(false));
        assert_eq!(report.failed, 1);
        assert_eq!(fs::read(&path).unwrap(), b"dump");
    }

    #[test]
    fn abort_flag_stops_before_next_artifact() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.1.2.x.core"), b"a").unwrap();
        let (h, seen) = harvester(dir.path(), 200);

        let report = h.harvest_pass(&AtomicBool::new(true));
        assert!(report.aborted);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn worker_thread_serves_requests() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.1.2.x.core"), b"a").unwrap();
        let root = dir.path().to_path_buf();

        let (handle, join) =
            HarvestWorker::spawn(move || Ok(harvester(&root, 200).0)).unwrap();
        let rx = handle.request(Arc::new(AtomicBool::new(false))).unwrap();
        let report = rx.blocking_recv().unwrap();
        assert_eq!(report.uploaded, 1);

        drop(handle);
        join.join().unwrap();
    }
}
