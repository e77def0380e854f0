// src/lib.rs

pub mod cli;
pub mod clock;
pub mod config;
pub mod crash;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod identity;
pub mod logging;
pub mod message;
pub mod model;
pub mod priority;
pub mod sample;
pub mod telemetry;
pub mod transport;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::clock::now_ms;
use crate::config::{Settings, load_local_task};
use crate::crash::{CrashHarvester, HarvestHandle, HarvestWorker, HttpUploader};
use crate::engine::{CoreOptions, CoreRuntime, Runtime, RuntimeEvent};
use crate::exec::RealJobBackend;
use crate::identity::DeviceIdentity;
use crate::model::{JobConfig, JobPlan, Task};
use crate::sample::ProcfsSampler;
use crate::transport::{OfflineTransport, TcpTransport, Transport};
use crate::types::JobType;

/// Capacity of the reactor event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - device identity
/// - transport (TCP, or offline without a server)
/// - crash harvester thread and its background job
/// - sampler, job backend and reactor
/// - optional local task bootstrap
/// - Ctrl-C handling
///
/// Must run on the reactor (current-thread) runtime.
pub async fn run(settings: Settings) -> Result<()> {
    let identity = DeviceIdentity::resolve(
        settings.serial.clone(),
        settings.hardware.clone(),
        settings.firmware_version.clone(),
    );
    info!(
        sn = %identity.serial,
        hardware = %identity.hardware,
        version = %identity.firmware_version,
        sysroot = %settings.sysroot.display(),
        "fleet agent starting"
    );

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(EVENT_CHANNEL_CAPACITY);

    let transport: Box<dyn Transport> = match &settings.server {
        Some(endpoint) => Box::new(TcpTransport::spawn(
            endpoint.to_string(),
            identity.channel_path(),
            settings.reconnect_delay,
            rt_tx.clone(),
        )),
        None => {
            warn!("no server configured; running offline");
            Box::new(OfflineTransport)
        }
    };

    let harvester = spawn_harvester(&settings, &identity)?;
    let background = background_jobs(&settings, harvester.is_some());

    let sampler = Arc::new(ProcfsSampler::new(&settings.sysroot, settings.smap_sleep));
    let backend = RealJobBackend::new(
        sampler,
        settings.script_dir.clone(),
        settings.kill_grace,
        harvester,
    );

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    if let Some(path) = &settings.task_json {
        let desc = load_local_task(path)
            .with_context(|| format!("loading local task {}", path.display()))?;
        let task = Task::from_local(desc, now_ms());
        info!(task_id = task.id, path = %path.display(), "bootstrapping local task");
        rt_tx.send(RuntimeEvent::TaskBootstrapped(task)).await?;
    }

    let options = CoreOptions {
        disable_upload: settings.disable_upload,
        flush_interval: settings.flush_interval,
        plan: JobPlan::new(settings.top_interval, settings.smap_interval),
        identity,
    };

    // Construct the pure core (single source of truth for task semantics).
    let core = CoreRuntime::new(options);

    // Construct the async IO shell around the core.
    let runtime = Runtime::new(core, rt_rx, &rt_tx, transport, backend)
        .with_background_jobs(background)
        .with_shutdown_grace(settings.kill_grace + Duration::from_secs(1));
    drop(rt_tx);

    runtime.run().await?;
    Ok(())
}

/// Start the harvester thread when crash uploads are configured.
fn spawn_harvester(
    settings: &Settings,
    identity: &DeviceIdentity,
) -> Result<Option<HarvestHandle>> {
    let Some(url) = settings.crash.upload_url.clone() else {
        return Ok(None);
    };
    info!(%url, dirs = ?settings.crash.scan_dirs, "crash upload enabled");

    let crash = settings.crash.clone();
    let serial = identity.serial.clone();
    let (handle, _join) = HarvestWorker::spawn(move || {
        let uploader = HttpUploader::new()?;
        Ok(
            CrashHarvester::new(crash.scan_dirs, crash.suffixes, serial, url, Box::new(uploader))
                .with_pause(crash.pause),
        )
    })
    .context("spawning crash harvester thread")?;
    Ok(Some(handle))
}

/// Jobs that run for the whole life of the agent.
fn background_jobs(settings: &Settings, crash_enabled: bool) -> Vec<JobConfig> {
    if !crash_enabled {
        return Vec::new();
    }
    vec![JobConfig {
        kind: JobType::CrashScan,
        enabled: true,
        repeat: true,
        timeout: Duration::ZERO,
        interval: settings.crash.interval,
        payload: None,
        task: None,
    }]
}
