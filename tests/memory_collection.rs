// tests/memory_collection.rs

mod common;
use crate::common::init_tracing;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use fleet_agent::engine::RuntimeEvent;
use fleet_agent::exec::{JobBackend, RealJobBackend};
use fleet_agent::model::{JobConfig, JobPlan, LocalTaskDescriptor, Task};
use fleet_agent::sample::ProcfsSampler;
use fleet_agent::telemetry::SampleBody;
use fleet_agent::types::JobType;

const SMAP_SLEEP: Duration = Duration::from_millis(400);

/// A proc tree with three user processes that have mappings.
fn fake_sysroot(root: &Path) {
    let proc = root.join("proc");
    fs::create_dir_all(&proc).unwrap();
    fs::write(proc.join("meminfo"), "MemTotal: 4096 kB\nMemFree: 1024 kB\n").unwrap();
    for (pid, name) in [(11, "init"), (120, "daemon"), (300, "app")] {
        let dir = proc.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("comm"), format!("{name}\n")).unwrap();
        fs::write(dir.join("cmdline"), b"").unwrap();
        fs::write(dir.join("smaps_rollup"), "Rss: 100 kB\nPss: 80 kB\n").unwrap();
    }
}

fn smap_job() -> JobConfig {
    let task = Task::from_local(
        LocalTaskDescriptor {
            id: 21,
            kind: "START".into(),
            shell_id: 1,
            shell: "true".into(),
            shell_type: "sh".into(),
            timestamp: 0,
        },
        0,
    );
    JobPlan::default()
        .jobs_for(&task)
        .into_iter()
        .find(|job| job.kind == JobType::CollectSmap)
        .unwrap()
}

async fn first_memory_sample(config: JobConfig, root: &Path) -> usize {
    let sampler = Arc::new(ProcfsSampler::new(root, SMAP_SLEEP));
    let mut backend = RealJobBackend::new(sampler, std::env::temp_dir(), Duration::from_secs(1), None);
    let (tx, mut rx) = mpsc::channel(8);
    let handle = backend.start_job(1, config, tx).unwrap();

    let sample = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Some(RuntimeEvent::SampleCollected(sample)) => return sample,
                Some(_) => continue,
                None => panic!("runner ended without a memory sample"),
            }
        }
    })
    .await
    .expect("no memory sample within 10s");

    handle.stop();
    assert_eq!(sample.task_id, 21);
    let SampleBody::Mem(mem) = sample.body else {
        panic!("expected a memory sample");
    };
    mem.processes.len()
}

#[tokio::test]
async fn paced_memory_walk_is_not_cut_short() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    fake_sysroot(dir.path());

    let config = smap_job();
    assert_eq!(config.timeout, Duration::ZERO);
    assert_eq!(first_memory_sample(config, dir.path()).await, 3);
}

#[tokio::test]
async fn memory_walk_longer_than_its_timeout_still_reports() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    fake_sysroot(dir.path());

    // Three processes at 400ms each overrun a 500ms budget.
    let mut config = smap_job();
    config.timeout = Duration::from_millis(500);
    assert_eq!(first_memory_sample(config, dir.path()).await, 3);
}
