// src/telemetry.rs

//! Telemetry aggregate and the immutable samples that feed it.
//!
//! Collectors run their sampling on the blocking pool and hand back a
//! [`Sample`]. Only the reactor merges samples into a
//! [`TelemetryAggregate`], and only the reactor flushes it, so the aggregate
//! needs no locking.

use serde::{Deserialize, Serialize};

/// CPU usage percentages for one core (or the machine total).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuCoreUsage {
    pub busy: f32,
    pub idle: f32,
    pub iowait: f32,
    pub sys: f32,
    pub usr: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcCpuUsage {
    pub pid: u32,
    pub name: String,
    pub status: String,
    pub cpu_usage: f32,
    pub nice: i32,
    pub stime: u64,
    pub utime: u64,
    pub ticks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuBlock {
    pub timestamp: u64,
    pub total: CpuCoreUsage,
    pub cores: Vec<CpuCoreUsage>,
    pub processes: Vec<ProcCpuUsage>,
}

/// Per-process memory breakdown in kB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcMemUsage {
    pub pid: u32,
    pub name: String,
    pub shared_clean: i64,
    pub shared_dirty: i64,
    pub private_clean: i64,
    pub private_dirty: i64,
    pub pss: i64,
    pub rss: i64,
}

/// System-wide memory summary in kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SysMemUsage {
    pub total: i64,
    pub free: i64,
    pub available: i64,
    pub buffers: i64,
    pub cached: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemBlock {
    pub timestamp: u64,
    pub system: SysMemUsage,
    pub processes: Vec<ProcMemUsage>,
}

/// One generation of collected samples, flushed as a `CollectData` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryAggregate {
    pub timestamp: u64,
    pub cpu: CpuBlock,
    pub mem: MemBlock,
}

/// Output of one CPU-top sampling pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuSnapshot {
    pub total: CpuCoreUsage,
    pub cores: Vec<CpuCoreUsage>,
    pub processes: Vec<ProcCpuUsage>,
}

/// Output of one memory-map sampling pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemSnapshot {
    pub system: SysMemUsage,
    pub processes: Vec<ProcMemUsage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleBody {
    Cpu(CpuSnapshot),
    Mem(MemSnapshot),
}

/// A finished sample on its way back to the reactor.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Task the collector belonged to; stale samples are dropped.
    pub task_id: i64,
    /// Epoch seconds at which the sample was taken.
    pub taken_at: u64,
    pub body: SampleBody,
}

impl TelemetryAggregate {
    /// Fresh, empty generation stamped with `now_secs`.
    pub fn new(now_secs: u64) -> Self {
        Self {
            timestamp: now_secs,
            cpu: CpuBlock {
                timestamp: now_secs,
                ..CpuBlock::default()
            },
            mem: MemBlock {
                timestamp: now_secs,
                ..MemBlock::default()
            },
        }
    }

    /// Merge a sample into this generation.
    ///
    /// Cores and process lists accumulate across samples; the CPU total and
    /// the system memory summary are overwritten by the latest sample.
    pub fn merge(&mut self, sample: Sample) {
        match sample.body {
            SampleBody::Cpu(cpu) => {
                self.cpu.timestamp = sample.taken_at;
                self.cpu.total = cpu.total;
                self.cpu.cores.extend(cpu.cores);
                self.cpu
                    .processes
                    .extend(cpu.processes.into_iter().filter(|p| p.cpu_usage > 0.0));
            }
            SampleBody::Mem(mem) => {
                self.mem.timestamp = sample.taken_at;
                self.mem.system = mem.system;
                self.mem.processes.extend(mem.processes);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.cores.is_empty()
            && self.cpu.processes.is_empty()
            && self.mem.processes.is_empty()
    }
}
