// src/sample/procfs.rs

//! `/proc` backed sampler.
//!
//! CPU percentages are computed from the jiffy deltas between two
//! consecutive `sample_top` calls, the way `top` does. The first call has no
//! baseline and reports averages since boot.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, trace};

use crate::errors::Result;
use crate::telemetry::{
    CpuCoreUsage, CpuSnapshot, MemSnapshot, ProcCpuUsage, ProcMemUsage, SysMemUsage,
};

use super::StatSampler;

/// Raw jiffy counters of one `cpu` line in `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    fn saturating_sub(&self, prev: &CpuTimes) -> CpuTimes {
        CpuTimes {
            user: self.user.saturating_sub(prev.user),
            nice: self.nice.saturating_sub(prev.nice),
            system: self.system.saturating_sub(prev.system),
            idle: self.idle.saturating_sub(prev.idle),
            iowait: self.iowait.saturating_sub(prev.iowait),
            irq: self.irq.saturating_sub(prev.irq),
            softirq: self.softirq.saturating_sub(prev.softirq),
            steal: self.steal.saturating_sub(prev.steal),
        }
    }

    /// Percentages of this (delta) interval.
    pub fn usage(&self) -> CpuCoreUsage {
        let total = self.total();
        if total == 0 {
            return CpuCoreUsage::default();
        }
        let pct = |v: u64| (v as f64 * 100.0 / total as f64) as f32;
        let idle = pct(self.idle);
        let iowait = pct(self.iowait);
        CpuCoreUsage {
            busy: (100.0 - idle - iowait).max(0.0),
            idle,
            iowait,
            sys: pct(self.system + self.irq + self.softirq),
            usr: pct(self.user + self.nice),
        }
    }
}

/// Parsed `/proc/stat`: the aggregate line and one entry per core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatCounters {
    pub total: CpuTimes,
    pub cores: Vec<CpuTimes>,
}

/// The fields of `/proc/<pid>/stat` the collectors report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: String,
    pub utime: u64,
    pub stime: u64,
    pub nice: i32,
}

impl ProcStat {
    pub fn ticks(&self) -> u64 {
        self.utime + self.stime
    }
}

#[derive(Debug, Default)]
struct TopBaseline {
    stat: StatCounters,
    ticks: HashMap<u32, u64>,
}

/// Sampler reading from `{sysroot}/proc`.
#[derive(Debug)]
pub struct ProcfsSampler {
    proc_root: PathBuf,
    smap_sleep: Duration,
    baseline: Mutex<Option<TopBaseline>>,
}

impl ProcfsSampler {
    pub fn new(sysroot: impl AsRef<Path>, smap_sleep: Duration) -> Self {
        Self {
            proc_root: sysroot.as_ref().join("proc"),
            smap_sleep,
            baseline: Mutex::new(None),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    fn pids(&self) -> Result<Vec<u32>> {
        let mut pids: Vec<u32> = fs::read_dir(&self.proc_root)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    /// Command line with NULs turned into spaces, falling back to `comm` for
    /// kernel threads.
    fn process_name(&self, pid: u32, comm: &str) -> String {
        let cmdline = fs::read(self.proc_root.join(pid.to_string()).join("cmdline"))
            .map(|raw| {
                String::from_utf8_lossy(&raw)
                    .replace('\0', " ")
                    .trim()
                    .to_string()
            })
            .unwrap_or_default();
        if cmdline.is_empty() {
            comm.to_string()
        } else {
            cmdline
        }
    }

    fn read_smaps(&self, pid: u32) -> Option<ProcMemUsage> {
        let dir = self.proc_root.join(pid.to_string());
        let text = fs::read_to_string(dir.join("smaps_rollup"))
            .or_else(|_| fs::read_to_string(dir.join("smaps")))
            .ok()?;
        let mut usage = parse_smaps(&text);
        usage.pid = pid;
        Some(usage)
    }
}

impl StatSampler for ProcfsSampler {
    fn sample_top(&self) -> Result<CpuSnapshot> {
        let stat = parse_stat(&fs::read_to_string(self.proc_root.join("stat"))?)?;

        let mut procs = Vec::new();
        for pid in self.pids()? {
            let path = self.proc_root.join(pid.to_string()).join("stat");
            // Processes may exit mid-walk.
            let Ok(text) = fs::read_to_string(&path) else {
                continue;
            };
            match parse_pid_stat(&text) {
                Some(p) => procs.push(p),
                None => trace!(path = %path.display(), "unparsable stat; skipped"),
            }
        }

        let mut guard = self
            .baseline
            .lock()
            .map_err(|_| anyhow::anyhow!("sampler baseline lock poisoned"))?;
        let prev = guard.take().unwrap_or_default();

        let total_delta = stat.total.saturating_sub(&prev.stat.total);
        let cores = stat
            .cores
            .iter()
            .enumerate()
            .map(|(i, core)| {
                let base = prev.stat.cores.get(i).copied().unwrap_or_default();
                core.saturating_sub(&base).usage()
            })
            .collect();

        let window = total_delta.total();
        let mut ticks = HashMap::with_capacity(procs.len());
        let processes = procs
            .into_iter()
            .map(|p| {
                let now = p.ticks();
                let before = prev.ticks.get(&p.pid).copied().unwrap_or(0);
                ticks.insert(p.pid, now);
                let cpu_usage = if window == 0 {
                    0.0
                } else {
                    (now.saturating_sub(before) as f64 * 100.0 / window as f64) as f32
                };
                ProcCpuUsage {
                    pid: p.pid,
                    name: self.process_name(p.pid, &p.comm),
                    status: p.state,
                    cpu_usage,
                    nice: p.nice,
                    stime: p.stime,
                    utime: p.utime,
                    ticks: now,
                }
            })
            .collect();

        *guard = Some(TopBaseline {
            stat,
            ticks,
        });

        Ok(CpuSnapshot {
            total: total_delta.usage(),
            cores,
            processes,
        })
    }

    fn sample_smaps(&self) -> Result<MemSnapshot> {
        let system = parse_meminfo(&fs::read_to_string(self.proc_root.join("meminfo"))?);

        let mut processes = Vec::new();
        for pid in self.pids()? {
            let Some(mut usage) = self.read_smaps(pid) else {
                continue;
            };
            // Kernel threads have no mappings.
            if usage.rss == 0 {
                continue;
            }
            let comm = fs::read_to_string(self.proc_root.join(pid.to_string()).join("comm"))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            usage.name = self.process_name(pid, &comm);
            processes.push(usage);

            if !self.smap_sleep.is_zero() {
                std::thread::sleep(self.smap_sleep);
            }
        }

        debug!(processes = processes.len(), "memory maps sampled");
        Ok(MemSnapshot { system, processes })
    }
}

/// Parse `/proc/stat`.
pub fn parse_stat(text: &str) -> Result<StatCounters> {
    let mut counters = StatCounters::default();
    let mut seen_total = false;

    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else {
            continue;
        };
        if !label.starts_with("cpu") {
            continue;
        }
        let values: Vec<u64> = fields.map(|v| v.parse().unwrap_or(0)).collect();
        let at = |i: usize| values.get(i).copied().unwrap_or(0);
        let times = CpuTimes {
            user: at(0),
            nice: at(1),
            system: at(2),
            idle: at(3),
            iowait: at(4),
            irq: at(5),
            softirq: at(6),
            steal: at(7),
        };
        if label == "cpu" {
            counters.total = times;
            seen_total = true;
        } else {
            counters.cores.push(times);
        }
    }

    if !seen_total {
        return Err(anyhow::anyhow!("no aggregate cpu line in stat").into());
    }
    Ok(counters)
}

/// Parse `/proc/<pid>/stat`.
///
/// `comm` may itself contain spaces and parentheses, so the fields are
/// located from the last `)`.
pub fn parse_pid_stat(text: &str) -> Option<ProcStat> {
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    let pid = text[..open].trim().parse().ok()?;
    let comm = text.get(open + 1..close)?.to_string();
    let rest: Vec<&str> = text.get(close + 1..)?.split_whitespace().collect();

    Some(ProcStat {
        pid,
        comm,
        state: rest.first()?.to_string(),
        utime: rest.get(11)?.parse().ok()?,
        stime: rest.get(12)?.parse().ok()?,
        nice: rest.get(16)?.parse().ok()?,
    })
}

/// Sum the kB fields of `smaps` / `smaps_rollup`.
pub fn parse_smaps(text: &str) -> ProcMemUsage {
    let mut usage = ProcMemUsage::default();
    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kb) = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<i64>().ok())
        else {
            continue;
        };
        match key.trim() {
            "Rss" => usage.rss += kb,
            "Pss" => usage.pss += kb,
            "Shared_Clean" => usage.shared_clean += kb,
            "Shared_Dirty" => usage.shared_dirty += kb,
            "Private_Clean" => usage.private_clean += kb,
            "Private_Dirty" => usage.private_dirty += kb,
            _ => {}
        }
    }
    usage
}

/// Parse the summary fields of `/proc/meminfo`, in kB.
pub fn parse_meminfo(text: &str) -> SysMemUsage {
    let mut mem = SysMemUsage::default();
    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let kb = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        match key {
            "MemTotal" => mem.total = kb,
            "MemFree" => mem.free = kb,
            "MemAvailable" => mem.available = kb,
            "Buffers" => mem.buffers = kb,
            "Cached" => mem.cached = kb,
            _ => {}
        }
    }
    mem
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "\
cpu  100 0 50 800 50 0 0 0 0 0
cpu0 60 0 20 400 20 0 0 0 0 0
cpu1 40 0 30 400 30 0 0 0 0 0
intr 12345
ctxt 999
";

    const PID_STAT: &str = "42 (my (odd) proc) S 1 42 42 0 -1 4194560 \
100 0 0 0 7 3 0 0 20 -5 1 0 500 1000 200 18446744073709551615";

    #[test]
    fn stat_splits_total_and_cores() {
        let stat = parse_stat(STAT).unwrap();
        assert_eq!(stat.total.total(), 1000);
        assert_eq!(stat.cores.len(), 2);

        let usage = stat.total.usage();
        assert_eq!(usage.idle, 80.0);
        assert_eq!(usage.iowait, 5.0);
        assert_eq!(usage.busy, 15.0);
        assert_eq!(usage.usr, 10.0);
        assert_eq!(usage.sys, 5.0);
    }

    #[test]
    fn stat_without_cpu_line_is_rejected() {
        assert!(parse_stat("intr 1\n").is_err());
    }

    #[test]
    fn pid_stat_handles_parentheses_in_comm() {
        let p = parse_pid_stat(PID_STAT).unwrap();
        assert_eq!(p.pid, 42);
        assert_eq!(p.comm, "my (odd) proc");
        assert_eq!(p.state, "S");
        assert_eq!(p.utime, 7);
        assert_eq!(p.stime, 3);
        assert_eq!(p.nice, -5);
        assert_eq!(p.ticks(), 10);
    }

    #[test]
    fn smaps_fields_are_summed() {
        let text = "\
00400000-00452000 r-xp 00000000 08:02 173521 /usr/bin/dbus-daemon
Rss:                 100 kB
Pss:                  50 kB
Shared_Clean:         40 kB
Shared_Dirty:          0 kB
Private_Clean:        10 kB
Private_Dirty:        50 kB
00651000-00652000 r--p 00051000 08:02 173521 /usr/bin/dbus-daemon
Rss:                   4 kB
Pss:                   4 kB
Private_Dirty:         4 kB
";
        let usage = parse_smaps(text);
        assert_eq!(usage.rss, 104);
        assert_eq!(usage.pss, 54);
        assert_eq!(usage.shared_clean, 40);
        assert_eq!(usage.private_dirty, 54);
    }

    #[test]
    fn meminfo_summary() {
        let text = "\
MemTotal:        2048000 kB
MemFree:          512000 kB
MemAvailable:    1024000 kB
Buffers:           10000 kB
Cached:           300000 kB
SwapCached:            0 kB
";
        let mem = parse_meminfo(text);
        assert_eq!(mem.total, 2_048_000);
        assert_eq!(mem.free, 512_000);
        assert_eq!(mem.available, 1_024_000);
        assert_eq!(mem.buffers, 10_000);
        assert_eq!(mem.cached, 300_000);
    }

    fn fake_proc(root: &Path) {
        let proc = root.join("proc");
        fs::create_dir_all(proc.join("42")).unwrap();
        fs::create_dir_all(proc.join("7")).unwrap();
        fs::create_dir_all(proc.join("self")).unwrap();
        fs::write(proc.join("stat"), STAT).unwrap();
        fs::write(
            proc.join("meminfo"),
            "MemTotal: 1000 kB\nMemFree: 400 kB\n",
        )
        .unwrap();

        fs::write(proc.join("42/stat"), PID_STAT).unwrap();
        fs::write(proc.join("42/cmdline"), b"/bin/worker\0--fast\0").unwrap();
        fs::write(proc.join("42/comm"), "worker\n").unwrap();
        fs::write(proc.join("42/smaps_rollup"), "Rss: 300 kB\nPss: 200 kB\n").unwrap();

        // Kernel thread: no cmdline, no mappings.
        fs::write(
            proc.join("7/stat"),
            "7 (kworker/0:1) I 2 0 0 0 -1 0 0 0 0 0 0 0 0 0 20 0 1 0 5 0 0 0",
        )
        .unwrap();
        fs::write(proc.join("7/cmdline"), b"").unwrap();
        fs::write(proc.join("7/smaps_rollup"), "Rss: 0 kB\n").unwrap();
    }

    #[test]
    fn top_sample_reads_sysroot_proc_tree() {
        let dir = tempfile::tempdir().unwrap();
        fake_proc(dir.path());
        let sampler = ProcfsSampler::new(dir.path(), Duration::ZERO);

        let snap = sampler.sample_top().unwrap();
        assert_eq!(snap.cores.len(), 2);
        assert_eq!(snap.total.busy, 15.0);

        let names: Vec<_> = snap.processes.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["kworker/0:1", "/bin/worker --fast"]);
        let worker = &snap.processes[1];
        assert_eq!(worker.ticks, 10);
        assert_eq!(worker.cpu_usage, 1.0);
    }

    #[test]
    fn second_top_sample_uses_deltas() {
        let dir = tempfile::tempdir().unwrap();
        fake_proc(dir.path());
        let sampler = ProcfsSampler::new(dir.path(), Duration::ZERO);
        sampler.sample_top().unwrap();

        // Nothing moved: zero window, zero usage.
        let snap = sampler.sample_top().unwrap();
        assert_eq!(snap.total, CpuCoreUsage::default());
        assert!(snap.processes.iter().all(|p| p.cpu_usage == 0.0));
    }

    #[test]
    fn smap_sample_skips_kernel_threads() {
        let dir = tempfile::tempdir().unwrap();
        fake_proc(dir.path());
        let sampler = ProcfsSampler::new(dir.path(), Duration::ZERO);

        let snap = sampler.sample_smaps().unwrap();
        assert_eq!(snap.system.total, 1000);
        assert_eq!(snap.processes.len(), 1);
        assert_eq!(snap.processes[0].pid, 42);
        assert_eq!(snap.processes[0].rss, 300);
        assert_eq!(snap.processes[0].name, "/bin/worker --fast");
    }

    #[test]
    fn missing_proc_tree_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sampler = ProcfsSampler::new(dir.path(), Duration::ZERO);
        assert!(sampler.sample_top().is_err());
        assert!(sampler.sample_smaps().is_err());
    }
}
