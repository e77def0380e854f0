// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Agent configuration as read from a TOML file.
///
/// ```toml
/// [agent]
/// sysroot = "/"
/// disable_upload = false
///
/// [server]
/// address = "10.0.0.2"
/// port = 9000
///
/// [device]
/// sn = "SN0001"
///
/// [collect]
/// top_interval_ms = 1000
/// smap_interval_ms = 5000
///
/// [crash]
/// upload_url = "http://crash.example.com"
/// coredump_dir = "/var/crash"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfigFile {
    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub device: DeviceSection,

    #[serde(default)]
    pub collect: CollectSection,

    #[serde(default)]
    pub crash: CrashSection,
}

/// `[agent]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// Root under which `/proc` and the coredump directory are read.
    #[serde(default)]
    pub sysroot: Option<PathBuf>,

    /// Collect telemetry but never send it.
    #[serde(default)]
    pub disable_upload: bool,

    /// Where task scripts are written. Defaults to the system temp dir.
    #[serde(default)]
    pub script_dir: Option<PathBuf>,

    /// Local task descriptor started at boot.
    #[serde(default)]
    pub task_json: Option<PathBuf>,

    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Niceness applied to the agent's process group at startup.
    #[serde(default = "default_nice")]
    pub nice: i32,
}

fn default_nice() -> i32 {
    19
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            sysroot: None,
            disable_upload: false,
            script_dir: None,
            task_json: None,
            log_dir: None,
            nice: default_nice(),
        }
    }
}

/// `[server]` section. Without an address the agent runs offline.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: None,
            port: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

/// `[device]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceSection {
    #[serde(default)]
    pub sn: Option<String>,

    #[serde(default)]
    pub hardware: Option<String>,

    #[serde(default)]
    pub firmware_version: Option<String>,
}

/// `[collect]` section: telemetry cadence and worker pool sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectSection {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_top_interval_ms")]
    pub top_interval_ms: u64,

    #[serde(default = "default_smap_interval_ms")]
    pub smap_interval_ms: u64,

    #[serde(default)]
    pub smap_sleep_ms: u64,

    /// Upper bound of the blocking pool running the samplers.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Time a task script gets between SIGTERM and SIGKILL.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_top_interval_ms() -> u64 {
    1000
}

fn default_smap_interval_ms() -> u64 {
    5000
}

fn default_worker_threads() -> usize {
    4
}

fn default_kill_grace_ms() -> u64 {
    5000
}

impl Default for CollectSection {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            top_interval_ms: default_top_interval_ms(),
            smap_interval_ms: default_smap_interval_ms(),
            smap_sleep_ms: 0,
            worker_threads: default_worker_threads(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

/// `[crash]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CrashSection {
    /// Crash scanning runs only when this is set.
    #[serde(default)]
    pub upload_url: Option<String>,

    #[serde(default = "default_scan_dirs")]
    pub scan_dirs: Vec<PathBuf>,

    /// Extra scan directory, resolved under the sysroot.
    #[serde(default)]
    pub coredump_dir: Option<PathBuf>,

    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,

    #[serde(default = "default_crash_interval_ms")]
    pub interval_ms: u64,

    /// Pause between two uploads.
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

fn default_scan_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("/data")]
}

fn default_suffixes() -> Vec<String> {
    vec!["core".to_string()]
}

fn default_crash_interval_ms() -> u64 {
    60_000
}

fn default_pause_ms() -> u64 {
    1000
}

impl Default for CrashSection {
    fn default() -> Self {
        Self {
            upload_url: None,
            scan_dirs: default_scan_dirs(),
            coredump_dir: None,
            suffixes: default_suffixes(),
            interval_ms: default_crash_interval_ms(),
            pause_ms: default_pause_ms(),
        }
    }
}
