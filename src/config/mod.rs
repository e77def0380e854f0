// src/config/mod.rs

//! Configuration loading and validation for the agent.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load the config file and the local task descriptor (`loader.rs`).
//! - Merge CLI overrides and validate the result (`validate.rs`).
//!
//! The resolved [`Settings`] are built once at startup and passed down
//! explicitly.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{CliArgs, LogLevel};
use crate::errors::Result;

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_local_task};
pub use model::{
    AgentConfigFile, AgentSection, CollectSection, CrashSection, DeviceSection, ServerSection,
};
pub use validate::validate_settings;

/// `host:port` of the control server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Crash harvesting settings, with scan directories fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashSettings {
    /// `None` disables crash scanning.
    pub upload_url: Option<String>,
    pub scan_dirs: Vec<PathBuf>,
    pub suffixes: Vec<String>,
    pub interval: Duration,
    pub pause: Duration,
}

/// Effective agent settings after merging file and CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub sysroot: PathBuf,
    pub disable_upload: bool,
    pub script_dir: PathBuf,
    pub task_json: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<LogLevel>,
    pub nice: i32,
    /// `None` runs the agent offline.
    pub server: Option<ServerEndpoint>,
    pub reconnect_delay: Duration,
    pub serial: Option<String>,
    pub hardware: Option<String>,
    pub firmware_version: Option<String>,
    pub flush_interval: Duration,
    pub top_interval: Duration,
    pub smap_interval: Duration,
    pub smap_sleep: Duration,
    pub worker_threads: usize,
    pub kill_grace: Duration,
    pub crash: CrashSettings,
}

impl Settings {
    /// Merge `args` over `file` and validate the result.
    pub fn resolve(file: AgentConfigFile, args: &CliArgs) -> Result<Self> {
        let AgentConfigFile {
            agent,
            server,
            device,
            collect,
            crash,
        } = file;

        let sysroot = args
            .sysroot
            .clone()
            .or(agent.sysroot)
            .unwrap_or_else(|| PathBuf::from("/"));

        let address = non_empty(args.server_address.clone()).or(non_empty(server.address));
        let port = args.server_port.or(server.port);
        let endpoint = validate::server_endpoint(address, port)?;

        let mut scan_dirs = crash.scan_dirs;
        if let Some(dir) = crash.coredump_dir {
            scan_dirs.push(under_sysroot(&sysroot, &dir));
        }

        let ms = Duration::from_millis;
        let settings = Settings {
            disable_upload: args.disable_upload || agent.disable_upload,
            script_dir: args
                .unzip_root
                .clone()
                .or(agent.script_dir)
                .unwrap_or_else(std::env::temp_dir),
            task_json: args.task_json.clone().or(agent.task_json),
            log_dir: args.log_dir.clone().or(agent.log_dir),
            log_level: args.log_level,
            nice: agent.nice,
            server: endpoint,
            reconnect_delay: ms(server.reconnect_delay_ms),
            serial: non_empty(args.sn.clone()).or(non_empty(device.sn)),
            hardware: non_empty(args.hardware.clone()).or(non_empty(device.hardware)),
            firmware_version: non_empty(device.firmware_version),
            flush_interval: ms(collect.flush_interval_ms),
            top_interval: ms(args.top_interval.unwrap_or(collect.top_interval_ms)),
            smap_interval: ms(args.smap_interval.unwrap_or(collect.smap_interval_ms)),
            smap_sleep: ms(args.smap_sleep.unwrap_or(collect.smap_sleep_ms)),
            worker_threads: collect.worker_threads,
            kill_grace: ms(collect.kill_grace_ms),
            crash: CrashSettings {
                upload_url: non_empty(args.upload_url.clone()).or(non_empty(crash.upload_url)),
                scan_dirs,
                suffixes: crash.suffixes,
                interval: ms(crash.interval_ms),
                pause: ms(crash.pause_ms),
            },
            sysroot,
        };

        validate_settings(&settings)?;
        Ok(settings)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Join `dir` under `sysroot` even when `dir` is absolute.
fn under_sysroot(sysroot: &Path, dir: &Path) -> PathBuf {
    sysroot.join(dir.strip_prefix("/").unwrap_or(dir))
}
