// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Every flag overrides the matching entry of the optional TOML config file.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `fleet-agent`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "fleet-agent",
    version,
    about = "Remote task execution and telemetry agent for embedded devices.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the agent config file (TOML).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Root under which `/proc` and the coredump directory are read.
    #[arg(long, value_name = "DIR")]
    pub sysroot: Option<PathBuf>,

    /// Start a task from this local JSON descriptor at startup.
    #[arg(long, value_name = "PATH")]
    pub task_json: Option<PathBuf>,

    /// Collect telemetry but never send it.
    #[arg(long)]
    pub disable_upload: bool,

    /// Control server host name or address.
    #[arg(long, value_name = "HOST")]
    pub server_address: Option<String>,

    /// Control server TCP port.
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Device serial number reported to the server.
    #[arg(long, value_name = "SN")]
    pub sn: Option<String>,

    /// Hardware identifier.
    #[arg(long, value_name = "NAME")]
    pub hardware: Option<String>,

    /// Directory task scripts are written to.
    #[arg(long, value_name = "DIR")]
    pub unzip_root: Option<PathBuf>,

    /// Period of the memory-map collector, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub smap_interval: Option<u64>,

    /// Pause after sampling each process's memory map, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub smap_sleep: Option<u64>,

    /// Period of the CPU-top collector, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub top_interval: Option<u64>,

    /// Base URL crash artifacts are uploaded to. Crash scanning is off
    /// without it.
    #[arg(long, value_name = "URL")]
    pub upload_url: Option<String>,

    /// Append logs to `fleet-agent.log` in this directory instead of stderr.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLEET_AGENT_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse() {
        let args = CliArgs::try_parse_from([
            "fleet-agent",
            "--sysroot",
            "/mnt/root",
            "--disable-upload",
            "--server-address",
            "10.0.0.2",
            "--server-port",
            "9000",
            "--smap-interval",
            "2000",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.sysroot, Some(PathBuf::from("/mnt/root")));
        assert!(args.disable_upload);
        assert_eq!(args.server_port, Some(9000));
        assert_eq!(args.smap_interval, Some(2000));
        assert_eq!(args.log_level, Some(LogLevel::Debug));
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(CliArgs::try_parse_from(["fleet-agent", "--server-port", "99999"]).is_err());
    }
}
