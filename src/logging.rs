// src/logging.rs

//! Log output for the agent, built on `tracing-subscriber`.
//!
//! The level comes from `--log-level`, else from `FLEET_AGENT_LOG`, else
//! `info`. Output goes to stderr unless a log directory is configured, in
//! which case it is appended to `fleet-agent.log` there. An unusable log
//! directory is fatal: the agent must not run unattended without its log.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// File name used inside the log directory.
pub const LOG_FILE_NAME: &str = "fleet-agent.log";

/// Environment variable consulted when no CLI level is given.
pub const LOG_ENV: &str = "FLEET_AGENT_LOG";

/// Install the global subscriber. Call once, before the runtime starts.
pub fn init_logging(cli_level: Option<LogLevel>, log_dir: Option<&Path>) -> Result<()> {
    let level = cli_level
        .map(Level::from)
        .or_else(|| env_level(std::env::var(LOG_ENV).ok().as_deref()))
        .unwrap_or(Level::INFO);

    let subscriber = fmt().with_max_level(level).with_target(true);

    let Some(dir) = log_dir else {
        return subscriber
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow!(e));
    };

    fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;
    let path = dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    subscriber
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow!(e))
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// `Level`'s own parser, plus the common "warning" spelling.
fn env_level(value: Option<&str>) -> Option<Level> {
    let value = value?.trim();
    if value.eq_ignore_ascii_case("warning") {
        return Some(Level::WARN);
    }
    value.parse().ok()
}
