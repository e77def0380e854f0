// src/config/validate.rs

use std::time::Duration;

use crate::config::{ServerEndpoint, Settings};
use crate::errors::{AgentError, Result};

/// Check the invariants of merged settings.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    ensure_positive("collect.flush_interval_ms", settings.flush_interval)?;
    ensure_positive("collect.top_interval_ms", settings.top_interval)?;
    ensure_positive("collect.smap_interval_ms", settings.smap_interval)?;

    if settings.worker_threads == 0 {
        return Err(AgentError::Config(
            "[collect].worker_threads must be >= 1 (got 0)".to_string(),
        ));
    }

    if !(-20..=19).contains(&settings.nice) {
        return Err(AgentError::Config(format!(
            "[agent].nice must be within -20..=19 (got {})",
            settings.nice
        )));
    }

    if settings.crash.upload_url.is_some() {
        ensure_positive("crash.interval_ms", settings.crash.interval)?;
        if settings.crash.suffixes.iter().all(|s| s.is_empty()) {
            return Err(AgentError::Config(
                "[crash].suffixes must contain at least one non-empty suffix".to_string(),
            ));
        }
    }

    Ok(())
}

/// Build the server endpoint; address and port must be given together.
pub fn server_endpoint(address: Option<String>, port: Option<u16>) -> Result<Option<ServerEndpoint>> {
    match (address, port) {
        (Some(host), Some(port)) => Ok(Some(ServerEndpoint { host, port })),
        (None, None) => Ok(None),
        (Some(host), None) => Err(AgentError::Config(format!(
            "server address '{host}' given without a port"
        ))),
        (None, Some(port)) => Err(AgentError::Config(format!(
            "server port {port} given without an address"
        ))),
    }
}

fn ensure_positive(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(AgentError::Config(format!("{name} must be > 0 (got 0)")));
    }
    Ok(())
}
