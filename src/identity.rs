// src/identity.rs

//! Device identity reported to the server and attached to crash uploads.

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub serial: String,
    pub hardware: String,
    pub firmware_version: String,
}

impl DeviceIdentity {
    /// Resolve identity from explicit overrides, falling back to the host
    /// name for the serial.
    pub fn resolve(
        serial: Option<String>,
        hardware: Option<String>,
        firmware_version: Option<String>,
    ) -> Self {
        let serial = serial
            .filter(|s| !s.is_empty())
            .unwrap_or_else(host_serial);
        Self {
            serial,
            hardware: hardware
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            firmware_version: firmware_version
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        }
    }

    /// Path announced when connecting to the server, identifying this device.
    pub fn channel_path(&self) -> String {
        format!("/websocket/{}/{}", self.serial, self.hardware)
    }
}

fn host_serial() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!(error = %e, "cannot read host name; using placeholder serial");
            "unknown".to_string()
        }
    }
}
