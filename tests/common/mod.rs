#![allow(dead_code)]

use std::time::Duration;

use fleet_agent::engine::{CoreOptions, CoreRuntime, CoreStep, RuntimeEvent};
use fleet_agent::identity::DeviceIdentity;
use fleet_agent::message::OutboundMessage;
use fleet_agent::model::JobPlan;
use fleet_agent::transport::TransportEvent;

pub use fleet_agent_test_utils::init_tracing;

pub const FLUSH_EVERY: Duration = Duration::from_millis(5000);

pub fn identity() -> DeviceIdentity {
    DeviceIdentity {
        serial: "SN-TEST".to_string(),
        hardware: "bench".to_string(),
        firmware_version: "1.0.0".to_string(),
    }
}

pub fn options(disable_upload: bool) -> CoreOptions {
    CoreOptions {
        disable_upload,
        flush_interval: FLUSH_EVERY,
        plan: JobPlan::default(),
        identity: identity(),
    }
}

pub fn core() -> CoreRuntime {
    CoreRuntime::new(options(false))
}

pub fn frame(text: String) -> RuntimeEvent {
    RuntimeEvent::Transport(TransportEvent::Message(text))
}

/// Messages a step asks the shell to send, in order.
pub fn sent(step: &CoreStep) -> Vec<OutboundMessage> {
    step.commands
        .iter()
        .filter_map(|c| match c {
            fleet_agent::engine::CoreCommand::Send(m) => Some(m.clone()),
            _ => None,
        })
        .collect()
}
