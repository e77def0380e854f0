// src/message.rs

//! Wire messages exchanged with the control server.
//!
//! Every frame is a JSON object with a `type` tag used for dispatch on the
//! receiving side. Field accessors are plain struct fields.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::telemetry::TelemetryAggregate;
use crate::types::{DeviceState, TaskStatus};

/// Messages the server sends to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundMessage {
    TaskCommand(TaskCommand),
    /// Any message type this agent does not handle.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    Start,
    Cancel,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCommand {
    #[serde(rename = "taskType")]
    pub command: CommandKind,
    #[serde(default)]
    pub task_id: i64,
    #[serde(default)]
    pub shell_id: u32,
    #[serde(default)]
    pub shell_content: String,
    #[serde(default)]
    pub shell_type: String,
    /// Scheduled end, epoch ms; zero or absent means 24h from now.
    #[serde(default)]
    pub timestamp: u64,
}

/// Messages the agent sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    DeviceStatus(DeviceStatusReport),
    TaskStatus(TaskStatusReport),
    CollectData(TelemetryAggregate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusReport {
    pub timestamp: u64,
    pub sn: String,
    pub version: String,
    pub status: DeviceState,
    pub shell_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusReport {
    pub task_id: i64,
    pub shell_id: u32,
    pub timestamp: u64,
    pub status: TaskStatus,
    pub message: String,
}

impl InboundMessage {
    pub fn decode(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}

impl OutboundMessage {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::DeviceStatus(_) => "device_status",
            OutboundMessage::TaskStatus(_) => "task_status",
            OutboundMessage::CollectData(_) => "collect_data",
        }
    }
}
