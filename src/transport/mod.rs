// src/transport/mod.rs

//! Message transport to the control server.
//!
//! The orchestrator never owns a socket. It sees the server only through:
//! - [`TransportEvent`]s delivered on the reactor event channel
//! - [`Transport::send`], which hands off one encoded frame and returns a
//!   future resolving to the delivery acknowledgement
//!
//! [`tcp::TcpTransport`] is the production implementation; tests use a fake
//! that records frames.

use std::future::{self, Future};
use std::pin::Pin;

use tracing::debug;

pub mod tcp;

pub use tcp::TcpTransport;

/// Connectivity change or inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// One raw inbound frame (a JSON document).
    Message(String),
}

/// Per-frame delivery acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    Delivered,
    Failed(String),
}

/// Future resolving to the acknowledgement of one frame.
pub type SendAck = Pin<Box<dyn Future<Output = SendResult> + Send + 'static>>;

/// Outbound half of the server connection.
///
/// `send` must not block the reactor: it queues the frame and returns at
/// once. The returned future does not borrow the transport, so the caller
/// can await it on a separate task.
pub trait Transport: Send {
    fn send(&mut self, frame: String) -> SendAck;
}

/// Transport used when no server endpoint is configured.
///
/// Every frame is dropped and acknowledged as failed.
#[derive(Debug, Default)]
pub struct OfflineTransport;

impl Transport for OfflineTransport {
    fn send(&mut self, frame: String) -> SendAck {
        debug!(bytes = frame.len(), "no server configured; dropping frame");
        Box::pin(future::ready(SendResult::Failed(
            "no server configured".to_string(),
        )))
    }
}
