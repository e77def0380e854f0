use std::future;
use std::sync::{Arc, Mutex};

use fleet_agent::message::OutboundMessage;
use fleet_agent::transport::{SendAck, SendResult, Transport};

/// A fake transport that:
/// - decodes and records every outbound frame
/// - acknowledges each one with a configurable `SendResult`.
#[derive(Debug, Clone)]
pub struct FakeTransport {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    result: Arc<Mutex<SendResult>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            result: Arc::new(Mutex::new(SendResult::Delivered)),
        }
    }

    /// Acknowledge subsequent frames with `result`.
    pub fn respond_with(&self, result: SendResult) {
        *self.result.lock().unwrap() = result;
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Take everything sent so far.
    pub fn drain(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for FakeTransport {
    fn send(&mut self, frame: String) -> SendAck {
        let message: OutboundMessage =
            serde_json::from_str(&frame).expect("runtime sent an undecodable frame");
        self.sent.lock().unwrap().push(message);
        let result = self.result.lock().unwrap().clone();
        Box::pin(future::ready(result))
    }
}
