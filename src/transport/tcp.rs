// src/transport/tcp.rs

//! Reconnecting newline-delimited JSON transport over TCP.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::RuntimeEvent;

use super::{SendAck, SendResult, Transport, TransportEvent};

/// Longest accepted frame, in bytes.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

const OUTGOING_QUEUE: usize = 64;

struct Outgoing {
    frame: String,
    ack: oneshot::Sender<SendResult>,
}

/// Handle to the background connection task.
///
/// Every new connection starts with one line carrying the device's channel
/// path, before any message frame.
///
/// Dropping the handle stops the connection task.
#[derive(Debug)]
pub struct TcpTransport {
    outgoing: mpsc::Sender<Outgoing>,
    cancel: CancellationToken,
}

impl TcpTransport {
    /// Spawn the connection task on the current runtime.
    ///
    /// Connectivity changes and inbound frames are delivered on `events`.
    /// The task keeps reconnecting every `reconnect_delay` until the handle
    /// is dropped or the event channel closes.
    pub fn spawn(
        endpoint: String,
        channel_path: String,
        reconnect_delay: Duration,
        events: mpsc::Sender<RuntimeEvent>,
    ) -> Self {
        let (outgoing, rx) = mpsc::channel(OUTGOING_QUEUE);
        let cancel = CancellationToken::new();
        tokio::spawn(connection_loop(
            endpoint,
            channel_path,
            reconnect_delay,
            events,
            rx,
            cancel.clone(),
        ));
        Self { outgoing, cancel }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, frame: String) -> SendAck {
        let (ack, ack_rx) = oneshot::channel();
        let queued = self.outgoing.try_send(Outgoing { frame, ack });
        Box::pin(async move {
            if let Err(e) = queued {
                return SendResult::Failed(format!("outgoing queue unavailable: {e}"));
            }
            ack_rx
                .await
                .unwrap_or_else(|_| SendResult::Failed("connection task gone".to_string()))
        })
    }
}

enum SessionEnd {
    Disconnected,
    Shutdown,
}

async fn connection_loop(
    endpoint: String,
    channel_path: String,
    reconnect_delay: Duration,
    events: mpsc::Sender<RuntimeEvent>,
    mut outgoing: mpsc::Receiver<Outgoing>,
    cancel: CancellationToken,
) {
    info!(%endpoint, "transport started");

    loop {
        let connect = tokio::select! {
            _ = cancel.cancelled() => break,
            res = TcpStream::connect(&endpoint) => res,
        };

        match connect {
            Ok(stream) => {
                info!(%endpoint, "connected to server");
                if emit(&events, TransportEvent::Connected).await.is_err() {
                    break;
                }
                match session(stream, &channel_path, &events, &mut outgoing, &cancel).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Disconnected => {
                        if emit(&events, TransportEvent::Disconnected).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                debug!(%endpoint, error = %e, "connect failed");
            }
        }

        if !wait_offline(reconnect_delay, &mut outgoing, &cancel).await {
            break;
        }
    }

    info!(%endpoint, "transport stopped");
}

/// Pump one established connection until it drops or the transport stops.
async fn session(
    stream: TcpStream,
    channel_path: &str,
    events: &mpsc::Sender<RuntimeEvent>,
    outgoing: &mut mpsc::Receiver<Outgoing>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (r, w) = stream.into_split();
    let mut reader = FramedRead::new(r, LinesCodec::new_with_max_length(MAX_FRAME_BYTES));
    let mut writer = FramedWrite::new(w, LinesCodec::new_with_max_length(MAX_FRAME_BYTES));

    if let Err(e) = writer.send(channel_path).await {
        warn!(error = %e, "cannot announce channel path; dropping connection");
        return SessionEnd::Disconnected;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Shutdown,

            line = reader.next() => match line {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if emit(events, TransportEvent::Message(line)).await.is_err() {
                        return SessionEnd::Shutdown;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "read failed; dropping connection");
                    return SessionEnd::Disconnected;
                }
                None => {
                    info!("server closed the connection");
                    return SessionEnd::Disconnected;
                }
            },

            out = outgoing.recv() => {
                let Some(Outgoing { frame, ack }) = out else {
                    return SessionEnd::Shutdown;
                };
                match writer.send(frame).await {
                    Ok(()) => {
                        let _ = ack.send(SendResult::Delivered);
                    }
                    Err(e) => {
                        let _ = ack.send(SendResult::Failed(e.to_string()));
                        warn!(error = %e, "write failed; dropping connection");
                        return SessionEnd::Disconnected;
                    }
                }
            }
        }
    }
}

/// Sleep before reconnecting, failing any frame sent in the meantime.
///
/// Returns `false` when the transport should stop.
async fn wait_offline(
    delay: Duration,
    outgoing: &mut mpsc::Receiver<Outgoing>,
    cancel: &CancellationToken,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = &mut sleep => return true,
            out = outgoing.recv() => match out {
                Some(Outgoing { ack, .. }) => {
                    let _ = ack.send(SendResult::Failed("not connected".to_string()));
                }
                None => return false,
            },
        }
    }
}

async fn emit(
    events: &mpsc::Sender<RuntimeEvent>,
    event: TransportEvent,
) -> Result<(), mpsc::error::SendError<RuntimeEvent>> {
    events.send(RuntimeEvent::Transport(event)).await
}
