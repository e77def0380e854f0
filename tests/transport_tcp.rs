// tests/transport_tcp.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use fleet_agent::engine::RuntimeEvent;
use fleet_agent::transport::{SendResult, TcpTransport, Transport, TransportEvent};
use fleet_agent_test_utils::{with_timeout, TaskCommandBuilder};

type TestResult = Result<(), Box<dyn Error>>;

const CHANNEL_PATH: &str = "/websocket/SN7/kamino";

async fn next_transport_event(rx: &mut mpsc::Receiver<RuntimeEvent>) -> TransportEvent {
    match with_timeout(rx.recv()).await {
        Some(RuntimeEvent::Transport(ev)) => ev,
        other => panic!("expected transport event, got {other:?}"),
    }
}

#[tokio::test]
async fn frames_flow_both_ways_and_reconnect() -> TestResult {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = listener.local_addr()?.to_string();
    let (tx, mut rx) = mpsc::channel(16);
    let mut transport = TcpTransport::spawn(
        endpoint,
        CHANNEL_PATH.to_string(),
        Duration::from_millis(50),
        tx,
    );

    let (socket, _) = with_timeout(listener.accept()).await?;
    assert_eq!(next_transport_event(&mut rx).await, TransportEvent::Connected);

    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();

    // The device announces itself before anything else.
    let line = with_timeout(lines.next_line()).await?;
    assert_eq!(line.as_deref(), Some(CHANNEL_PATH));

    // Server -> agent, blank lines are skipped.
    let command = TaskCommandBuilder::start(7).frame();
    write.write_all(b"\n").await?;
    write.write_all(format!("{command}\n").as_bytes()).await?;
    assert_eq!(
        next_transport_event(&mut rx).await,
        TransportEvent::Message(command)
    );

    // Agent -> server, with a delivery acknowledgement.
    let ack = transport.send(r#"{"type":"DEVICE_STATUS"}"#.to_string());
    assert_eq!(with_timeout(ack).await, SendResult::Delivered);
    let line = with_timeout(lines.next_line()).await?;
    assert_eq!(line.as_deref(), Some(r#"{"type":"DEVICE_STATUS"}"#));

    // Dropping the connection is reported and the transport reconnects.
    drop(lines);
    drop(write);
    assert_eq!(
        next_transport_event(&mut rx).await,
        TransportEvent::Disconnected
    );
    let (socket, _) = with_timeout(listener.accept()).await?;
    assert_eq!(next_transport_event(&mut rx).await, TransportEvent::Connected);
    let mut lines = BufReader::new(socket).lines();
    let line = with_timeout(lines.next_line()).await?;
    assert_eq!(line.as_deref(), Some(CHANNEL_PATH));

    drop(transport);
    Ok(())
}

#[tokio::test]
async fn frames_sent_while_offline_fail() -> TestResult {
    init_tracing();
    // Reserve a port, then close it so connecting is refused.
    let endpoint = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?.to_string()
    };
    let (tx, _rx) = mpsc::channel(16);
    let mut transport = TcpTransport::spawn(
        endpoint,
        CHANNEL_PATH.to_string(),
        Duration::from_millis(200),
        tx,
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    let ack = transport.send("{}".to_string());
    match with_timeout(ack).await {
        SendResult::Failed(reason) => assert_eq!(reason, "not connected"),
        SendResult::Delivered => panic!("frame delivered without a server"),
    }
    Ok(())
}
