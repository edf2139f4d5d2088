use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures::future::BoxFuture;
use streamgram::{
    broker::Broker,
    client::{ClientError, RequestClient},
    dispatch::Dispatcher,
    message::Message,
    stream::{StreamHandler, StreamTable},
};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

const TEST_WINDOW: Duration = Duration::from_secs(1);

/// Records every message it is asked to write and acknowledges with a
/// fixed reply.
struct RecordingHandler {
    seen: mpsc::UnboundedSender<Message>,
    reply: String,
}

impl StreamHandler for RecordingHandler {
    fn write<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let _ = self.seen.send(message.clone());
            Ok(self.reply.clone())
        })
    }
}

struct FailingHandler;

impl StreamHandler for FailingHandler {
    fn write<'a>(&'a self, _message: &'a Message) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { bail!("backend unavailable") })
    }
}

struct RunningBroker {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<()>,
}

impl RunningBroker {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.server.await;
    }
}

async fn start_broker(table: StreamTable) -> Result<RunningBroker> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let broker = Broker::new(socket, Dispatcher::new(Arc::new(table)));
    let addr = broker.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        let _ = broker.run_until(shutdown).await;
    });

    Ok(RunningBroker {
        addr,
        shutdown: shutdown_tx,
        server,
    })
}

fn logs_table(reply: &str) -> (StreamTable, mpsc::UnboundedReceiver<Message>) {
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let table = StreamTable::from_handlers([(
        "logs".to_string(),
        Arc::new(RecordingHandler {
            seen: seen_tx,
            reply: reply.to_string(),
        }) as Arc<dyn StreamHandler>,
    )])
    .expect("build table");
    (table, seen_rx)
}

#[tokio::test]
async fn dispatches_to_registered_stream_and_forwards_reply() -> Result<()> {
    let (table, mut seen) = logs_table("+Ok");
    let broker = start_broker(table).await?;

    let client = RequestClient::new(broker.addr);
    let message = Message::new("alice", "logs", "hello world", true);
    let outcome = client.send(&message).await?;
    assert_eq!(outcome, Some("Ok".to_string()));

    let delivered = timeout(TEST_WINDOW, seen.recv())
        .await?
        .expect("handler should see the message");
    assert_eq!(delivered.source, "alice");
    assert_eq!(delivered.body, "hello world");

    broker.stop().await;
    Ok(())
}

#[tokio::test]
async fn multiline_body_survives_the_wire() -> Result<()> {
    let (table, mut seen) = logs_table("+Ok");
    let broker = start_broker(table).await?;

    let client = RequestClient::new(broker.addr);
    let message = Message::new("alice", "logs", "line one\nline two\n\nline four", true);
    client.send(&message).await?;

    let delivered = timeout(TEST_WINDOW, seen.recv())
        .await?
        .expect("handler should see the message");
    assert_eq!(delivered.body, "line one\nline two\n\nline four");

    broker.stop().await;
    Ok(())
}

#[tokio::test]
async fn unknown_stream_is_rejected() -> Result<()> {
    let (table, _seen) = logs_table("+Ok");
    let broker = start_broker(table).await?;

    let client = RequestClient::new(broker.addr);
    let message = Message::new("alice", "ghost", "hi", true);
    let err = client.send(&message).await.expect_err("should be rejected");
    match err {
        ClientError::Rejected(detail) => assert_eq!(detail, "No such stream"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    broker.stop().await;
    Ok(())
}

#[tokio::test]
async fn malformed_flag_is_rejected() -> Result<()> {
    let (table, _seen) = logs_table("+Ok");
    let broker = start_broker(table).await?;

    let reply = raw_exchange(broker.addr, b"alice\nlogs\nMaybe\nhi").await?;
    assert_eq!(reply, "-Incorrect value (field: responseRequested)");

    broker.stop().await;
    Ok(())
}

#[tokio::test]
async fn short_datagram_always_gets_format_error() -> Result<()> {
    let (table, _seen) = logs_table("+Ok");
    let broker = start_broker(table).await?;

    // Two fields only: the response flag never arrived, so the error
    // is reported regardless of what the sender might have wanted.
    let reply = raw_exchange(broker.addr, b"alice\nlogs").await?;
    assert_eq!(reply, "-Format error");

    broker.stop().await;
    Ok(())
}

#[tokio::test]
async fn declined_response_suppresses_rejection_replies() -> Result<()> {
    let (table, _seen) = logs_table("+Ok");
    let broker = start_broker(table).await?;

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.connect(broker.addr).await?;
    socket.send(b"alice\nghost\nFalse\nhi").await?;

    let mut buf = [0u8; 1024];
    let silent = timeout(Duration::from_millis(200), socket.recv(&mut buf)).await;
    assert!(silent.is_err(), "broker must stay quiet for a declined response");

    broker.stop().await;
    Ok(())
}

#[tokio::test]
async fn handler_failure_becomes_an_error_reply() -> Result<()> {
    let table = StreamTable::from_handlers([(
        "broken".to_string(),
        Arc::new(FailingHandler) as Arc<dyn StreamHandler>,
    )])
    .expect("build table");
    let broker = start_broker(table).await?;

    let client = RequestClient::new(broker.addr);
    let message = Message::new("alice", "broken", "hi", true);
    let err = client.send(&message).await.expect_err("should fail");
    match err {
        ClientError::Rejected(detail) => assert!(
            detail.starts_with("write failed"),
            "unexpected detail: {detail}"
        ),
        other => panic!("unexpected outcome: {other:?}"),
    }

    broker.stop().await;
    Ok(())
}

#[tokio::test]
async fn silent_broker_times_out_the_client() -> Result<()> {
    // A bound socket that never answers stands in for a dead broker.
    let sink = UdpSocket::bind("127.0.0.1:0").await?;
    let addr = sink.local_addr()?;

    let client = RequestClient::with_timeout(addr, Duration::from_millis(100));
    let message = Message::new("alice", "logs", "hello", true);
    let err = client.send(&message).await.expect_err("should time out");
    assert!(matches!(err, ClientError::Timeout));

    Ok(())
}

#[tokio::test]
async fn fire_and_forget_returns_without_payload() -> Result<()> {
    let (table, mut seen) = logs_table("+Ok");
    let broker = start_broker(table).await?;

    let client = RequestClient::new(broker.addr);
    let message = Message::new("alice", "logs", "quiet delivery", false);
    let outcome = client.send(&message).await?;
    assert_eq!(outcome, None);

    // The message still reaches the handler even though the caller
    // never waited for it.
    let delivered = timeout(TEST_WINDOW, seen.recv())
        .await?
        .expect("handler should see the message");
    assert_eq!(delivered.body, "quiet delivery");

    broker.stop().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_requests_all_complete() -> Result<()> {
    let (table, mut seen) = logs_table("+Ok");
    let broker = start_broker(table).await?;

    let mut calls = Vec::new();
    for n in 0..8 {
        let client = RequestClient::new(broker.addr);
        calls.push(tokio::spawn(async move {
            let message = Message::new("alice", "logs", format!("message {n}"), true);
            client.send(&message).await
        }));
    }
    for call in calls {
        let outcome = call.await?.expect("each request should be acknowledged");
        assert_eq!(outcome, Some("Ok".to_string()));
    }

    let mut bodies = Vec::new();
    for _ in 0..8 {
        let delivered = timeout(TEST_WINDOW, seen.recv())
            .await?
            .expect("handler should see every message");
        bodies.push(delivered.body);
    }
    bodies.sort();
    let expected: Vec<String> = (0..8).map(|n| format!("message {n}")).collect();
    assert_eq!(bodies, expected);

    broker.stop().await;
    Ok(())
}

/// Sends a raw payload from a fresh socket and reads one reply.
async fn raw_exchange(addr: SocketAddr, payload: &[u8]) -> Result<String> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.connect(addr).await?;
    socket.send(payload).await?;

    let mut buf = [0u8; 1024];
    let len = timeout(TEST_WINDOW, socket.recv(&mut buf)).await??;
    Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
}
