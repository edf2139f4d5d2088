//! Client request engine.
//!
//! Every request runs over its own ephemeral UDP socket, connected to
//! the broker address; that connection is what correlates the reply
//! with the request (the kernel drops datagrams from any other peer),
//! so no request ID travels in the payload. A request that asks for a
//! response races one reply against a fixed timeout; a fire-and-forget
//! request returns as soon as the datagram is sent, checking only for
//! an error reply that may already have raced in.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time;
use tracing::debug;

use crate::message::{Message, Reply};

/// How long a response-requesting call waits for the broker.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest reply datagram the client will read.
const MAX_REPLY: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    /// A response was requested but none arrived inside the window.
    #[error("no reply from the broker within the response window")]
    Timeout,
    /// The broker (or its handler) answered with a `-` reply; the
    /// detail text follows the sigil.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// The reply datagram carried no `+`/`-` sigil.
    #[error("reply carried no +/- sigil")]
    MalformedReply,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Sends messages to one broker address, one ephemeral socket per call.
pub struct RequestClient {
    broker: SocketAddr,
    timeout: Duration,
}

impl RequestClient {
    pub fn new(broker: SocketAddr) -> Self {
        Self {
            broker,
            timeout: RESPONSE_TIMEOUT,
        }
    }

    /// Same engine with a shorter (or longer) response window; tests
    /// use this to avoid waiting out the full second.
    pub fn with_timeout(broker: SocketAddr, timeout: Duration) -> Self {
        Self { broker, timeout }
    }

    /// Sends one message. `Ok(Some(detail))` is a positive
    /// acknowledgement; `Ok(None)` is a fire-and-forget send that saw
    /// no error. The socket is dropped on every exit path.
    pub async fn send(&self, message: &Message) -> Result<Option<String>, ClientError> {
        let socket = UdpSocket::bind(self.local_addr()).await?;
        socket.connect(self.broker).await?;
        socket.send(&message.encode()).await?;
        debug!(broker = %self.broker, stream = %message.stream, "sent request");

        if message.response.requested() {
            self.await_reply(&socket).await
        } else {
            check_raced_error(&socket)
        }
    }

    async fn await_reply(&self, socket: &UdpSocket) -> Result<Option<String>, ClientError> {
        let mut buf = vec![0u8; MAX_REPLY];
        let len = time::timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| ClientError::Timeout)??;
        match Reply::parse(&buf[..len]) {
            Some(Reply::Ok(detail)) => Ok(Some(detail)),
            Some(Reply::Failure(detail)) => Err(ClientError::Rejected(detail)),
            None => Err(ClientError::MalformedReply),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        // Ephemeral port in the broker's address family.
        if self.broker.is_ipv4() {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
        } else {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
        }
    }
}

/// Fire-and-forget close race: the broker reports format errors even
/// to senders that declined a response, so an error reply may already
/// be queued by the time the send returns. Surface it if it is;
/// otherwise succeed without waiting.
fn check_raced_error(socket: &UdpSocket) -> Result<Option<String>, ClientError> {
    let mut buf = vec![0u8; MAX_REPLY];
    match socket.try_recv(&mut buf) {
        Ok(len) => match Reply::parse(&buf[..len]) {
            Some(Reply::Failure(detail)) => Err(ClientError::Rejected(detail)),
            _ => Ok(None),
        },
        Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(err) => Err(err.into()),
    }
}
