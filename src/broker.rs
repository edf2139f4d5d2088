//! UDP listener and the per-datagram dispatch state machine.
//!
//! The receive loop decodes and validates each datagram inline (neither
//! step suspends), then hands valid messages to a spawned task so a
//! slow backend write never blocks the listener. Error replies for
//! undecodable or invalid datagrams are sent straight from the loop,
//! mirroring the dispatch rules:
//!
//! - decode failure: `-Format error`, sent unconditionally (the flag
//!   itself was unreadable);
//! - validation failure: rejection reply, unless the sender explicitly
//!   wrote `False`;
//! - dispatch result: handler reply forwarded verbatim, only when the
//!   sender wrote `True`.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::UdpSocket;
use tokio::select;
use tracing::{debug, info, warn};

use crate::dispatch::{Dispatcher, REPLY_FORMAT_ERROR};
use crate::message::Message;

/// Largest request datagram the broker will read. Anything longer is
/// truncated by the socket, which at worst garbles the body.
const MAX_DATAGRAM: usize = 64 * 1024;

pub struct Broker {
    socket: Arc<UdpSocket>,
    dispatcher: Arc<Dispatcher>,
}

impl Broker {
    pub fn new(socket: UdpSocket, dispatcher: Dispatcher) -> Self {
        Self {
            socket: Arc::new(socket),
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// The bound address, useful when binding port 0 in tests.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs the receive loop until the shutdown future resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Broker { socket, dispatcher } = self;
        tokio::pin!(shutdown);

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            select! {
                _ = &mut shutdown => {
                    info!("broker shutting down");
                    break;
                }
                received = socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => {
                            handle_datagram(&buf[..len], peer, &socket, &dispatcher).await;
                        }
                        Err(err) => warn!(error = ?err, "failed to receive datagram"),
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

async fn handle_datagram(
    payload: &[u8],
    peer: SocketAddr,
    socket: &Arc<UdpSocket>,
    dispatcher: &Arc<Dispatcher>,
) {
    let message = match Message::decode(payload) {
        Ok(message) => message,
        Err(err) => {
            debug!(peer = %peer, error = %err, "rejecting undecodable datagram");
            send_reply(socket, peer, REPLY_FORMAT_ERROR).await;
            return;
        }
    };

    if let Err(rejection) = dispatcher.validate(&message) {
        debug!(peer = %peer, stream = %message.stream, ?rejection, "rejecting message");
        if !message.response.declined() {
            send_reply(socket, peer, rejection.reply()).await;
        }
        return;
    }

    spawn_dispatch(message, peer, socket, dispatcher);
}

fn spawn_dispatch(
    message: Message,
    peer: SocketAddr,
    socket: &Arc<UdpSocket>,
    dispatcher: &Arc<Dispatcher>,
) {
    let socket = Arc::clone(socket);
    let dispatcher = Arc::clone(dispatcher);
    tokio::spawn(async move {
        // Handler failures become a `-` reply rather than a silently
        // dropped task, so a sender that asked for a response hears
        // about the failure.
        let reply = match dispatcher.dispatch(&message).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(peer = %peer, stream = %message.stream, error = ?err, "stream handler failed");
                format!("-write failed: {err}")
            }
        };
        if message.response.requested() {
            send_reply(&socket, peer, &reply).await;
        }
    });
}

async fn send_reply(socket: &UdpSocket, peer: SocketAddr, reply: &str) {
    if let Err(err) = socket.send_to(reply.as_bytes(), peer).await {
        warn!(peer = %peer, error = ?err, "failed to send reply");
    }
}
