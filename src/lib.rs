//! Connectionless UDP message broker.
//!
//! Clients send a short text command as a single datagram; the broker
//! validates it, routes it to a named stream backed by a write-capable
//! handler, and optionally answers the original sender. Each module
//! covers one piece of the protocol engine:
//!
//! - [`message`] is the wire codec: the four-field request format and
//!   the `+`/`-` sigil replies.
//! - [`stream`] holds the immutable stream table and the
//!   [`StreamHandler`](stream::StreamHandler) write capability.
//! - [`dispatch`] validates decoded messages and routes them to their
//!   handler.
//! - [`broker`] owns the listening socket and spawns one dispatch task
//!   per valid datagram.
//! - [`client`] sends a request from a fresh ephemeral socket and
//!   races the reply against a timeout.
//! - [`config`] and [`cli`] are the startup glue for the daemon and
//!   the `send` command.
//!
//! Integration tests exercise the broker end to end over a real UDP
//! socket bound to an ephemeral port.

pub mod broker;
pub mod cli;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod message;
pub mod stream;
