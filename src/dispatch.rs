//! Validation and routing of decoded messages.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::message::{Message, ResponseFlag};
use crate::stream::StreamTable;

/// Reply sent when a datagram cannot be decoded at all. Always
/// transmitted, because the response flag itself was unreadable.
pub const REPLY_FORMAT_ERROR: &str = "-Format error";

/// Why a decoded message was refused before dispatch. Checked in
/// declaration order: an unknown stream wins over a malformed flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnknownStream,
    MalformedFlag,
}

impl Rejection {
    /// The exact reply payload for this rejection.
    pub fn reply(self) -> &'static str {
        match self {
            Self::UnknownStream => "-No such stream",
            Self::MalformedFlag => "-Incorrect value (field: responseRequested)",
        }
    }
}

/// Validates messages against the stream table and routes them to
/// their handler. Shared by every in-flight dispatch task.
pub struct Dispatcher {
    streams: Arc<StreamTable>,
}

impl Dispatcher {
    pub fn new(streams: Arc<StreamTable>) -> Self {
        Self { streams }
    }

    pub fn validate(&self, message: &Message) -> Result<(), Rejection> {
        if self.streams.lookup(&message.stream).is_none() {
            return Err(Rejection::UnknownStream);
        }
        if matches!(message.response, ResponseFlag::Invalid(_)) {
            return Err(Rejection::MalformedFlag);
        }
        Ok(())
    }

    /// Invokes the stream's handler exactly once and returns its reply
    /// verbatim, sigil included. Only called after [`validate`]
    /// succeeds; handler errors are not caught here and surface on the
    /// broker's task-failure path.
    ///
    /// [`validate`]: Dispatcher::validate
    pub async fn dispatch(&self, message: &Message) -> Result<String> {
        let handler = self
            .streams
            .lookup(&message.stream)
            .with_context(|| format!("stream '{}' vanished after validation", message.stream))?;
        handler.write(message).await
    }
}
