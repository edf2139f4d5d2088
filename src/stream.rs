//! Named streams and the handlers that back them.
//!
//! A stream is a routing key bound to a write capability. The table is
//! built once at startup from [`StreamsConfig`](crate::config::StreamsConfig)
//! and never mutated afterwards, so any number of in-flight dispatch
//! tasks can look streams up concurrently without locking.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::config::StreamDef;
use crate::message::Message;

/// Write capability behind a stream. The returned string is the
/// complete reply payload, leading `+`/`-` sigil included; the
/// dispatcher forwards it verbatim. Handlers are shared across every
/// dispatch task routed to their stream, so `&self` must suffice.
pub trait StreamHandler: Send + Sync {
    fn write<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<String>>;
}

/// Immutable name-to-handler table. Lookup is case-sensitive exact
/// match; there is no registration after construction.
pub struct StreamTable {
    streams: HashMap<String, Arc<dyn StreamHandler>>,
}

impl StreamTable {
    /// Builds the table from config definitions, constructing one
    /// handler per stream. Duplicate names and unknown handler kinds
    /// are startup errors.
    pub fn from_defs(defs: &[StreamDef]) -> Result<Self> {
        let mut named = Vec::with_capacity(defs.len());
        for def in defs {
            named.push((def.name.clone(), build_handler(def)?));
        }
        Self::from_handlers(named)
    }

    pub fn from_handlers(
        handlers: impl IntoIterator<Item = (String, Arc<dyn StreamHandler>)>,
    ) -> Result<Self> {
        let mut streams = HashMap::new();
        for (name, handler) in handlers {
            if streams.insert(name.clone(), handler).is_some() {
                bail!("duplicate stream name '{name}'");
            }
        }
        Ok(Self { streams })
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn StreamHandler>> {
        self.streams.get(name)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

fn build_handler(def: &StreamDef) -> Result<Arc<dyn StreamHandler>> {
    match def.kind.as_str() {
        "file" => {
            let path = def
                .path
                .clone()
                .with_context(|| format!("stream '{}' uses the file handler but has no path", def.name))?;
            Ok(Arc::new(FileHandler::new(path)))
        }
        "log" => Ok(Arc::new(LogHandler)),
        other => bail!("unknown handler kind '{other}' for stream '{}'", def.name),
    }
}

/// Appends `<source>: <body>` lines to a file, creating it on first
/// write.
pub struct FileHandler {
    path: PathBuf,
}

impl FileHandler {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl StreamHandler for FileHandler {
    fn write<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&self.path)
                .await
                .with_context(|| format!("failed to open {}", self.path.display()))?;
            let line = format!("{}: {}\n", message.source, message.body);
            file.write_all(line.as_bytes())
                .await
                .with_context(|| format!("failed to append to {}", self.path.display()))?;
            file.flush()
                .await
                .with_context(|| format!("failed to append to {}", self.path.display()))?;
            Ok("+Ok".to_string())
        })
    }
}

/// Emits the message into the daemon's own log stream.
pub struct LogHandler;

impl StreamHandler for LogHandler {
    fn write<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            info!(source = %message.source, stream = %message.stream, body = %message.body, "message");
            Ok("+Ok".to_string())
        })
    }
}
