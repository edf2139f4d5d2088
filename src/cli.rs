use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the broker daemon, routing datagrams to configured streams.
    Daemon(DaemonArgs),
    /// Send one message to a stream on a running broker.
    Send(SendArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DaemonArgs {
    /// Broker config file. Defaults to daemon.json in the user config
    /// directory; generated on first run if missing.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Streams config file. Defaults to streams.json next to the
    /// broker config; an absent file means an empty stream table.
    #[arg(short, long)]
    pub streams: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    /// Broker config file naming the address to send to.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Stream to route the message to.
    #[arg(long)]
    pub stream: String,

    /// Sender identity carried in the message.
    #[arg(long, default_value = "streamgram")]
    pub source: String,

    /// Fire and forget: do not wait for an acknowledgement.
    #[arg(long)]
    pub no_response: bool,

    /// Message body. Multiple arguments are joined with spaces.
    #[arg(required = true)]
    pub body: Vec<String>,
}
