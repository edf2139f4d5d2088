use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::UdpSocket;
use tracing::{info, warn};

use streamgram::{
    broker::Broker,
    cli::{Cli, Command, DaemonArgs, SendArgs},
    client::RequestClient,
    config::{default_config_dir, BrokerConfig, StreamsConfig},
    dispatch::Dispatcher,
    message::Message,
    stream::StreamTable,
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Daemon(args) => run_daemon(args).await,
        Command::Send(args) => run_send(args).await,
    }
}

async fn run_daemon(args: DaemonArgs) -> Result<()> {
    let config_path = args
        .config
        .unwrap_or_else(|| default_config_dir().join("daemon.json"));
    let streams_path = args
        .streams
        .unwrap_or_else(|| default_config_dir().join("streams.json"));

    let config = BrokerConfig::load_or_init(&config_path)?;
    let streams = StreamsConfig::load_or_empty(&streams_path)?;
    let table = StreamTable::from_defs(&streams.streams)?;
    info!(streams = table.len(), "stream table loaded");

    let socket = UdpSocket::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let broker = Broker::new(socket, Dispatcher::new(table.into()));
    info!("broker listening on {}", broker.local_addr()?);

    if let Err(err) = broker.run_until_ctrl_c().await {
        warn!("broker exited with error: {err:?}");
        return Err(err);
    }
    Ok(())
}

async fn run_send(args: SendArgs) -> Result<()> {
    let config_path: PathBuf = args
        .config
        .unwrap_or_else(|| default_config_dir().join("daemon.json"));
    let config = BrokerConfig::load(&config_path)?;

    let message = Message::new(
        args.source,
        args.stream,
        args.body.join(" "),
        !args.no_response,
    );
    let client = RequestClient::new(config.bind);
    match client.send(&message).await? {
        Some(detail) => info!("acknowledged: {detail}"),
        None => info!("sent"),
    }
    Ok(())
}
