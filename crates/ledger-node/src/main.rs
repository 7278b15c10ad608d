use clap::Parser;
use ledger_node::{api, ChainObserver, LogObserver, Node, NodeConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(name = "ledger-node")]
#[command(about = "Peer-to-peer ledger node with escrow contracts")]
struct Args {
    /// Peer-to-peer address to listen on, e.g. 127.0.0.1:6000
    #[arg(long, default_value = "127.0.0.1:6000")]
    listen: SocketAddr,

    /// Peer address; repeat for several peers
    #[arg(long = "peer")]
    peers: Vec<SocketAddr>,

    /// Leading zero hex characters a block hash must have
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(0..=64))]
    difficulty: u8,

    /// Pending transactions that trigger mining
    #[arg(long, default_value_t = 2)]
    threshold: usize,

    /// Milliseconds to wait when connecting to a peer
    #[arg(long, default_value_t = 1000)]
    connect_timeout_ms: u64,

    /// Address for the HTTP control API, e.g. 127.0.0.1:8080
    #[arg(long)]
    api: Option<SocketAddr>,

    /// Log the chain structure after every accepted block
    #[arg(long)]
    visualize: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = NodeConfig::new(args.listen)
        .with_peers(args.peers)
        .with_difficulty(args.difficulty.into())
        .with_mining_threshold(args.threshold);
    config.connect_timeout = Duration::from_millis(args.connect_timeout_ms);
    if let Some(api) = args.api {
        config = config.with_api(api);
    }

    let observer: Option<Arc<dyn ChainObserver>> = if args.visualize {
        Some(Arc::new(LogObserver))
    } else {
        None
    };

    let running = Node::start(config.clone(), observer).await?;
    info!(
        "ledger-node {} up with {} peer(s), difficulty {}",
        running.addr(),
        running.node().peers().await.len(),
        config.difficulty
    );

    if let Some(addr) = config.api_listen {
        let node = running.node().clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(node, addr).await {
                error!(error = %e, "api server stopped");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    running.shutdown().await?;
    Ok(())
}
