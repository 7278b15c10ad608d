//! Runs a small in-process network: full mesh of nodes on consecutive ports,
//! a normal escrow flow and a disputed one. The first node logs the chain.
use anyhow::{ensure, Result};
use clap::Parser;
use ledger_core::{ContractAction, EscrowContract, Transaction};
use ledger_node::{ChainObserver, LogObserver, Node, NodeConfig, RunningNode};
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-sim")]
#[command(about = "Simulate an escrow ledger network on localhost")]
struct Args {
    #[arg(long, default_value_t = 6000)]
    base_port: u16,

    #[arg(long, default_value_t = 4)]
    nodes: u16,

    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(0..=64))]
    difficulty: u8,

    /// Pause between steps so blocks and contract updates can propagate
    #[arg(long, default_value_t = 2000)]
    settle_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let args = Args::parse();
    ensure!(args.nodes >= 2, "need at least two nodes");
    let settle = Duration::from_millis(args.settle_ms);

    let addrs: Vec<SocketAddr> = (0..args.nodes)
        .map(|i| SocketAddr::from((Ipv4Addr::LOCALHOST, args.base_port + i)))
        .collect();

    let mut running: Vec<RunningNode> = Vec::new();
    for (i, addr) in addrs.iter().enumerate() {
        let config = NodeConfig::new(*addr)
            .with_peers(addrs.iter().copied())
            .with_difficulty(args.difficulty.into());
        let observer: Option<Arc<dyn ChainObserver>> =
            (i == 0).then(|| Arc::new(LogObserver) as Arc<dyn ChainObserver>);
        running.push(Node::start(config, observer).await?);
    }
    let nodes: Vec<Node> = running.iter().map(|r| r.node().clone()).collect();
    let main_node = &nodes[0];

    info!("Initializing escrow contract...");
    let deal = EscrowContract::new("Alice", "Bob", 100);
    for node in &nodes {
        node.register_contract(deal.clone()).await;
    }

    info!("Simulating normal transaction flow:");
    main_node.gossip_transaction(Transaction::new("Alice", "Escrow", 100)).await;
    main_node.gossip_transaction(Transaction::new("Bob", "Escrow", 50)).await;
    sleep(settle).await;

    info!("Seller delivers product, buyer confirms:");
    let outcome = main_node
        .perform_contract_action(&deal.id, ContractAction::Confirm)
        .await?;
    info!("{}", outcome.message);
    sleep(settle).await;

    info!("Simulating dispute scenario:");
    let disputed = EscrowContract::new("Charlie", "Dave", 50);
    for node in &nodes {
        node.register_contract(disputed.clone()).await;
    }
    main_node.gossip_transaction(Transaction::new("Charlie", "Escrow", 50)).await;
    main_node.gossip_transaction(Transaction::new("Dave", "Escrow", 5)).await;
    sleep(settle).await;

    info!("Buyer raises dispute:");
    let outcome = main_node
        .perform_contract_action(&disputed.id, ContractAction::Dispute)
        .await?;
    info!("{}", outcome.message);
    sleep(settle).await;

    info!("Processing refund:");
    let outcome = main_node
        .perform_contract_action(&disputed.id, ContractAction::Refund)
        .await?;
    info!("{}", outcome.message);
    sleep(settle).await;

    for node in &nodes {
        let deal_state = node.contract(&deal.id).await.map(|c| c.state());
        let dispute_state = node.contract(&disputed.id).await.map(|c| c.state());
        info!(
            node = %node.addr(),
            blocks = node.chain_len().await,
            tip = %node.tip_hash().await,
            valid = node.validate().await.is_ok(),
            ?deal_state,
            ?dispute_state,
            "final state"
        );
    }
    println!("{}", main_node.snapshot().await.render());

    for r in running {
        r.shutdown().await?;
    }
    Ok(())
}
