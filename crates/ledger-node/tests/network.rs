use bytes::Bytes;
use futures::SinkExt;
use ledger_core::{ContractAction, ContractState, EscrowContract, Transaction};
use ledger_node::{
    message::{BlockPayload, Message},
    transport, Node, NodeConfig, RunningNode,
};
use std::{future::Future, time::Duration};
use tokio::{net::TcpStream, time::sleep};

const DIFFICULTY: usize = 2;

async fn start() -> RunningNode {
    Node::start(NodeConfig::ephemeral().with_difficulty(DIFFICULTY), None)
        .await
        .expect("node starts")
}

/// Poll `check` until it holds or about five seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn mesh(nodes: &[&RunningNode]) {
    for a in nodes {
        for b in nodes {
            a.node().add_peer(b.addr()).await;
        }
    }
}

#[tokio::test]
async fn mined_block_reaches_peer() -> anyhow::Result<()> {
    let a = start().await;
    let b = start().await;
    a.node().add_peer(b.addr()).await;

    a.node()
        .on_transaction(Transaction::new("Alice", "Escrow", 100))
        .await?;
    let block = a
        .node()
        .on_transaction(Transaction::new("Bob", "Escrow", 50))
        .await?
        .expect("threshold reached");

    assert!(eventually(|| async { b.node().chain_len().await == 2 }).await);
    assert_eq!(b.node().tip_hash().await, a.node().tip_hash().await);
    assert_eq!(b.node().tip_hash().await, block.hash);
    assert!(b.node().validate().await.is_ok());

    a.shutdown().await?;
    b.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn competing_blocks_first_arrival_wins() -> anyhow::Result<()> {
    // A and C mine on the same genesis without hearing of each other.
    let a = Node::new(NodeConfig::ephemeral().with_difficulty(DIFFICULTY), None);
    let c = Node::new(NodeConfig::ephemeral().with_difficulty(DIFFICULTY), None);
    a.on_transaction(Transaction::new("Alice", "Escrow", 100)).await?;
    let x = a.mine_and_publish().await?;
    c.on_transaction(Transaction::new("Carol", "Escrow", 9)).await?;
    let y = c.mine_and_publish().await?;

    // B receives X then Y on one connection, so in that order.
    let b = start().await;
    let stream = TcpStream::connect(b.addr()).await?;
    let mut conn = transport::framed(stream);
    for block in [&x, &y] {
        let msg = Message::Block(BlockPayload {
            block: block.clone(),
            hash: block.hash.clone(),
        });
        conn.send(Bytes::from(msg.encode()?)).await?;
    }
    SinkExt::<Bytes>::close(&mut conn).await?;

    assert!(eventually(|| async { b.node().chain_len().await == 2 }).await);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(b.node().chain_len().await, 2);
    assert_eq!(b.node().tip_hash().await, x.hash);

    b.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn transactions_from_peers_trigger_mining() -> anyhow::Result<()> {
    let origin = start().await;
    let miner = start().await;
    origin.node().add_peer(miner.addr()).await;

    assert_eq!(
        origin
            .node()
            .gossip_transaction(Transaction::new("Alice", "Escrow", 100))
            .await,
        1
    );
    origin
        .node()
        .gossip_transaction(Transaction::new("Bob", "Escrow", 50))
        .await;

    assert!(eventually(|| async { miner.node().chain_len().await == 2 }).await);
    assert!(miner.node().pending().await.is_empty());
    // gossip does not touch the sender's own buffer
    assert!(origin.node().pending().await.is_empty());

    origin.shutdown().await?;
    miner.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn contract_state_converges_across_peers() -> anyhow::Result<()> {
    let a = start().await;
    let b = start().await;
    let c = start().await;
    mesh(&[&a, &b, &c]).await;

    let contract = a.node().open_contract("Alice", "Bob", 100).await;
    let id = contract.id.clone();
    // B already tracks the contract; C only learns of it from the broadcast.
    b.node().register_contract(contract.clone()).await;

    let dispute = a
        .node()
        .perform_contract_action(&id, ContractAction::Dispute)
        .await?;
    assert!(dispute.accepted);

    for peer in [&b, &c] {
        let converged = eventually(|| async {
            peer.node()
                .contract(&id)
                .await
                .map(|k| k.state() == ContractState::Disputed)
                .unwrap_or(false)
        })
        .await;
        assert!(converged, "{} did not see the dispute", peer.addr());
    }

    let confirm = a
        .node()
        .perform_contract_action(&id, ContractAction::Confirm)
        .await?;
    assert!(!confirm.accepted);
    let refund = a
        .node()
        .perform_contract_action(&id, ContractAction::Refund)
        .await?;
    assert!(refund.accepted);

    sleep(Duration::from_millis(200)).await;
    for node in [a.node(), b.node(), c.node()] {
        let local = node.contract(&id).await.expect("contract known");
        assert!(local.disputed);
        assert!(!local.released);
    }

    a.shutdown().await?;
    b.shutdown().await?;
    c.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn malformed_frames_do_not_stop_the_listener() -> anyhow::Result<()> {
    let node = start().await;

    // undecodable frame: connection is dropped by the node
    let mut bad = transport::framed(TcpStream::connect(node.addr()).await?);
    bad.send(Bytes::from_static(b"\x80\x04\x95 pickle")).await?;
    SinkExt::<Bytes>::close(&mut bad).await?;

    // unknown kind is skipped; the next frame on the same connection still lands
    let mut conn = transport::framed(TcpStream::connect(node.addr()).await?);
    conn.send(Bytes::from_static(br#"{"kind":"ping","payload":{}}"#)).await?;
    let tx = Message::Transaction(Transaction::new("Alice", "Escrow", 100));
    conn.send(Bytes::from(tx.encode()?)).await?;
    SinkExt::<Bytes>::close(&mut conn).await?;

    assert!(eventually(|| async { node.node().pending().await.len() == 1 }).await);
    assert_eq!(node.node().chain_len().await, 1);
    assert!(node.node().contracts().await.is_empty());

    node.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn mismatched_contract_id_is_dropped_but_connection_kept() -> anyhow::Result<()> {
    let node = start().await;
    let contract = EscrowContract::new("Alice", "Bob", 100);
    let frame = serde_json::json!({
        "kind": "contractAction",
        "payload": {"action": "dispute", "contractId": "someone-else", "contract": contract}
    });

    let mut conn = transport::framed(TcpStream::connect(node.addr()).await?);
    conn.send(Bytes::from(serde_json::to_vec(&frame)?)).await?;
    let tx = Message::Transaction(Transaction::new("Alice", "Escrow", 100));
    conn.send(Bytes::from(tx.encode()?)).await?;
    SinkExt::<Bytes>::close(&mut conn).await?;

    assert!(eventually(|| async { node.node().pending().await.len() == 1 }).await);
    assert!(node.node().contracts().await.is_empty());

    node.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn unreachable_peers_are_skipped() -> anyhow::Result<()> {
    let live = start().await;
    let dead = {
        let gone = start().await;
        let addr = gone.addr();
        gone.shutdown().await?;
        addr
    };

    let sender = Node::new(
        NodeConfig::ephemeral()
            .with_difficulty(DIFFICULTY)
            .with_peers([dead, live.addr()]),
        None,
    );
    let delivered = sender
        .gossip_transaction(Transaction::new("Alice", "Escrow", 1))
        .await;
    assert_eq!(delivered, 1);
    assert!(eventually(|| async { live.node().pending().await.len() == 1 }).await);

    live.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn forged_block_is_rejected_over_the_wire() -> anyhow::Result<()> {
    let node = start().await;
    let genesis_hash = node.node().tip_hash().await;
    let mut block = ledger_core::Block::new(1, vec![], 1, genesis_hash);
    block.hash = "00".repeat(32);

    let msg = Message::Block(BlockPayload {
        hash: block.hash.clone(),
        block,
    });
    transport::send_message(node.addr(), &msg, Duration::from_secs(1)).await?;

    sleep(Duration::from_millis(200)).await;
    assert_eq!(node.node().chain_len().await, 1);

    // a genuine contract message on a fresh connection is still handled
    let contract = EscrowContract::new("Charlie", "Dave", 50);
    let id = contract.id.clone();
    let msg = Message::ContractAction(ledger_node::ContractActionPayload {
        action: ContractAction::Dispute,
        contract_id: id.clone(),
        contract,
    });
    transport::send_message(node.addr(), &msg, Duration::from_secs(1)).await?;
    assert!(eventually(|| async { node.node().contract(&id).await.is_some() }).await);

    node.shutdown().await?;
    Ok(())
}
