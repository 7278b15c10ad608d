use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use futures::future::join_all;
use ledger_core::{
    mine::seal_parallel, Block, Chain, ChainError, ChainResult, ContractAction,
    ContractOutcome, EscrowContract, Transaction,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{oneshot, Mutex},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::NodeConfig,
    constants::ACCEPT_BACKOFF,
    error::{NodeError, NodeResult, WireError},
    message::{BlockPayload, ContractActionPayload, Message},
    observer::{ChainObserver, ChainSnapshot},
    transport,
};

/// Everything a node mutates, behind the node's single lock.
#[derive(Debug)]
struct NodeState {
    chain: Chain,
    contracts: HashMap<String, EscrowContract>,
    peers: Vec<SocketAddr>,
}

struct Inner {
    addr: SocketAddr,
    config: NodeConfig,
    state: Mutex<NodeState>,
    /// Held for the whole of a mining round so a node never seals two
    /// competing blocks on the same tip.
    mining: Mutex<()>,
    observer: Option<Arc<dyn ChainObserver>>,
}

/// A ledger node. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Node {
    inner: Arc<Inner>,
}

/// A node whose listener is running in the background.
pub struct RunningNode {
    node: Node,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningNode {
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn addr(&self) -> SocketAddr {
        self.node.addr()
    }

    /// Stop accepting connections and wait for the listener to drop.
    pub async fn shutdown(self) -> NodeResult<()> {
        // the receiver is gone only if the listener already exited
        let _ = self.shutdown.send(());
        self.task
            .await
            .map_err(|e| NodeError::Task(e.to_string()))
    }
}

fn insert_peer(peers: &mut Vec<SocketAddr>, own: SocketAddr, addr: SocketAddr) -> bool {
    if addr == own || peers.contains(&addr) {
        return false;
    }
    peers.push(addr);
    true
}

impl Node {
    /// Build a node identified by `config.listen` without binding it.
    pub fn new(config: NodeConfig, observer: Option<Arc<dyn ChainObserver>>) -> Self {
        Self::with_addr(config.listen, config, observer)
    }

    fn with_addr(
        addr: SocketAddr,
        config: NodeConfig,
        observer: Option<Arc<dyn ChainObserver>>,
    ) -> Self {
        let mut peers = Vec::new();
        for peer in &config.peers {
            insert_peer(&mut peers, addr, *peer);
        }
        let state = NodeState {
            chain: Chain::new(config.difficulty),
            contracts: HashMap::new(),
            peers,
        };
        Self {
            inner: Arc::new(Inner {
                addr,
                config,
                state: Mutex::new(state),
                mining: Mutex::new(()),
                observer,
            }),
        }
    }

    /// Bind the configured address and run the listener on its own task.
    pub async fn start(
        config: NodeConfig,
        observer: Option<Arc<dyn ChainObserver>>,
    ) -> NodeResult<RunningNode> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| NodeError::Bind {
                addr: config.listen,
                source,
            })?;
        let addr = listener.local_addr()?;
        let node = Self::with_addr(addr, config, observer);

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(node.clone().listen(listener, shutdown_rx));
        Ok(RunningNode {
            node,
            shutdown,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Accept connections until `shutdown` fires. The listener is released when
    /// this returns; each connection runs on its own task.
    pub async fn listen(self, listener: TcpListener, mut shutdown: oneshot::Receiver<()>) {
        info!(node = %self.addr(), "node listening");
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, src)) => {
                        let node = self.clone();
                        tokio::spawn(async move { node.handle_connection(stream, src).await });
                    }
                    Err(e) => {
                        error!(node = %self.addr(), error = %e, "error accepting socket");
                        sleep(ACCEPT_BACKOFF).await;
                    }
                },
                _ = &mut shutdown => break,
            }
        }
        info!(node = %self.addr(), "node stopped listening");
    }

    /// Read frames until the peer hangs up or sends something undecodable.
    /// The stream is dropped, and so closed, on every path out.
    async fn handle_connection(&self, stream: TcpStream, src: SocketAddr) {
        let mut transport = transport::framed(stream);
        while let Some(next) = transport::next_message(&mut transport).await {
            match next {
                Ok(message) => self.dispatch(message).await,
                Err(WireError::UnknownKind(kind)) => {
                    warn!(node = %self.addr(), %src, %kind, "dropping message of unknown kind");
                }
                Err(e @ WireError::ContractIdMismatch { .. }) => {
                    warn!(node = %self.addr(), %src, error = %e, "dropping contract action");
                }
                Err(e) => {
                    warn!(node = %self.addr(), %src, error = %e, "closing connection");
                    break;
                }
            }
        }
        debug!(node = %self.addr(), %src, "connection closed");
    }

    pub async fn dispatch(&self, message: Message) {
        debug!(node = %self.addr(), kind = message.kind(), "dispatch");
        match message {
            Message::Transaction(tx) => {
                if let Err(e) = self.on_transaction(tx).await {
                    warn!(node = %self.addr(), error = %e, "mining after transaction failed");
                }
            }
            Message::Block(BlockPayload { block, hash }) => {
                // rejections are logged by on_block
                let _ = self.on_block(block, hash).await;
            }
            Message::ContractAction(payload) => {
                self.on_contract_action(payload).await;
            }
        }
    }

    /// Buffer a transaction; once the buffer reaches the mining threshold it is
    /// drained and mined. Returns the last block this call mined, if any.
    pub async fn on_transaction(&self, tx: Transaction) -> NodeResult<Option<Block>> {
        let ready = {
            let mut state = self.inner.state.lock().await;
            state.chain.add_transaction(tx);
            state.chain.pending().len() >= self.inner.config.mining_threshold
        };
        if !ready {
            return Ok(None);
        }
        self.mine_while_ready().await
    }

    /// Mine one batch after another while the buffer is at the threshold. Only
    /// one caller mines at a time; the others wait and then re-check, so
    /// transactions that arrived or were requeued meanwhile are not stranded.
    async fn mine_while_ready(&self) -> NodeResult<Option<Block>> {
        let _mining = self.inner.mining.lock().await;
        let mut mined = None;
        loop {
            let txs = {
                let mut state = self.inner.state.lock().await;
                if state.chain.pending().len() < self.inner.config.mining_threshold {
                    break;
                }
                state.chain.take_pending()
            };
            match self.mine_batch(txs).await {
                Ok(block) => mined = Some(block),
                // a peer block took the tip; the batch was requeued for the next round
                Err(NodeError::Chain(ChainError::InvalidParent { .. })) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(mined)
    }

    /// Append a block received from a peer.
    pub async fn on_block(&self, block: Block, proof: String) -> NodeResult<()> {
        let index = block.index;
        let snapshot = {
            let mut state = self.inner.state.lock().await;
            if let Err(e) = state.chain.append(block, &proof) {
                warn!(node = %self.addr(), index, error = %e, "invalid block rejected");
                return Err(e.into());
            }
            self.snapshot_of(&state.chain)
        };
        info!(node = %self.addr(), index, hash = %proof, "new block added");
        self.notify(&snapshot);
        Ok(())
    }

    /// Apply a peer's contract action to the local copy, adopting the sent
    /// snapshot for an unknown id. The new state is re-broadcast only when the
    /// action changed it, so copies converge without echoing forever.
    pub async fn on_contract_action(&self, payload: ContractActionPayload) -> ContractOutcome {
        let ContractActionPayload {
            action,
            contract_id,
            contract,
        } = payload;

        let (outcome, updated) = {
            let mut state = self.inner.state.lock().await;
            let local = state
                .contracts
                .entry(contract_id.clone())
                .or_insert_with(|| {
                    debug!(
                        node = %self.addr(),
                        contract = %contract_id,
                        "adopting contract snapshot"
                    );
                    contract
                });
            let outcome = local.apply(action);
            (outcome, local.clone())
        };

        info!(
            node = %self.addr(),
            contract = %contract_id,
            %action,
            accepted = outcome.accepted,
            "{}",
            outcome.message
        );
        if outcome.changed {
            self.broadcast_contract(action, &updated).await;
        }
        outcome
    }

    /// Mine whatever is pending, append it locally and broadcast it.
    pub async fn mine_and_publish(&self) -> NodeResult<Block> {
        let _mining = self.inner.mining.lock().await;
        let txs = self.inner.state.lock().await.chain.take_pending();
        self.mine_batch(txs).await
    }

    /// Proof-of-work runs on the blocking pool without the state lock held.
    async fn mine_batch(&self, txs: Vec<Transaction>) -> NodeResult<Block> {
        let (candidate, difficulty) = {
            let state = self.inner.state.lock().await;
            (state.chain.candidate(txs), state.chain.difficulty())
        };
        let index = candidate.index;
        let retained = candidate.transactions.clone();

        let sealed =
            tokio::task::spawn_blocking(move || seal_parallel(candidate, difficulty)).await;
        let (block, proof) = match sealed {
            Ok(sealed) => sealed,
            Err(e) => {
                self.inner
                    .state
                    .lock()
                    .await
                    .chain
                    .requeue_unconfirmed(index, retained);
                return Err(NodeError::Task(e.to_string()));
            }
        };

        let snapshot = {
            let mut state = self.inner.state.lock().await;
            if let Err(e) = state.chain.append(block.clone(), &proof) {
                state.chain.requeue_unconfirmed(index, block.transactions);
                warn!(
                    node = %self.addr(),
                    index,
                    error = %e,
                    "mined block went stale, transactions requeued"
                );
                return Err(e.into());
            }
            self.snapshot_of(&state.chain)
        };

        info!(node = %self.addr(), index, nonce = block.nonce, hash = %proof, "mined block");
        self.notify(&snapshot);
        self.broadcast(&Message::Block(BlockPayload {
            block: block.clone(),
            hash: proof,
        }))
        .await;
        Ok(block)
    }

    /// Send to every peer concurrently. Unreachable peers are logged and
    /// skipped; nothing is retried. Returns how many peers took the message.
    pub async fn broadcast(&self, message: &Message) -> usize {
        let frame = match message.encode() {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                error!(
                    node = %self.addr(),
                    kind = message.kind(),
                    error = %e,
                    "failed to encode message"
                );
                return 0;
            }
        };
        let peers = self.peers().await;
        let connect_timeout = self.inner.config.connect_timeout;

        let sends = peers.into_iter().map(|peer| {
            let frame = frame.clone();
            async move {
                match transport::send_frame(peer, frame, connect_timeout).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(node = %self.addr(), %peer, error = %e, "skipping peer");
                        false
                    }
                }
            }
        });
        let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();
        debug!(node = %self.addr(), kind = message.kind(), delivered, "broadcast");
        delivered
    }

    /// Send a transaction to the peers only; the local chain is not touched.
    pub async fn gossip_transaction(&self, tx: Transaction) -> usize {
        self.broadcast(&Message::Transaction(tx)).await
    }

    /// Broadcast `contract` together with the action that produced its state.
    pub async fn broadcast_contract(
        &self,
        action: ContractAction,
        contract: &EscrowContract,
    ) -> usize {
        self.broadcast(&Message::ContractAction(ContractActionPayload {
            action,
            contract_id: contract.id.clone(),
            contract: contract.clone(),
        }))
        .await
    }

    /// Track a contract locally. An existing copy under the same id is replaced.
    pub async fn register_contract(&self, contract: EscrowContract) {
        self.inner
            .state
            .lock()
            .await
            .contracts
            .insert(contract.id.clone(), contract);
    }

    pub async fn open_contract(
        &self,
        buyer: impl Into<String>,
        seller: impl Into<String>,
        amount: u64,
    ) -> EscrowContract {
        let contract = EscrowContract::new(buyer, seller, amount);
        self.register_contract(contract.clone()).await;
        info!(node = %self.addr(), contract = %contract.id, amount, "escrow contract opened");
        contract
    }

    /// Apply an action to a locally known contract and, if it was accepted,
    /// broadcast the resulting state with that action.
    pub async fn perform_contract_action(
        &self,
        contract_id: &str,
        action: ContractAction,
    ) -> NodeResult<ContractOutcome> {
        let (outcome, updated) = {
            let mut state = self.inner.state.lock().await;
            let contract = state
                .contracts
                .get_mut(contract_id)
                .ok_or_else(|| NodeError::UnknownContract(contract_id.to_string()))?;
            let outcome = contract.apply(action);
            (outcome, contract.clone())
        };
        info!(
            node = %self.addr(),
            contract = %contract_id,
            %action,
            accepted = outcome.accepted,
            "{}",
            outcome.message
        );
        if outcome.accepted {
            self.broadcast_contract(action, &updated).await;
        }
        Ok(outcome)
    }

    /// Register a peer once. Own address and duplicates are ignored.
    pub async fn add_peer(&self, addr: SocketAddr) -> bool {
        let mut state = self.inner.state.lock().await;
        insert_peer(&mut state.peers, self.inner.addr, addr)
    }

    pub async fn peers(&self) -> Vec<SocketAddr> {
        self.inner.state.lock().await.peers.clone()
    }

    pub async fn snapshot(&self) -> ChainSnapshot {
        let state = self.inner.state.lock().await;
        self.snapshot_of(&state.chain)
    }

    pub async fn blocks(&self) -> Vec<Block> {
        self.inner.state.lock().await.chain.blocks().to_vec()
    }

    pub async fn chain_len(&self) -> usize {
        self.inner.state.lock().await.chain.len()
    }

    pub async fn tip_hash(&self) -> String {
        self.inner.state.lock().await.chain.tip_hash().to_string()
    }

    pub async fn pending(&self) -> Vec<Transaction> {
        self.inner.state.lock().await.chain.pending().to_vec()
    }

    pub async fn validate(&self) -> ChainResult<()> {
        self.inner.state.lock().await.chain.validate()
    }

    pub async fn contract(&self, id: &str) -> Option<EscrowContract> {
        self.inner.state.lock().await.contracts.get(id).cloned()
    }

    pub async fn contracts(&self) -> Vec<EscrowContract> {
        let state = self.inner.state.lock().await;
        let mut contracts: Vec<_> = state.contracts.values().cloned().collect();
        contracts.sort_by(|a, b| a.id.cmp(&b.id));
        contracts
    }

    fn snapshot_of(&self, chain: &Chain) -> ChainSnapshot {
        ChainSnapshot {
            node: self.inner.addr,
            blocks: chain.snapshot(),
        }
    }

    fn notify(&self, snapshot: &ChainSnapshot) {
        if let Some(observer) = &self.inner.observer {
            observer.on_block_accepted(snapshot);
        }
    }
}
