use crate::constants::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_PORT};
use ledger_core::constants::{HASH_HEX_SIZE, MINING_THRESHOLD, POW_TARGET_DIFFICULTY};
use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

/// Settings for a single node.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Peer-to-peer listen address. Port 0 picks a free port.
    pub listen: SocketAddr,
    pub peers: Vec<SocketAddr>,
    /// Leading zero hex characters required of a block hash.
    pub difficulty: usize,
    /// Pending transactions that trigger mining.
    pub mining_threshold: usize,
    /// Upper bound on connecting to a peer before it is skipped.
    pub connect_timeout: Duration,
    /// Optional HTTP control API address.
    pub api_listen: Option<SocketAddr>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            peers: Vec::new(),
            difficulty: POW_TARGET_DIFFICULTY,
            mining_threshold: MINING_THRESHOLD,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            api_listen: None,
        }
    }
}

impl NodeConfig {
    pub fn new(listen: SocketAddr) -> Self {
        Self {
            listen,
            ..Self::default()
        }
    }

    /// Loopback on an OS-assigned port.
    pub fn ephemeral() -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
    }

    pub fn with_peers(mut self, peers: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.peers = peers.into_iter().collect();
        self
    }

    /// Capped at the hex length of a digest; a higher target is unreachable.
    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty.min(HASH_HEX_SIZE);
        self
    }

    pub fn with_mining_threshold(mut self, threshold: usize) -> Self {
        self.mining_threshold = threshold.max(1);
        self
    }

    pub fn with_api(mut self, addr: SocketAddr) -> Self {
        self.api_listen = Some(addr);
        self
    }
}
