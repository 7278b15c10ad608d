//! Read-only subscribers notified after each accepted block.

use ledger_core::BlockSummary;
use serde::Serialize;
use std::{fmt::Write, net::SocketAddr};
use tracing::info;

/// Immutable view of a node's chain at the moment a block was accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainSnapshot {
    pub node: SocketAddr,
    pub blocks: Vec<BlockSummary>,
}

impl ChainSnapshot {
    pub fn height(&self) -> u64 {
        self.blocks.last().map(|b| b.index).unwrap_or(0)
    }

    /// Text diagram, one block per line, linked to its predecessor.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, b) in self.blocks.iter().enumerate() {
            if i > 0 {
                out.push_str("    |\n");
            }
            let _ = writeln!(
                out,
                "Block {} | Hash: {}... | Prev: {}... | txs: {}",
                b.index, b.hash_prefix, b.previous_hash_prefix, b.tx_count
            );
        }
        out
    }
}

pub trait ChainObserver: Send + Sync {
    fn on_block_accepted(&self, snapshot: &ChainSnapshot);
}

impl<F> ChainObserver for F
where
    F: Fn(&ChainSnapshot) + Send + Sync,
{
    fn on_block_accepted(&self, snapshot: &ChainSnapshot) {
        self(snapshot)
    }
}

/// Renders the chain through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl ChainObserver for LogObserver {
    fn on_block_accepted(&self, snapshot: &ChainSnapshot) {
        info!(
            node = %snapshot.node,
            height = snapshot.height(),
            "chain structure\n{}",
            snapshot.render()
        );
    }
}
