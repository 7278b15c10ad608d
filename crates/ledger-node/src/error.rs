use ledger_core::ChainError;
use std::{io, net::SocketAddr};
use thiserror::Error;

/// Failures decoding an inbound frame.
#[derive(Debug, Error)]
pub enum WireError {
    /// Well-formed envelope with a kind this node does not handle.
    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    /// Contract action whose `contractId` names a different contract than its snapshot.
    #[error("contract id {contract_id} does not match snapshot {snapshot_id}")]
    ContractIdMismatch {
        contract_id: String,
        snapshot_id: String,
    },

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("framing error: {0}")]
    Io(#[from] io::Error),
}

/// Node errors. None of them is fatal; each is scoped to one message or call.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("peer {addr} unreachable: {source}")]
    UnreachablePeer { addr: SocketAddr, source: io::Error },

    #[error("unknown contract: {0}")]
    UnknownContract(String),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("background task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type NodeResult<T> = Result<T, NodeError>;
