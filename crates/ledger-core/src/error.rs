use thiserror::Error;

/// Reasons a block is refused by a [`Chain`](crate::chain::Chain).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The block does not build on the local tip.
    #[error("invalid parent: expected previous hash {expected}, block declares {found}")]
    InvalidParent { expected: String, found: String },

    /// The block extends the tip but does not carry the next height.
    #[error("invalid index: expected {expected}, block declares {found}")]
    InvalidIndex { expected: u64, found: u64 },

    /// The claimed hash misses the difficulty target or does not match the block content.
    #[error("invalid proof: {hash}")]
    InvalidProof { hash: String },

    /// Full-chain validation found a block that does not link to its predecessor.
    #[error("broken link at block {index}")]
    BrokenLink { index: u64 },

    #[error("genesis block is malformed")]
    Genesis,
}

pub type ChainResult<T> = Result<T, ChainError>;
