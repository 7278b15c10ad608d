use crate::{
    constants::{
        GENESIS_PREVIOUS_HASH, GENESIS_TIMESTAMP, HASH_HEX_SIZE, HASH_PREFIX_LEN,
        POW_TARGET_DIFFICULTY,
    },
    error::{ChainError, ChainResult},
    now_millis,
    pow::{meets_difficulty, proof_of_work},
    Block, Transaction,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One row of an immutable chain snapshot handed to observers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub index: u64,
    pub hash_prefix: String,
    pub previous_hash_prefix: String,
    pub tx_count: usize,
}

/// In-memory append-only chain plus the buffer of transactions waiting to be mined.
#[derive(Clone, Debug)]
pub struct Chain {
    blocks: Vec<Block>,
    pending: Vec<Transaction>,
    difficulty: usize,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new(POW_TARGET_DIFFICULTY)
    }
}

impl Chain {
    /// A chain holding only genesis. `difficulty` is capped at the digest's
    /// hex length, past which no nonce could ever satisfy it.
    pub fn new(difficulty: usize) -> Self {
        Self {
            blocks: vec![genesis_block()],
            pending: Vec::new(),
            difficulty: difficulty.min(HASH_HEX_SIZE),
        }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Never true: the genesis block is created with the chain.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last_block(&self) -> &Block {
        // genesis is inserted in `new` and blocks are never removed
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn tip_hash(&self) -> &str {
        &self.last_block().hash
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    /// Buffer a transaction for the next block. Contents are not validated.
    pub fn add_transaction(&mut self, tx: Transaction) {
        self.pending.push(tx);
    }

    /// Drain the pending buffer, oldest first.
    pub fn take_pending(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.pending)
    }

    /// Put transactions back at the front of the pending buffer.
    pub fn requeue(&mut self, mut txs: Vec<Transaction>) {
        txs.append(&mut self.pending);
        self.pending = txs;
    }

    /// Requeue transactions from a block that failed to land, skipping any
    /// already confirmed by blocks at `since` or above.
    pub fn requeue_unconfirmed(&mut self, since: u64, mut txs: Vec<Transaction>) {
        let confirmed: Vec<&Transaction> = self
            .blocks
            .iter()
            .skip(since as usize)
            .flat_map(|b| &b.transactions)
            .collect();
        txs.retain(|tx| !confirmed.contains(&tx));
        self.requeue(txs);
    }

    /// Unsealed block on top of the current tip.
    pub fn candidate(&self, transactions: Vec<Transaction>) -> Block {
        let last = self.last_block();
        Block::new(
            last.index + 1,
            transactions,
            now_millis(),
            last.hash.clone(),
        )
    }

    /// Build a candidate on the tip and run proof-of-work on it.
    /// Returns the sealed block and its proof; the chain itself is untouched.
    pub fn mine(&self, transactions: Vec<Transaction>) -> (Block, String) {
        let mut block = self.candidate(transactions);
        let proof = proof_of_work(&mut block, self.difficulty);
        (block, proof)
    }

    pub fn is_valid_proof(&self, block: &Block, claimed_hash: &str) -> bool {
        meets_difficulty(claimed_hash, self.difficulty) && claimed_hash == block.compute_hash()
    }

    /// Append a sealed block if it extends the tip and `proof` is valid for its content.
    ///
    /// Transactions carried by the block are dropped from the pending buffer.
    pub fn append(&mut self, mut block: Block, proof: &str) -> ChainResult<()> {
        let tip = self.last_block();
        if block.previous_hash != tip.hash {
            return Err(ChainError::InvalidParent {
                expected: tip.hash.clone(),
                found: block.previous_hash,
            });
        }
        if block.index != tip.index + 1 {
            return Err(ChainError::InvalidIndex {
                expected: tip.index + 1,
                found: block.index,
            });
        }
        if !self.is_valid_proof(&block, proof) {
            return Err(ChainError::InvalidProof {
                hash: proof.to_string(),
            });
        }

        block.hash = proof.to_string();
        self.prune_pending(&block.transactions);
        debug!(index = block.index, hash = %block.hash, "block appended");
        self.blocks.push(block);
        Ok(())
    }

    fn prune_pending(&mut self, included: &[Transaction]) {
        for tx in included {
            if let Some(pos) = self.pending.iter().position(|p| p == tx) {
                self.pending.remove(pos);
            }
        }
    }

    /// Check linkage, height, difficulty and content hash of every block after genesis.
    pub fn validate(&self) -> ChainResult<()> {
        validate_blocks(&self.blocks, self.difficulty)
    }

    pub fn snapshot(&self) -> Vec<BlockSummary> {
        self.blocks
            .iter()
            .map(|b| BlockSummary {
                index: b.index,
                hash_prefix: prefix(&b.hash),
                previous_hash_prefix: prefix(&b.previous_hash),
                tx_count: b.transactions.len(),
            })
            .collect()
    }
}

fn prefix(hash: &str) -> String {
    hash.chars().take(HASH_PREFIX_LEN).collect()
}

/// Validate an arbitrary block sequence against `difficulty`.
pub fn validate_blocks(blocks: &[Block], difficulty: usize) -> ChainResult<()> {
    let genesis = blocks.first().ok_or(ChainError::Genesis)?;
    if genesis.index != 0 || genesis.previous_hash != GENESIS_PREVIOUS_HASH {
        return Err(ChainError::Genesis);
    }
    for pair in blocks.windows(2) {
        let (prev, block) = (&pair[0], &pair[1]);
        if block.previous_hash != prev.hash {
            return Err(ChainError::BrokenLink { index: block.index });
        }
        if block.index != prev.index + 1 {
            return Err(ChainError::InvalidIndex {
                expected: prev.index + 1,
                found: block.index,
            });
        }
        if !meets_difficulty(&block.hash, difficulty) || block.hash != block.compute_hash() {
            return Err(ChainError::InvalidProof {
                hash: block.hash.clone(),
            });
        }
    }
    Ok(())
}

/// A zero-transaction genesis block with previous hash `"0"` and a fixed timestamp.
pub fn genesis_block() -> Block {
    Block::new(0, vec![], GENESIS_TIMESTAMP, GENESIS_PREVIOUS_HASH)
}
