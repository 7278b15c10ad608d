use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod constants;
pub mod error;
pub mod escrow;
pub mod mine;

pub use chain::{BlockSummary, Chain};
pub use error::{ChainError, ChainResult};
pub use escrow::{ContractAction, ContractOutcome, ContractState, EscrowContract};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: String,
    pub to: String,
    pub amount: u64,
}

impl Transaction {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: u64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub transactions: Vec<Transaction>,
    pub timestamp: u64,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Build an unsealed block with `nonce = 0` and its initial hash.
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        timestamp: u64,
        previous_hash: impl Into<String>,
    ) -> Self {
        let mut block = Self {
            index,
            transactions,
            timestamp,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Bytes fed to the digest for a given nonce. Fields are laid out in a fixed
    /// order, strings are length-prefixed, and transactions keep their order.
    pub fn hash_bytes(&self, nonce: u64) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 8 + 8 + 8 + 8 + self.previous_hash.len());
        bytes.extend_from_slice(&self.index.to_le_bytes());
        bytes.extend_from_slice(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            push_str(&mut bytes, &tx.from);
            push_str(&mut bytes, &tx.to);
            bytes.extend_from_slice(&tx.amount.to_le_bytes());
        }
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        push_str(&mut bytes, &self.previous_hash);
        bytes.extend_from_slice(&nonce.to_le_bytes());
        bytes
    }

    /// Hex digest of the block content with the given nonce.
    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.hash_bytes(nonce));
        hex::encode(hasher.finalize())
    }

    /// Hex digest of the current fields. The stored `hash` is not an input.
    pub fn compute_hash(&self) -> String {
        self.hash_with_nonce(self.nonce)
    }
}

fn push_str(bytes: &mut Vec<u8>, s: &str) {
    bytes.extend_from_slice(&(s.len() as u64).to_le_bytes());
    bytes.extend_from_slice(s.as_bytes());
}

/// Milliseconds since the unix epoch, saturating to 0 if the clock is before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub mod pow {
    use super::Block;

    /// Number of leading `'0'` characters in a hex digest.
    pub fn leading_zero_hex(hash: &str) -> usize {
        hash.bytes().take_while(|b| *b == b'0').count()
    }

    /// The difficulty predicate: at least `difficulty` leading zero hex characters.
    pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
        leading_zero_hex(hash) >= difficulty
    }

    /// Mine the block by incrementing the nonce from zero until its hash meets
    /// `difficulty`. The winning hash is stored on the block and returned.
    pub fn proof_of_work(block: &mut Block, difficulty: usize) -> String {
        block.nonce = 0;
        let mut computed = block.compute_hash();
        while !meets_difficulty(&computed, difficulty) {
            block.nonce = block.nonce.wrapping_add(1);
            computed = block.compute_hash();
        }
        block.hash = computed.clone();
        computed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_txs() -> Vec<Transaction> {
        vec![
            Transaction::new("Alice", "Escrow", 100),
            Transaction::new("Bob", "Escrow", 50),
        ]
    }

    #[test]
    fn leading_zero_hex_examples() {
        assert_eq!(pow::leading_zero_hex("0000ab"), 4);
        assert_eq!(pow::leading_zero_hex("a000"), 0);
        assert_eq!(pow::leading_zero_hex("000"), 3);
        assert_eq!(pow::leading_zero_hex(""), 0);
        assert!(pow::meets_difficulty("00001f", 4));
        assert!(pow::meets_difficulty("000001", 4));
        assert!(!pow::meets_difficulty("0001ff", 4));
    }

    #[test]
    fn new_block_starts_unmined() {
        let block = Block::new(1, sample_txs(), 1_600_000_000_000, "abc");
        assert_eq!(block.nonce, 0);
        assert_eq!(block.hash, block.compute_hash());
        assert_eq!(block.hash.len(), constants::HASH_HEX_SIZE);
    }

    #[test]
    fn block_hash_consistency() {
        let a = Block::new(1, sample_txs(), 1_600_000_000_000, "abc");
        let b = Block::new(1, sample_txs(), 1_600_000_000_000, "abc");
        assert_eq!(a.compute_hash(), a.compute_hash());
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn transaction_order_changes_hash() {
        let mut reversed = sample_txs();
        reversed.reverse();
        let a = Block::new(1, sample_txs(), 1_600_000_000_000, "abc");
        let b = Block::new(1, reversed, 1_600_000_000_000, "abc");
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn block_hash_changes_with_nonce() {
        let mut block = Block::new(1, sample_txs(), 1_600_000_000_000, "abc");
        let before = block.compute_hash();
        block.nonce += 1;
        assert_ne!(before, block.compute_hash());
    }

    #[test]
    fn stored_hash_is_not_a_digest_input() {
        let mut block = Block::new(1, sample_txs(), 1_600_000_000_000, "abc");
        let before = block.compute_hash();
        block.hash = "tampered".into();
        assert_eq!(before, block.compute_hash());
    }

    #[test]
    fn hash_bytes_layout() {
        let block = Block::new(7, vec![], 42, "0");
        let bytes = block.hash_bytes(9);
        assert_eq!(bytes.len(), 8 + 8 + 8 + 8 + 1 + 8);
        assert_eq!(&bytes[0..8], &7u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &0u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &42u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &1u64.to_le_bytes());
        assert_eq!(bytes[32], b'0');
        assert_eq!(&bytes[33..41], &9u64.to_le_bytes());
    }

    #[test]
    fn length_prefix_separates_fields() {
        let a = Block::new(1, vec![Transaction::new("ab", "c", 1)], 0, "0");
        let b = Block::new(1, vec![Transaction::new("a", "bc", 1)], 0, "0");
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn proof_of_work_meets_target() {
        let mut block = Block::new(1, sample_txs(), 1_600_000_000_000, "abc");
        let proof = pow::proof_of_work(&mut block, 3);
        assert!(proof.starts_with("000"));
        assert_eq!(proof, block.hash);
        assert_eq!(proof, block.compute_hash());
    }

    #[test]
    fn proof_of_work_is_deterministic() {
        let template = Block::new(1, sample_txs(), 1_600_000_000_000, "abc");
        let mut first = template.clone();
        let mut second = template;
        second.nonce = 12345;
        let p1 = pow::proof_of_work(&mut first, 3);
        let p2 = pow::proof_of_work(&mut second, 3);
        assert_eq!(p1, p2);
        assert_eq!(first.nonce, second.nonce);
    }

    #[test]
    fn transaction_serialization_example() {
        let tx = Transaction::new("Alice", "Bob", 10);
        let json = serde_json::to_string(&tx).unwrap();
        assert_eq!(json, r#"{"from":"Alice","to":"Bob","amount":10}"#);
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, back);
    }

    #[test]
    fn block_survives_json_with_same_hash() {
        let mut block = Block::new(1, sample_txs(), 1_600_000_000_000, "abc");
        pow::proof_of_work(&mut block, 2);
        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back.compute_hash(), block.hash);
    }
}
