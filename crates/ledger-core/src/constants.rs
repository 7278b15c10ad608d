pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const POW_TARGET_DIFFICULTY: usize = 4;
pub const MINING_THRESHOLD: usize = 2;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
/// Shared by every node so independently started chains agree on block 0.
pub const GENESIS_TIMESTAMP: u64 = 0;
/// Nonces hashed per parallel batch while sealing.
pub const NONCE_BATCH: u64 = 1 << 14;
/// Characters of a hash shown in chain snapshots.
pub const HASH_PREFIX_LEN: usize = 8;
