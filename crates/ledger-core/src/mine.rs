use crate::{constants::NONCE_BATCH, pow::meets_difficulty, Block};
use rayon::prelude::*;
use tracing::info;

/// Seals a block by searching nonces in parallel until its hash has at least
/// `difficulty` leading zero hex characters.
///
/// Nonces are scanned in ascending batches and each batch keeps its lowest
/// match, so the result is the same nonce [`pow::proof_of_work`](crate::pow::proof_of_work)
/// would find sequentially. Returns the sealed block and its proof hash.
pub fn seal_parallel(mut block: Block, difficulty: usize) -> (Block, String) {
    let mut base = 0u64;
    let nonce = loop {
        let end = base.saturating_add(NONCE_BATCH);
        let template = &block;
        let found = (base..end)
            .into_par_iter()
            .find_first(|nonce| meets_difficulty(&template.hash_with_nonce(*nonce), difficulty));
        match found {
            Some(nonce) => break nonce,
            // wrap like the sequential search; unreachable for any sane difficulty
            None if end == u64::MAX => base = 0,
            None => base = end,
        }
    };

    block.nonce = nonce;
    let proof = block.compute_hash();
    block.hash = proof.clone();

    info!(index = block.index, nonce, hash = %proof, "sealed block");
    (block, proof)
}
