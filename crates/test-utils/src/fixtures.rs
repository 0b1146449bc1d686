//! Fixtures shared by the tests of the operator pool crates.

use std::collections::BTreeSet;

use operator_pool_primitives::{BlockHash, ChainContext, OperatorId, Timestamp};

use crate::arbitrary_generator::ArbitraryGenerator;

/// Generates a random operator id.
pub fn generate_operator_id() -> OperatorId {
    ArbitraryGenerator::new().generate()
}

/// Generates `n` distinct random operator ids, in ascending order.
pub fn generate_operator_ids(n: usize) -> Vec<OperatorId> {
    let mut ids = BTreeSet::new();

    while ids.len() < n {
        ids.insert(generate_operator_id());
    }

    ids.into_iter().collect()
}

/// Builds the chain context of a job published with `nonce` at `timestamp`.
///
/// The block number follows the nonce and the prior block hash is derived from it, so that
/// distinct nonces give distinct contexts.
pub fn chain_context(nonce: u64, timestamp: Timestamp) -> ChainContext {
    let mut hash = [0u8; 32];
    hash[24..].copy_from_slice(&nonce.to_be_bytes());

    ChainContext {
        nonce,
        block_number: nonce.saturating_add(1_000),
        block_timestamp: timestamp,
        prior_block_hash: BlockHash::new(hash),
    }
}

/// Builds a distinct job payload for every index.
pub fn job_payload(index: u64) -> Vec<u8> {
    format!("relay-job-{index}").into_bytes()
}
