//! Deterministic pseudo-randomness used to select pods, primaries and backups for a job.
//!
//! Every value is derived from the job's content and the chain context it is published in, so
//! all participants reproduce the same selection while nobody can predict it before the job is
//! included in a block.

use std::fmt;

use ethnum::U256;
use operator_pool_primitives::{BlockHash, BlockNumber, JobId, Timestamp};
use sha2::{Digest, Sha256};

use crate::errors::{PoolError, PoolResult};

/// A 256-bit selection seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seed(U256);

impl Seed {
    /// Creates a seed from its integer value.
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    /// Returns the integer value of the seed.
    pub const fn value(&self) -> U256 {
        self.0
    }

    /// Returns the big-endian encoding of the seed.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes()
    }

    fn from_digest(hasher: Sha256) -> Self {
        Self(U256::from_be_bytes(hasher.finalize().into()))
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_be_bytes()))
    }
}

/// Derives the selection seed of a job.
///
/// The seed is the SHA-256 hash of `payload_hash || nonce || block_number || block_timestamp`,
/// where the integers are encoded as 8-byte big-endian values, read as a big-endian integer.
pub fn derive_seed(
    payload_hash: &JobId,
    nonce: u64,
    block_number: BlockNumber,
    block_timestamp: Timestamp,
) -> Seed {
    let mut hasher = Sha256::new();
    hasher.update(payload_hash.as_bytes());
    hasher.update(nonce.to_be_bytes());
    hasher.update(block_number.to_be_bytes());
    hasher.update(block_timestamp.to_be_bytes());

    Seed::from_digest(hasher)
}

/// Perturbs a seed with the hash of a prior block.
///
/// This is a wrapping 256-bit addition; overflow is expected and discarded.
pub fn mix_with_block_hash(seed: Seed, prior_block_hash: &BlockHash) -> Seed {
    let hash = U256::from_be_bytes(*prior_block_hash.as_bytes());

    Seed(seed.0.wrapping_add(hash))
}

/// Reduces a seed to an index in `[0, modulus)`.
pub fn derive_index(seed: Seed, modulus: usize) -> PoolResult<usize> {
    if modulus == 0 {
        return Err(PoolError::DegenerateModulus);
    }

    let index = seed.0 % U256::from(modulus as u64);

    // the remainder is strictly less than `modulus`, which itself fits in a `usize`.
    Ok(index.as_u64() as usize)
}

/// Derives the seed from which the backup with the given salt is selected.
///
/// Hashing the job seed again makes the backups independent of the primary selection.
pub fn backup_seed(seed: Seed, salt: u8) -> Seed {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_be_bytes());
    hasher.update([salt]);

    Seed::from_digest(hasher)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn seed_is_deterministic() {
        let job = JobId::from_payload(b"relay me");

        let a = derive_seed(&job, 1, 100, 1_700_000_000);
        let b = derive_seed(&job, 1, 100, 1_700_000_000);
        assert_eq!(a, b);

        let c = derive_seed(&job, 2, 100, 1_700_000_000);
        assert_ne!(a, c, "a different nonce must change the seed");
    }

    #[test]
    fn seed_matches_manual_preimage() {
        let job = JobId::new([0x11; 32]);

        let mut preimage = Vec::with_capacity(56);
        preimage.extend_from_slice(&[0x11; 32]);
        preimage.extend_from_slice(&7u64.to_be_bytes());
        preimage.extend_from_slice(&8u64.to_be_bytes());
        preimage.extend_from_slice(&9u64.to_be_bytes());
        let digest: [u8; 32] = Sha256::digest(&preimage).into();

        assert_eq!(
            derive_seed(&job, 7, 8, 9).to_be_bytes(),
            digest,
            "seed must be the big-endian reading of the digest"
        );
    }

    #[test]
    fn mixing_wraps_around() {
        let seed = Seed::new(U256::MAX);
        let mut one = [0u8; 32];
        one[31] = 1;

        let mixed = mix_with_block_hash(seed, &BlockHash::new(one));
        assert_eq!(mixed.value(), U256::ZERO);
    }

    #[test]
    fn zero_modulus_is_rejected() {
        assert_eq!(
            derive_index(Seed::new(U256::ONE), 0),
            Err(PoolError::DegenerateModulus)
        );
    }

    #[test]
    fn backup_seeds_differ_per_salt() {
        let seed = derive_seed(&JobId::from_payload(b"job"), 1, 1, 1);
        let seeds: Vec<_> = (0..5).map(|salt| backup_seed(seed, salt)).collect();

        for (i, a) in seeds.iter().enumerate() {
            assert_ne!(*a, seed);
            for b in seeds.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    proptest! {
        #[test]
        fn index_is_in_range(bytes in any::<[u8; 32]>(), modulus in 1usize..10_000) {
            let seed = Seed::new(U256::from_be_bytes(bytes));
            let index = derive_index(seed, modulus).unwrap();

            prop_assert!(index < modulus);
        }
    }
}
