//! Identifiers and chain context shared by every component of the operator pool.

use std::{fmt, str::FromStr};

use arbitrary::{Arbitrary, Unstructured};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::errors::ParseError;

/// The ordinal of a pod, starting at zero for the cheapest, most populous pod.
pub type PodIdx = u32;

/// The 1-based position an operator was assigned when it joined its pod.
pub type Position = u32;

/// A block number on the chain that orders all pool operations.
pub type BlockNumber = u64;

/// A block timestamp in seconds.
pub type Timestamp = u64;

/// Size of an [`OperatorId`] in bytes.
pub const OPERATOR_ID_SIZE: usize = 20;

/// Size of a [`JobId`] and a [`BlockHash`] in bytes.
pub const HASH_SIZE: usize = 32;

fn decode_hex<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    let actual = bytes.len();

    bytes.try_into().map_err(|_| ParseError::InvalidLength {
        expected: N,
        actual,
    })
}

/// The address-equivalent identity of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperatorId([u8; OPERATOR_ID_SIZE]);

impl OperatorId {
    /// Creates a new operator id from its raw bytes.
    pub const fn new(bytes: [u8; OPERATOR_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the operator id.
    pub const fn as_bytes(&self) -> &[u8; OPERATOR_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for OperatorId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex(s).map(Self)
    }
}

impl<'a> Arbitrary<'a> for OperatorId {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self(u.arbitrary()?))
    }
}

/// The identifier of a job: the SHA-256 hash of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId([u8; HASH_SIZE]);

impl JobId {
    /// Creates a new job id from its raw bytes.
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Hashes a job payload into its id.
    pub fn from_payload(payload: &[u8]) -> Self {
        Self(Sha256::digest(payload).into())
    }

    /// Returns the raw bytes of the job id.
    pub const fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for JobId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex(s).map(Self)
    }
}

/// The hash of a finalized block, used to perturb operator selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHash([u8; HASH_SIZE]);

impl BlockHash {
    /// Creates a new block hash from its raw bytes.
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the block hash.
    pub const fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for BlockHash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex(s).map(Self)
    }
}

macro_rules! serde_via_display {
    ($($ty:ty),+) => {
        $(
            impl Serialize for $ty {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.serialize_str(&self.to_string())
                }
            }

            impl<'de> Deserialize<'de> for $ty {
                fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                    let s = String::deserialize(deserializer)?;
                    s.parse().map_err(de::Error::custom)
                }
            }
        )+
    };
}

serde_via_display!(OperatorId, JobId, BlockHash);

/// The chain metadata that seeds operator selection for a job.
///
/// None of these values are known to the job submitter in advance, which is what makes the
/// selection unpredictable at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContext {
    /// The strictly increasing per-chain job nonce.
    pub nonce: u64,

    /// The number of the block in which the job is published.
    pub block_number: BlockNumber,

    /// The timestamp of the block in which the job is published.
    pub block_timestamp: Timestamp,

    /// The hash of a previously finalized block.
    pub prior_block_hash: BlockHash,
}
