//! This crate contains general types and pure functions that need to be shared across multiple
//! crates in the operator pool.
//!
//! It lies at the bottom of the crate-hierarchy in this workspace i.e., it does not depend on any
//! other crate in this workspace.

pub mod amount;
mod decimal;
pub mod errors;
pub mod types;

pub use amount::{Amount, FixedPoint, DECIMALS};
pub use errors::ParseError;
pub use types::{
    BlockHash, BlockNumber, ChainContext, JobId, OperatorId, PodIdx, Position, Timestamp,
};
