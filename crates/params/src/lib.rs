//! This crate contains the consensus-critical parameters that dictate the behavior of the operator
//! pool in a way that ensures that every participant prices bonds, selects operators and settles
//! jobs identically.

pub mod bond_curve;
pub mod default;
pub mod errors;
pub mod job;
pub mod pool;
pub mod prelude;
pub mod slashing;
pub mod withdrawal;
