//! This crate provides test-utilities for the operator pool.
//!
//! These utilities are mostly used to generate arbitrary identities and chain contexts, and to
//! build proptest strategies over the primitive types.

pub mod arbitrary_generator;
pub mod fixtures;
pub mod prelude;
