//! The operator pool engine.
//!
//! Operators bond stake to join tiered pods. Every published job is deterministically assigned
//! to a primary operator and a sequence of backups drawn from one pod; the primary's bond is
//! escrowed until the job is finalized. Backups become eligible one window at a time, and a
//! primary that leaves the job to a backup is slashed.
//!
//! The components, from the bottom up:
//!
//! - [`randomness`]: seeds derived from a job's content and chain context.
//! - [`bond_curve`]: the bond required for a position in a pod.
//! - [`escrow`]: bonded, escrowed and withdrawable balances.
//! - [`pod_registry`]: pod membership and ordering.
//! - [`scheduler`]: job publication, operator selection and time gating.
//! - [`slashing`]: settlement of finalized and abandoned jobs.
//! - [`pool`]: the [`OperatorPool`](pool::OperatorPool) that owns all of the above.
//! - [`events`]: notifications about committed changes.
//! - [`actor`]: a single-writer task around the pool with concurrent reads.

pub mod actor;
pub mod bond_curve;
pub mod errors;
pub mod escrow;
pub mod events;
pub mod job;
pub mod pod_registry;
pub mod pool;
pub mod prelude;
pub mod randomness;
pub mod scheduler;
pub mod sink;
pub mod slashing;

#[cfg(test)]
mod tests;
