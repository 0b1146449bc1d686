//! Error types for the operator pool engine.

use operator_pool_params::prelude::ParamsError;
use operator_pool_primitives::{Amount, JobId, OperatorId, PodIdx};
use thiserror::Error;

/// Unified error type for every operation exposed by the operator pool.
///
/// All variants are recoverable: the pool is left unchanged whenever an operation fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The offered bond does not cover the current bond of the next position in the pod.
    #[error("insufficient bond: required {required}, offered {offered}")]
    InsufficientBond {
        /// The bond required to join.
        required: Amount,
        /// The bond that was offered.
        offered: Amount,
    },

    /// The operator already belongs to a pod.
    #[error("operator {operator} is already in pod {pod}")]
    AlreadyInPod {
        /// The operator attempting to join.
        operator: OperatorId,
        /// The pod it currently belongs to.
        pod: PodIdx,
    },

    /// The operator does not belong to any pod.
    #[error("operator {0} is not in any pod")]
    NotInPod(OperatorId),

    /// The operator has part of its bond escrowed for a job.
    #[error("operator {operator} has a job in flight: {job:?}")]
    JobInFlight {
        /// The operator whose bond is locked.
        operator: OperatorId,
        /// The job holding the lock.
        job: Option<JobId>,
    },

    /// An index was requested modulo zero.
    #[error("cannot derive an index modulo zero")]
    DegenerateModulus,

    /// There is no pod with an available operator to select from.
    #[error("no pod has an available operator")]
    EmptyPodSet,

    /// The operator is not, or not yet, allowed to finalize the job.
    #[error("operator {operator} is not eligible to finalize job {job}")]
    NotEligible {
        /// The operator that attempted to finalize.
        operator: OperatorId,
        /// The job in question.
        job: JobId,
    },

    /// The job has already been finalized.
    #[error("job {0} has already been finalized")]
    JobAlreadyFinalized(JobId),

    /// Every eligible operator missed its window.
    #[error("job {0} has been abandoned")]
    JobAbandoned(JobId),

    /// The job cannot be abandoned while an operator is still eligible to finalize it.
    #[error("job {0} is still active")]
    JobStillActive(JobId),

    /// No job with this id was ever published.
    #[error("unknown job {0}")]
    UnknownJob(JobId),

    /// The operator has no ledger entry.
    #[error("unknown operator {0}")]
    UnknownOperator(OperatorId),

    /// A job with the same payload was already published.
    #[error("job {0} has already been published")]
    DuplicateJob(JobId),

    /// The job nonce does not strictly increase.
    #[error("stale nonce {nonce}, last accepted nonce is {last}")]
    StaleNonce {
        /// The nonce supplied with the job.
        nonce: u64,
        /// The last nonce that was accepted.
        last: u64,
    },

    /// A job was submitted with a zero block-time allowance.
    #[error("block-time allowance must be non-zero")]
    InvalidAllowance,

    /// A bond computation does not fit in 256 bits.
    #[error("bond for pod {0} overflows")]
    BondOverflow(PodIdx),

    /// A balance update does not fit in 256 bits.
    #[error("balance of operator {0} overflows")]
    BalanceOverflow(OperatorId),

    /// The pool parameters are invalid.
    #[error("invalid params: {0}")]
    InvalidParams(#[from] ParamsError),
}

/// Result alias for fallible pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
