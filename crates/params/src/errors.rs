//! Errors for the operator pool parameters.

use thiserror::Error;

/// Error while validating a set of parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    /// The pod multiplier must be at least 2 so that every pod is strictly more expensive than
    /// the previous one.
    #[error("pod multiplier must be at least 2, got {0}")]
    PodMultiplierTooSmall(u32),

    /// The threshold step must be positive.
    #[error("operator threshold step must be positive")]
    ZeroThresholdStep,

    /// The base bond amount must be positive.
    #[error("base bond amount must be positive")]
    ZeroBaseBond,

    /// At least one settled job must keep its terminal record.
    #[error("archive capacity must be positive")]
    ZeroArchiveCapacity,

    /// A fraction that must lie in `[0, 1]` does not.
    #[error("{name} must be at most 1, got {value}")]
    FractionOutOfRange {
        /// The name of the offending parameter.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}
