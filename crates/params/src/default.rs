//! Default values for the operator pool parameters.

use operator_pool_primitives::{Amount, FixedPoint};

/// Default number of positions in pod 0 that are priced at the pod's minimum bond.
///
/// Every subsequent pod halves this threshold.
pub const OPERATOR_THRESHOLD: u32 = 1000;

/// Default number of positions past the threshold that share the same bond surcharge.
pub const OPERATOR_THRESHOLD_STEP: u32 = 10;

/// Default surcharge, as a fraction of the pod's minimum bond, added for every step past the
/// threshold.
pub const OPERATOR_THRESHOLD_MULTIPLIER: FixedPoint = match FixedPoint::from_ratio(1, 100) {
    Some(multiplier) => multiplier,
    None => FixedPoint::ZERO,
};

/// Default factor by which the minimum bond grows from one pod to the next.
pub const POD_MULTIPLIER: u32 = 2;

/// Default minimum bond of pod 0.
pub const BASE_BOND_AMOUNT: Amount = Amount::from_tokens(100);

/// Default reward paid to the operator that successfully finalizes a job.
pub const JOB_REWARD: Amount = Amount::from_tokens(1);

/// Default fraction of the primary's escrowed bond that is slashed when a backup finalizes its
/// job.
pub const SLASH_FRACTION: FixedPoint = match FixedPoint::from_ratio(1, 2) {
    Some(fraction) => fraction,
    None => FixedPoint::ZERO,
};

/// Default fraction of a slashed bond that is paid to the backup operator that stepped in.
///
/// The rest is routed to the burn/treasury sink.
pub const BACKUP_SLASH_SHARE: FixedPoint = match FixedPoint::from_ratio(1, 2) {
    Some(share) => share,
    None => FixedPoint::ZERO,
};

/// Default fee, as a fraction of the withdrawn bond, charged when an operator leaves its pod.
pub const WITHDRAWAL_FEE: FixedPoint = match FixedPoint::from_ratio(1, 1000) {
    Some(fee) => fee,
    None => FixedPoint::ZERO,
};

/// Default number of settled jobs whose terminal record is kept.
///
/// Past this many, the oldest records are pruned first.
pub const ARCHIVE_CAPACITY: u32 = 10_000;
