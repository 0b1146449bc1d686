//! Parameters that dictate how finalized jobs are rewarded and how late primaries are slashed.

use operator_pool_primitives::{Amount, FixedPoint};
use serde::{Deserialize, Serialize};

use crate::{
    default::{BACKUP_SLASH_SHARE, JOB_REWARD, SLASH_FRACTION},
    errors::ParamsError,
};

/// The economic parameters applied when a job is finalized or abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingParams {
    /// The reward paid to whichever eligible operator successfully finalizes a job.
    pub job_reward: Amount,

    /// The fraction of the primary's escrowed bond that is slashed when it misses its window.
    pub slash_fraction: FixedPoint,

    /// The fraction of the slashed amount paid to the backup that stepped in.
    pub backup_share: FixedPoint,
}

impl SlashingParams {
    /// Checks that both fractions lie in `[0, 1]`.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.slash_fraction > FixedPoint::ONE {
            return Err(ParamsError::FractionOutOfRange {
                name: "slash_fraction",
                value: self.slash_fraction.to_string(),
            });
        }

        if self.backup_share > FixedPoint::ONE {
            return Err(ParamsError::FractionOutOfRange {
                name: "backup_share",
                value: self.backup_share.to_string(),
            });
        }

        Ok(())
    }
}

impl Default for SlashingParams {
    fn default() -> Self {
        Self {
            job_reward: JOB_REWARD,
            slash_fraction: SLASH_FRACTION,
            backup_share: BACKUP_SLASH_SHARE,
        }
    }
}
