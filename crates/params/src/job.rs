//! Parameters for the lifecycle of a job.

use serde::{Deserialize, Serialize};

use crate::{default::ARCHIVE_CAPACITY, errors::ParamsError};

/// The number of backup operators selected for every job.
///
/// Together with the primary this gives six operators that are, in turn, eligible to finalize a
/// job before it is abandoned.
pub const NUM_BACKUP_OPERATORS: usize = 5;

/// What happens to a job once every eligible operator has missed its window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonmentPolicy {
    /// The job is archived as abandoned and nothing else happens.
    #[default]
    LeaveUntouched,

    /// The job is archived as abandoned and its original request is handed back so that it can
    /// be published again.
    Republish,
}

/// The parameters that govern jobs once they are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    /// The policy applied to jobs that nobody finalized in time.
    pub abandonment: AbandonmentPolicy,

    /// How many settled jobs keep their terminal record, oldest pruned first.
    ///
    /// A pruned job is unknown to the pool again, so its payload may be published anew.
    #[serde(default = "default_archive_capacity")]
    pub archive_capacity: u32,
}

const fn default_archive_capacity() -> u32 {
    ARCHIVE_CAPACITY
}

impl JobParams {
    /// Checks that at least one settled job is retained.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.archive_capacity == 0 {
            return Err(ParamsError::ZeroArchiveCapacity);
        }

        Ok(())
    }
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            abandonment: AbandonmentPolicy::default(),
            archive_capacity: ARCHIVE_CAPACITY,
        }
    }
}
