//! Notifications about job and membership changes.
//!
//! The pool records an event for every committed change that collaborators may want to react to,
//! such as a relayer waiting for jobs to become available. Events are buffered in the pool in the
//! order the changes were made and drained by whoever drives it.

use operator_pool_primitives::{Amount, JobId, OperatorId, PodIdx};
use serde::{Deserialize, Serialize};

use crate::{
    job::{OperatorJob, Role},
    slashing::Settlement,
};

/// A committed change to the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    /// A job was published and is available to its primary.
    JobPublished {
        /// The published job.
        job_id: JobId,
        /// The pod it was assigned to.
        pod: PodIdx,
        /// The operator it was assigned to.
        primary: OperatorId,
        /// The backups in the order their windows open.
        backups: Vec<OperatorId>,
        /// The payload to relay.
        #[serde(with = "hex::serde")]
        payload: Vec<u8>,
    },

    /// A job was finalized and settled.
    JobFinalized {
        /// The finalized job.
        job_id: JobId,
        /// The operator that finalized it.
        operator: OperatorId,
        /// The capacity it acted in.
        role: Role,
        /// How the job was settled.
        settlement: Settlement,
    },

    /// A finalize attempt reverted before spending the declared gas limit.
    JobAttemptFailed {
        /// The job, which stays open.
        job_id: JobId,
        /// The operator that made the attempt.
        operator: OperatorId,
        /// The number of failed attempts recorded so far.
        attempts: usize,
    },

    /// A job was abandoned after every eligible operator missed its window.
    JobAbandoned {
        /// The abandoned job.
        job_id: JobId,
        /// The primary that was slashed.
        primary: OperatorId,
        /// The amount slashed from the primary.
        slashed: Amount,
        /// Whether the request was handed back to be published again.
        republish: bool,
    },

    /// A slashed primary no longer covered its position and was removed from its pod.
    OperatorEvicted {
        /// The evicted operator.
        operator: OperatorId,
        /// The pod it was removed from.
        pod: PodIdx,
        /// Its withdrawable balance after eviction.
        withdrawable: Amount,
    },
}

impl PoolEvent {
    pub(crate) fn published(job: &OperatorJob) -> Self {
        PoolEvent::JobPublished {
            job_id: job.id,
            pod: job.pod,
            primary: job.primary,
            backups: job.backups.iter().map(|backup| backup.operator).collect(),
            payload: job.payload.clone(),
        }
    }

    /// The job the event is about, if any.
    pub const fn job_id(&self) -> Option<&JobId> {
        match self {
            PoolEvent::JobPublished { job_id, .. }
            | PoolEvent::JobFinalized { job_id, .. }
            | PoolEvent::JobAttemptFailed { job_id, .. }
            | PoolEvent::JobAbandoned { job_id, .. } => Some(job_id),
            PoolEvent::OperatorEvicted { .. } => None,
        }
    }
}
