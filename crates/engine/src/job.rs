//! Jobs and their time-gated lifecycle.
//!
//! A job is assigned to a primary operator and up to [`NUM_BACKUP_OPERATORS`] backups. Every
//! `block_time_allowance` seconds after the job was published, the next backup becomes eligible
//! to finalize it, while all previously eligible operators stay eligible. An unsettled job stays
//! in its last window until it is finalized or explicitly abandoned; abandonment becomes possible
//! once the last window has been open for a full allowance.

use std::fmt;

use operator_pool_params::prelude::NUM_BACKUP_OPERATORS;
use operator_pool_primitives::{Amount, BlockNumber, JobId, OperatorId, PodIdx, Position, Timestamp};
use serde::{Deserialize, Serialize};

/// The number of allowance windows after which a job may be abandoned.
///
/// One window for the primary and one for each backup.
pub const NUM_WINDOWS: u64 = NUM_BACKUP_OPERATORS as u64 + 1;

/// A request to publish a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// The opaque payload to relay; its hash identifies the job.
    #[serde(with = "hex::serde")]
    pub payload: Vec<u8>,

    /// The gas limit declared by the submitter.
    pub gas_limit: u64,

    /// The maximum gas price the submitter is willing to pay.
    pub max_gas_price: u64,

    /// The length of every eligibility window, in seconds.
    pub block_time_allowance: u64,
}

impl JobRequest {
    /// The id of the job this request publishes.
    pub fn job_id(&self) -> JobId {
        JobId::from_payload(&self.payload)
    }
}

/// What an operator reports after executing a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// The gas consumed by the execution.
    pub gas_used: u64,

    /// The gas price the execution was paid at.
    pub gas_price: u64,

    /// Whether the execution reverted.
    pub reverted: bool,
}

impl ExecutionReport {
    /// Whether the execution counts as having finalized a job with the given gas limit.
    ///
    /// A revert only counts as a failure if the operator did not supply the full declared gas.
    pub const fn is_success(&self, gas_limit: u64) -> bool {
        !self.reverted || self.gas_used >= gas_limit
    }
}

/// A backup operator of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSlot {
    /// The backup operator.
    pub operator: OperatorId,

    /// The backup's position in the pod at the time the job was published.
    pub position: Position,
}

/// A finalize attempt that reverted before spending the declared gas limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAttempt {
    /// The operator that made the attempt.
    pub operator: OperatorId,

    /// When the attempt was made.
    pub at: Timestamp,

    /// The report of the failed execution.
    pub report: ExecutionReport,
}

/// The capacity in which an operator finalizes a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    /// The operator the job was assigned to.
    Primary,

    /// A backup operator, by its 0-based slot.
    Backup {
        /// The slot of the backup; slot `k` becomes eligible in window `k + 1`.
        slot: u8,
    },
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Backup { slot } => write!(f, "backup #{}", slot + 1),
        }
    }
}

/// The lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "window", rename_all = "snake_case")]
pub enum JobState {
    /// Only the primary may finalize.
    Pending,

    /// The backups with slots below the window number may finalize, as may the primary.
    BackupWindow(u8),

    /// The job was finalized.
    Finalized,

    /// The job was abandoned after every eligible operator missed its window.
    Abandoned,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => f.write_str("pending"),
            JobState::BackupWindow(n) => write!(f, "backup window {n}"),
            JobState::Finalized => f.write_str("finalized"),
            JobState::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// The status of a job at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// The state of the job.
    pub state: JobState,

    /// The operator that was granted the right to finalize when the current window opened.
    pub eligible_operator: Option<OperatorId>,

    /// When the current state began.
    pub window_opens_at: Timestamp,

    /// When the next state may begin, if the job is not settled.
    ///
    /// In the last backup window this is when the job becomes abandonable.
    pub next_window_at: Option<Timestamp>,
}

/// A published, unsettled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorJob {
    /// The hash of the payload.
    pub id: JobId,

    /// The pod the job was assigned to.
    pub pod: PodIdx,

    /// The length of every eligibility window, in seconds.
    pub block_time_allowance: u64,

    /// The operator the job was assigned to.
    pub primary: OperatorId,

    /// The position the primary's bond was priced at.
    pub primary_bond_position: Position,

    /// The part of the primary's bond locked for this job.
    pub escrowed: Amount,

    /// The block the job was published in.
    pub start_block: BlockNumber,

    /// The timestamp of the block the job was published in.
    pub start_timestamp: Timestamp,

    /// The nonce the job was published with.
    pub nonce: u64,

    /// The gas limit declared by the submitter.
    pub gas_limit: u64,

    /// The maximum gas price declared by the submitter.
    pub max_gas_price: u64,

    /// The payload, kept so that the job can be published again.
    #[serde(with = "hex::serde")]
    pub payload: Vec<u8>,

    /// The backups in the order their windows open.
    pub backups: Vec<BackupSlot>,

    /// Finalize attempts that failed.
    pub failed_attempts: Vec<FailedAttempt>,
}

impl OperatorJob {
    /// The window open at `now`, from 0 for the primary's window up to the last backup window.
    fn window(&self, now: Timestamp) -> u64 {
        let elapsed = now.saturating_sub(self.start_timestamp);

        elapsed
            .checked_div(self.block_time_allowance)
            .unwrap_or(NUM_WINDOWS)
            .min(NUM_WINDOWS - 1)
    }

    fn window_start(&self, window: u64) -> Timestamp {
        self.start_timestamp
            .saturating_add(window.saturating_mul(self.block_time_allowance))
    }

    /// The time from which the job may be abandoned.
    pub fn abandonable_at(&self) -> Timestamp {
        self.window_start(NUM_WINDOWS)
    }

    /// Whether every window has been open for a full allowance at `now`.
    pub fn is_abandonable(&self, now: Timestamp) -> bool {
        now >= self.abandonable_at()
    }

    /// The state of the job at `now`.
    ///
    /// Unsettled jobs are never [`JobState::Finalized`] or [`JobState::Abandoned`]; a job past
    /// its last window stays in it until it is finalized or abandoned.
    pub fn state_at(&self, now: Timestamp) -> JobState {
        match self.window(now) {
            0 => JobState::Pending,
            w => JobState::BackupWindow(w as u8),
        }
    }

    /// The status of the job at `now`.
    pub fn status_at(&self, now: Timestamp) -> JobStatus {
        let window = self.window(now);
        let state = self.state_at(now);

        let eligible_operator = match state {
            JobState::Pending => Some(self.primary),
            JobState::BackupWindow(n) => usize::from(n)
                .checked_sub(1)
                .and_then(|slot| self.backups.get(slot))
                .map(|backup| backup.operator),
            JobState::Finalized | JobState::Abandoned => None,
        };

        JobStatus {
            state,
            eligible_operator,
            window_opens_at: self.window_start(window),
            next_window_at: Some(self.window_start(window + 1)),
        }
    }

    /// The capacity in which the operator may finalize the job at `now`, if any.
    ///
    /// The primary is always eligible. An operator that occupies several backup slots acts in
    /// the earliest one.
    pub fn role_of(&self, operator: &OperatorId, now: Timestamp) -> Option<Role> {
        if self.primary == *operator {
            return Some(Role::Primary);
        }

        self.backups
            .iter()
            .enumerate()
            .take(self.window(now) as usize)
            .find(|(_, backup)| backup.operator == *operator)
            .map(|(slot, _)| Role::Backup { slot: slot as u8 })
    }

    /// Reconstructs the request the job was published with.
    pub fn request(&self) -> JobRequest {
        JobRequest {
            payload: self.payload.clone(),
            gas_limit: self.gas_limit,
            max_gas_price: self.max_gas_price,
            block_time_allowance: self.block_time_allowance,
        }
    }
}
