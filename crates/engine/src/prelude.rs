//! Re-exports of the types most users of the engine need.

pub use crate::{
    actor::{PoolActor, PoolActorError},
    bond_curve::BondCurve,
    errors::{PoolError, PoolResult},
    escrow::BondLedgerEntry,
    events::PoolEvent,
    job::{ExecutionReport, JobRequest, JobState, JobStatus, OperatorJob, Role},
    pod_registry::{JoinReceipt, LeaveReceipt, Membership},
    pool::{OperatorPool, PoolView},
    sink::{FeeSink, RecordingSink, SinkReason},
    slashing::{AbandonOutcome, FinalizeOutcome, PrimaryFate, Settlement},
};
