//! The newline-delimited JSON protocol of the node.
//!
//! Every line on stdin is one [`Command`]; every line on stdout is the [`Response`] to the
//! command on the same line number.

use operator_pool_engine::prelude::*;
use operator_pool_primitives::{
    Amount, ChainContext, JobId, OperatorId, PodIdx, Position, Timestamp,
};
use serde::{Deserialize, Serialize};

/// A request to the node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Command {
    JoinPod {
        operator: OperatorId,
        pod: PodIdx,
        offered: Amount,
    },
    LeavePod {
        operator: OperatorId,
    },
    Withdraw {
        operator: OperatorId,
    },
    PublishJob {
        request: JobRequest,
        ctx: ChainContext,
    },
    Finalize {
        job_id: JobId,
        operator: OperatorId,
        report: ExecutionReport,
        now: Timestamp,
    },
    AbandonJob {
        job_id: JobId,
        now: Timestamp,
    },
    PreviewBond {
        pod: PodIdx,
        position: Position,
    },
    RequiredBond {
        pod: PodIdx,
    },
    JobStatus {
        job_id: JobId,
        now: Timestamp,
    },
    Balance {
        operator: OperatorId,
    },
    Shutdown,
}

/// The successful result of a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub(crate) enum Reply {
    Joined(JoinReceipt),
    Left(LeaveReceipt),
    Amount { amount: Amount },
    Published { job_id: JobId, job: Option<OperatorJob> },
    Finalized(FinalizeOutcome),
    Abandoned(AbandonOutcome),
    Status(JobStatus),
    Balance(BondLedgerEntry),
    ShuttingDown { shutting_down: bool },
}

/// The response to a single line of input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum Response {
    Ok { result: Reply },
    Error { error: String },
}

impl Response {
    pub(crate) fn error(error: impl ToString) -> Self {
        Response::Error {
            error: error.to_string(),
        }
    }
}

impl<E: ToString> From<Result<Reply, E>> for Response {
    fn from(result: Result<Reply, E>) -> Self {
        match result {
            Ok(result) => Response::Ok { result },
            Err(error) => Response::error(error),
        }
    }
}
