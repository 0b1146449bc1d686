//! The operator pool of a single network.
//!
//! [`OperatorPool`] owns every component and is the only way to mutate them. Each operation
//! either succeeds as a whole or leaves the pool untouched. Successful operations record
//! [`PoolEvent`]s, which stay buffered until [`OperatorPool::drain_events`] is called.

use operator_pool_params::prelude::PoolParams;
use operator_pool_primitives::{Amount, ChainContext, JobId, OperatorId, PodIdx, Position, Timestamp};
use tracing::info;

use crate::{
    bond_curve::BondCurve,
    errors::{PoolError, PoolResult},
    escrow::{BondLedgerEntry, EscrowLedger},
    events::PoolEvent,
    job::{ExecutionReport, JobRequest, JobStatus, OperatorJob},
    pod_registry::{JoinReceipt, LeaveReceipt, PodRegistry},
    scheduler::JobScheduler,
    sink::FeeSink,
    slashing::{AbandonOutcome, FinalizeOutcome, PrimaryFate, Settlement, SlashingEngine},
};

/// The pods, balances and jobs of a single network.
#[derive(Debug, Clone)]
pub struct OperatorPool<S> {
    params: PoolParams,
    registry: PodRegistry,
    ledger: EscrowLedger,
    scheduler: JobScheduler,
    slashing: SlashingEngine,
    sink: S,

    /// Events of committed operations that have not been drained yet.
    events: Vec<PoolEvent>,
}

impl<S: FeeSink> OperatorPool<S> {
    /// Creates an empty pool after validating its parameters.
    pub fn new(params: PoolParams, sink: S) -> PoolResult<Self> {
        params.validate()?;
        let curve = BondCurve::new(params.bond_curve)?;

        info!(?params, "operator pool initialized");

        Ok(Self {
            params,
            registry: PodRegistry::new(curve),
            ledger: EscrowLedger::new(),
            scheduler: JobScheduler::with_archive_capacity(params.jobs.archive_capacity as usize),
            slashing: SlashingEngine::new(params.slashing),
            sink,
            events: Vec::new(),
        })
    }

    /// Admits the operator into the pod, bonding the full offered amount.
    pub fn join_pod(
        &mut self,
        operator: OperatorId,
        pod: PodIdx,
        offered: Amount,
    ) -> PoolResult<JoinReceipt> {
        self.registry
            .join_pod(operator, pod, offered, &mut self.ledger)
    }

    /// Removes the operator from its pod and makes its bond, minus the withdrawal fee,
    /// withdrawable.
    pub fn leave_pod(&mut self, operator: OperatorId) -> PoolResult<LeaveReceipt> {
        self.registry.leave_pod(
            operator,
            self.params.withdrawal.fee,
            &mut self.ledger,
            &mut self.sink,
        )
    }

    /// Pays out the operator's withdrawable balance.
    pub fn withdraw(&mut self, operator: OperatorId) -> PoolResult<Amount> {
        let amount = self.ledger.withdraw(&operator)?;

        info!(%operator, %amount, "withdrawal paid out");

        Ok(amount)
    }

    /// Publishes a job and assigns it to a primary and its backups.
    pub fn publish_job(&mut self, request: JobRequest, ctx: ChainContext) -> PoolResult<JobId> {
        let job_id = self
            .scheduler
            .publish_job(request, &ctx, &mut self.registry, &mut self.ledger)?;

        if let Some(job) = self.scheduler.job(&job_id) {
            self.events.push(PoolEvent::published(job));
        }

        Ok(job_id)
    }

    /// Finalizes a job on behalf of the operator and settles it.
    pub fn finalize(
        &mut self,
        job_id: &JobId,
        operator: OperatorId,
        report: ExecutionReport,
        now: Timestamp,
    ) -> PoolResult<FinalizeOutcome> {
        let assigned = self.scheduler.job(job_id).map(|job| (job.primary, job.pod));

        let outcome = self.slashing.finalize(
            job_id,
            operator,
            report,
            now,
            &mut self.scheduler,
            &mut self.registry,
            &mut self.ledger,
            &mut self.sink,
        )?;

        match outcome {
            FinalizeOutcome::Settled {
                job_id,
                operator,
                settlement,
            } => {
                self.events.push(PoolEvent::JobFinalized {
                    job_id,
                    operator,
                    role: settlement.role(),
                    settlement,
                });

                if let (Settlement::Slashed { primary_fate, .. }, Some((primary, pod))) =
                    (settlement, assigned)
                {
                    self.record_fate(primary, pod, primary_fate);
                }
            }
            FinalizeOutcome::Failed { job_id, attempts } => {
                self.events.push(PoolEvent::JobAttemptFailed {
                    job_id,
                    operator,
                    attempts,
                });
            }
        }

        Ok(outcome)
    }

    /// Abandons a job whose last window has been open for a full allowance, according to the
    /// configured policy.
    pub fn abandon_job(&mut self, job_id: &JobId, now: Timestamp) -> PoolResult<AbandonOutcome> {
        let pod = self.scheduler.job(job_id).map(|job| job.pod);

        let outcome = self.slashing.abandon(
            job_id,
            now,
            self.params.jobs.abandonment,
            &mut self.scheduler,
            &mut self.registry,
            &mut self.ledger,
            &mut self.sink,
        )?;

        self.events.push(PoolEvent::JobAbandoned {
            job_id: outcome.job_id,
            primary: outcome.primary,
            slashed: outcome.slashed,
            republish: outcome.republish.is_some(),
        });
        if let Some(pod) = pod {
            self.record_fate(outcome.primary, pod, outcome.primary_fate);
        }

        Ok(outcome)
    }

    fn record_fate(&mut self, operator: OperatorId, pod: PodIdx, fate: PrimaryFate) {
        if let PrimaryFate::Evicted { withdrawable } = fate {
            self.events.push(PoolEvent::OperatorEvicted {
                operator,
                pod,
                withdrawable,
            });
        }
    }

    /// Takes the events recorded since the last call, oldest first.
    pub fn drain_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }
}

impl<S> OperatorPool<S> {
    /// The parameters of the pool.
    pub const fn params(&self) -> &PoolParams {
        &self.params
    }

    /// The pod registry.
    pub const fn registry(&self) -> &PodRegistry {
        &self.registry
    }

    /// The balance ledger.
    pub const fn ledger(&self) -> &EscrowLedger {
        &self.ledger
    }

    /// The job scheduler.
    pub const fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    /// The fee sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// The bond required for the given position in the given pod.
    pub fn preview_bond(&self, pod: PodIdx, position: Position) -> PoolResult<Amount> {
        self.registry.preview_bond(pod, position)
    }

    /// The bond required to join the pod right now.
    pub fn required_bond(&self, pod: PodIdx) -> PoolResult<Amount> {
        self.registry.required_bond(pod)
    }

    /// The status of the job at `now`.
    pub fn job_status(&self, job_id: &JobId, now: Timestamp) -> PoolResult<JobStatus> {
        self.scheduler.job_status(job_id, now)
    }

    /// The unsettled job with the given id.
    pub fn job(&self, job_id: &JobId) -> Option<&OperatorJob> {
        self.scheduler.job(job_id)
    }

    /// The balances of the operator.
    pub fn balance(&self, operator: &OperatorId) -> PoolResult<BondLedgerEntry> {
        self.ledger
            .entry(operator)
            .cloned()
            .ok_or(PoolError::UnknownOperator(*operator))
    }

    /// Takes a read-only snapshot of the pool.
    ///
    /// This copies every component, so it is meant for inspection rather than for every read.
    pub fn view(&self) -> PoolView {
        PoolView {
            params: self.params,
            registry: self.registry.clone(),
            ledger: self.ledger.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

/// A read-only snapshot of an [`OperatorPool`].
///
/// A snapshot stays unchanged while the pool itself keeps changing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolView {
    params: PoolParams,
    registry: PodRegistry,
    ledger: EscrowLedger,
    scheduler: JobScheduler,
}

impl PoolView {
    /// The parameters of the pool.
    pub const fn params(&self) -> &PoolParams {
        &self.params
    }

    /// The pod registry at the time of the snapshot.
    pub const fn registry(&self) -> &PodRegistry {
        &self.registry
    }

    /// The bond required for the given position in the given pod.
    pub fn preview_bond(&self, pod: PodIdx, position: Position) -> PoolResult<Amount> {
        self.registry.preview_bond(pod, position)
    }

    /// The bond required to join the pod.
    pub fn required_bond(&self, pod: PodIdx) -> PoolResult<Amount> {
        self.registry.required_bond(pod)
    }

    /// The status of the job at `now`.
    pub fn job_status(&self, job_id: &JobId, now: Timestamp) -> PoolResult<JobStatus> {
        self.scheduler.job_status(job_id, now)
    }

    /// The unsettled job with the given id.
    pub fn job(&self, job_id: &JobId) -> Option<&OperatorJob> {
        self.scheduler.job(job_id)
    }

    /// The balances of the operator.
    pub fn balance(&self, operator: &OperatorId) -> PoolResult<BondLedgerEntry> {
        self.ledger
            .entry(operator)
            .cloned()
            .ok_or(PoolError::UnknownOperator(*operator))
    }
}
