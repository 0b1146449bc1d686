//! Settlement of finalized and abandoned jobs.
//!
//! A primary that finalizes its own job gets its escrow back plus the job reward. A backup that
//! has to step in is paid the reward plus a share of the primary's slashed escrow, unless the
//! gas price spiked above what the submitter declared, in which case the primary is not at
//! fault. A slashed primary keeps its pod membership only while its remaining bond still covers
//! its position.

use operator_pool_params::prelude::{AbandonmentPolicy, SlashingParams};
use operator_pool_primitives::{Amount, JobId, OperatorId, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    errors::{PoolError, PoolResult},
    escrow::EscrowLedger,
    job::{ExecutionReport, FailedAttempt, JobRequest, OperatorJob, Role},
    pod_registry::PodRegistry,
    scheduler::{ArchivedJob, JobScheduler},
    sink::{FeeSink, SinkReason},
};

/// What happened to a slashed primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fate", rename_all = "snake_case")]
pub enum PrimaryFate {
    /// Its remaining bond still covers its position, so it stays in its pod.
    Rebonded {
        /// The bonded balance after slashing.
        bonded: Amount,
    },

    /// Its remaining bond no longer covers its position, so it was removed from its pod.
    Evicted {
        /// The withdrawable balance after eviction.
        withdrawable: Amount,
    },
}

/// How a successfully finalized job was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "settlement", rename_all = "snake_case")]
pub enum Settlement {
    /// The primary finalized its own job.
    Primary {
        /// The reward paid to the primary.
        reward: Amount,
    },

    /// A backup finalized the job and the primary was slashed.
    Slashed {
        /// The slot of the backup that stepped in.
        backup_slot: u8,
        /// The total paid to the backup: the job reward plus its share of the slashed bond.
        backup_payout: Amount,
        /// The amount slashed from the primary's escrow.
        slashed: Amount,
        /// The part of the slashed amount routed to the sink.
        to_sink: Amount,
        /// What happened to the primary.
        primary_fate: PrimaryFate,
    },

    /// A backup finalized the job, but at a gas price above the declared maximum, so the
    /// primary was released without penalty.
    GasPriceExceeded {
        /// The slot of the backup that stepped in.
        backup_slot: u8,
        /// The reward paid to the backup.
        reward: Amount,
    },
}

impl Settlement {
    /// The capacity in which the job was finalized.
    pub const fn role(&self) -> Role {
        match *self {
            Settlement::Primary { .. } => Role::Primary,
            Settlement::Slashed { backup_slot, .. }
            | Settlement::GasPriceExceeded { backup_slot, .. } => Role::Backup { slot: backup_slot },
        }
    }
}

/// The outcome of a finalize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    /// The job was finalized and settled.
    Settled {
        /// The job that was settled.
        job_id: JobId,
        /// The operator that finalized the job.
        operator: OperatorId,
        /// How the job was settled.
        settlement: Settlement,
    },

    /// The execution reverted before spending the declared gas limit; the job stays open.
    Failed {
        /// The job that stays open.
        job_id: JobId,
        /// The number of failed attempts recorded for the job so far.
        attempts: usize,
    },
}

/// The outcome of abandoning a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbandonOutcome {
    /// The job that was abandoned.
    pub job_id: JobId,

    /// The primary that missed its window.
    pub primary: OperatorId,

    /// The amount slashed from the primary, all of which went to the sink.
    pub slashed: Amount,

    /// What happened to the primary.
    pub primary_fate: PrimaryFate,

    /// The original request, if the abandonment policy asks for the job to be published again.
    pub republish: Option<JobRequest>,
}

/// Applies rewards and penalties when jobs settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlashingEngine {
    params: SlashingParams,
}

impl SlashingEngine {
    /// Creates a new slashing engine.
    pub const fn new(params: SlashingParams) -> Self {
        Self { params }
    }

    /// Returns the slashing parameters.
    pub const fn params(&self) -> &SlashingParams {
        &self.params
    }

    /// Finalizes a job on behalf of `operator` and settles it.
    #[expect(clippy::too_many_arguments)]
    pub fn finalize(
        &self,
        job_id: &JobId,
        operator: OperatorId,
        report: ExecutionReport,
        now: Timestamp,
        scheduler: &mut JobScheduler,
        registry: &mut PodRegistry,
        ledger: &mut EscrowLedger,
        sink: &mut impl FeeSink,
    ) -> PoolResult<FinalizeOutcome> {
        let job = scheduler.open_job(job_id)?;

        let not_eligible = PoolError::NotEligible {
            operator,
            job: *job_id,
        };
        let role = job.role_of(&operator, now).ok_or(not_eligible.clone())?;

        if let Role::Backup { .. } = role {
            let still_member = registry
                .membership(&operator)
                .is_some_and(|membership| membership.pod == job.pod);
            if !still_member {
                return Err(not_eligible);
            }
        }

        if !report.is_success(job.gas_limit) {
            let attempts = scheduler.record_failure(
                job_id,
                FailedAttempt {
                    operator,
                    at: now,
                    report,
                },
            )?;

            warn!(%job_id, %operator, %role, gas_used = report.gas_used, %attempts, "finalize attempt failed");

            return Ok(FinalizeOutcome::Failed {
                job_id: *job_id,
                attempts,
            });
        }

        let job = job.clone();
        let reward = self.params.job_reward;

        let settlement = match role {
            Role::Primary => {
                ledger.release(&job.primary)?;
                ledger.reward(&job.primary, reward)?;
                registry.mark_available(&job.primary)?;

                Settlement::Primary { reward }
            }
            Role::Backup { slot } if report.gas_price > job.max_gas_price => {
                ledger.release(&job.primary)?;
                registry.mark_available(&job.primary)?;
                ledger.reward(&operator, reward)?;

                info!(%job_id, primary = %job.primary, gas_price = report.gas_price, max_gas_price = job.max_gas_price, "gas price exceeded, primary released without penalty");

                Settlement::GasPriceExceeded {
                    backup_slot: slot,
                    reward,
                }
            }
            Role::Backup { slot } => {
                let slashed = ledger.slash_amount(&job.primary, self.params.slash_fraction)?;
                let share = slashed
                    .checked_mul_fixed(self.params.backup_share)
                    .ok_or(PoolError::BalanceOverflow(operator))?
                    .min(slashed);
                let to_sink = slashed.saturating_sub(share);
                let backup_payout = reward
                    .checked_add(share)
                    .ok_or(PoolError::BalanceOverflow(operator))?;

                ledger.slash(&job.primary, self.params.slash_fraction)?;
                ledger.reward(&operator, backup_payout)?;
                if !to_sink.is_zero() {
                    sink.route_to_burn_or_treasury(to_sink, SinkReason::SlashedBond);
                }

                let primary_fate = rebond_or_evict(&job, registry, ledger)?;

                info!(%job_id, primary = %job.primary, backup = %operator, %slashed, %backup_payout, %to_sink, ?primary_fate, "primary slashed");

                Settlement::Slashed {
                    backup_slot: slot,
                    backup_payout,
                    slashed,
                    to_sink,
                    primary_fate,
                }
            }
        };

        scheduler.archive(
            job_id,
            ArchivedJob::Finalized {
                by: operator,
                role,
                at: now,
            },
        )?;

        info!(%job_id, %operator, %role, "job finalized");

        Ok(FinalizeOutcome::Settled {
            job_id: *job_id,
            operator,
            settlement,
        })
    }

    /// Abandons a job whose last window has been open for a full allowance.
    ///
    /// The slashed part of the primary's escrow goes to the sink in full, as no backup stepped
    /// in.
    #[expect(clippy::too_many_arguments)]
    pub fn abandon(
        &self,
        job_id: &JobId,
        now: Timestamp,
        policy: AbandonmentPolicy,
        scheduler: &mut JobScheduler,
        registry: &mut PodRegistry,
        ledger: &mut EscrowLedger,
        sink: &mut impl FeeSink,
    ) -> PoolResult<AbandonOutcome> {
        let job = scheduler.open_job(job_id)?;

        if !job.is_abandonable(now) {
            return Err(PoolError::JobStillActive(*job_id));
        }

        let job = job.clone();
        let closed_at = job.abandonable_at();

        let slashed = ledger.slash(&job.primary, self.params.slash_fraction)?;
        if !slashed.is_zero() {
            sink.route_to_burn_or_treasury(slashed, SinkReason::AbandonedJob);
        }

        let primary_fate = rebond_or_evict(&job, registry, ledger)?;

        scheduler.archive(job_id, ArchivedJob::Abandoned { closed_at })?;

        let republish = match policy {
            AbandonmentPolicy::Republish => Some(job.request()),
            AbandonmentPolicy::LeaveUntouched => None,
        };

        warn!(%job_id, primary = %job.primary, %slashed, ?primary_fate, ?policy, "job abandoned");

        Ok(AbandonOutcome {
            job_id: *job_id,
            primary: job.primary,
            slashed,
            primary_fate,
            republish,
        })
    }
}

/// Keeps the slashed primary in its pod if its remaining bond still covers its position, and
/// evicts it otherwise.
fn rebond_or_evict(
    job: &OperatorJob,
    registry: &mut PodRegistry,
    ledger: &mut EscrowLedger,
) -> PoolResult<PrimaryFate> {
    let bonded = ledger
        .entry(&job.primary)
        .map(|entry| entry.bonded)
        .ok_or(PoolError::UnknownOperator(job.primary))?;
    let required = registry
        .curve()
        .current_bond(job.pod, job.primary_bond_position)?;

    if bonded >= required {
        registry.mark_available(&job.primary)?;

        return Ok(PrimaryFate::Rebonded { bonded });
    }

    let withdrawable = registry.evict(job.primary, ledger)?;

    Ok(PrimaryFate::Evicted { withdrawable })
}

#[cfg(test)]
mod tests {
    use operator_pool_params::prelude::{JobParams, PoolParams};
    use operator_pool_primitives::{BlockHash, ChainContext};

    use super::*;
    use crate::{job::JobState, pool::OperatorPool, sink::RecordingSink};

    const START: Timestamp = 10_000;
    const ALLOWANCE: u64 = 60;

    fn operator(byte: u8) -> OperatorId {
        OperatorId::new([byte; 20])
    }

    fn request(payload: &[u8]) -> JobRequest {
        JobRequest {
            payload: payload.to_vec(),
            gas_limit: 100_000,
            max_gas_price: 50,
            block_time_allowance: ALLOWANCE,
        }
    }

    fn ctx(nonce: u64) -> ChainContext {
        ChainContext {
            nonce,
            block_number: nonce,
            block_timestamp: START,
            prior_block_hash: BlockHash::new([0x42; 32]),
        }
    }

    fn report(gas_price: u64) -> ExecutionReport {
        ExecutionReport {
            gas_used: 80_000,
            gas_price,
            reverted: false,
        }
    }

    /// A pool of six operators in pod 0, each bonding `bond` tokens, with one published job.
    fn pool_with_job(bond: u64, params: PoolParams) -> (OperatorPool<RecordingSink>, OperatorJob) {
        let mut pool = OperatorPool::new(params, RecordingSink::new()).unwrap();
        for byte in 1..=6 {
            pool.join_pod(operator(byte), 0, Amount::from_tokens(bond))
                .unwrap();
        }

        let job_id = pool.publish_job(request(b"job"), ctx(1)).unwrap();
        let job = pool.job(&job_id).unwrap().clone();

        (pool, job)
    }

    #[test]
    fn primary_success_returns_escrow_plus_reward() {
        let (mut pool, job) = pool_with_job(100, PoolParams::default());

        let outcome = pool
            .finalize(&job.id, job.primary, report(10), START + 1)
            .unwrap();
        assert_eq!(
            outcome,
            FinalizeOutcome::Settled {
                job_id: job.id,
                operator: job.primary,
                settlement: Settlement::Primary {
                    reward: Amount::from_tokens(1)
                },
            }
        );

        let entry = pool.balance(&job.primary).unwrap();
        assert_eq!(entry.bonded, Amount::from_tokens(101));
        assert_eq!(entry.escrowed, Amount::ZERO);
        assert!(!pool.registry().pod(0).unwrap().is_busy(&job.primary));

        assert_eq!(
            pool.finalize(&job.id, job.primary, report(10), START + 2),
            Err(PoolError::JobAlreadyFinalized(job.id)),
            "only one finalize may succeed"
        );
        assert_eq!(
            pool.job_status(&job.id, START + 2).unwrap().state,
            JobState::Finalized
        );
    }

    #[test]
    fn backups_wait_for_their_window() {
        let (mut pool, job) = pool_with_job(100, PoolParams::default());
        let backup = job.backups[1].operator;

        assert_eq!(
            pool.finalize(&job.id, backup, report(10), START + ALLOWANCE),
            Err(PoolError::NotEligible {
                operator: backup,
                job: job.id
            })
        );
        assert_eq!(
            pool.finalize(&job.id, operator(99), report(10), START),
            Err(PoolError::NotEligible {
                operator: operator(99),
                job: job.id
            })
        );
    }

    #[test]
    fn backup_success_slashes_and_evicts_underbonded_primary() {
        let (mut pool, job) = pool_with_job(100, PoolParams::default());
        let backup = job.backups[0].operator;

        let outcome = pool
            .finalize(&job.id, backup, report(50), START + ALLOWANCE)
            .unwrap();
        assert_eq!(
            outcome,
            FinalizeOutcome::Settled {
                job_id: job.id,
                operator: backup,
                settlement: Settlement::Slashed {
                    backup_slot: 0,
                    backup_payout: Amount::from_tokens(26),
                    slashed: Amount::from_tokens(50),
                    to_sink: Amount::from_tokens(25),
                    primary_fate: PrimaryFate::Evicted {
                        withdrawable: Amount::from_tokens(50)
                    },
                },
            }
        );

        assert_eq!(
            pool.balance(&backup).unwrap().bonded,
            Amount::from_tokens(126)
        );
        assert_eq!(
            pool.sink().total_for(SinkReason::SlashedBond),
            Amount::from_tokens(25)
        );
        assert_eq!(pool.registry().membership(&job.primary), None);
        assert_eq!(pool.withdraw(job.primary).unwrap(), Amount::from_tokens(50));
    }

    #[test]
    fn overbonded_primary_is_rebonded_after_slashing() {
        let (mut pool, job) = pool_with_job(300, PoolParams::default());
        let backup = job.backups[2].operator;

        let outcome = pool
            .finalize(&job.id, backup, report(1), START + 3 * ALLOWANCE)
            .unwrap();
        let FinalizeOutcome::Settled {
            settlement: Settlement::Slashed { primary_fate, .. },
            ..
        } = outcome
        else {
            panic!("expected a slashing settlement, got {outcome:?}");
        };

        assert_eq!(
            primary_fate,
            PrimaryFate::Rebonded {
                bonded: Amount::from_tokens(250)
            }
        );
        assert!(pool.registry().membership(&job.primary).is_some());
        assert!(!pool.registry().pod(0).unwrap().is_busy(&job.primary));
    }

    #[test]
    fn gas_spike_releases_primary_without_penalty() {
        let (mut pool, job) = pool_with_job(100, PoolParams::default());
        let backup = job.backups[0].operator;

        let outcome = pool
            .finalize(&job.id, backup, report(51), START + ALLOWANCE)
            .unwrap();
        assert_eq!(
            outcome,
            FinalizeOutcome::Settled {
                job_id: job.id,
                operator: backup,
                settlement: Settlement::GasPriceExceeded {
                    backup_slot: 0,
                    reward: Amount::from_tokens(1)
                },
            }
        );

        let primary = pool.balance(&job.primary).unwrap();
        assert_eq!(primary.bonded, Amount::from_tokens(100));
        assert_eq!(primary.escrowed, Amount::ZERO);
        assert_eq!(
            pool.balance(&backup).unwrap().bonded,
            Amount::from_tokens(101)
        );
        assert!(pool.sink().routed().is_empty());
    }

    #[test]
    fn failed_attempts_keep_the_job_open() {
        let (mut pool, job) = pool_with_job(100, PoolParams::default());
        let reverted = ExecutionReport {
            gas_used: 99_999,
            gas_price: 10,
            reverted: true,
        };

        assert_eq!(
            pool.finalize(&job.id, job.primary, reverted, START + 1),
            Ok(FinalizeOutcome::Failed {
                job_id: job.id,
                attempts: 1
            })
        );
        assert_eq!(pool.job(&job.id).unwrap().failed_attempts.len(), 1);

        let out_of_gas = ExecutionReport {
            gas_used: 100_000,
            ..reverted
        };
        assert!(matches!(
            pool.finalize(&job.id, job.primary, out_of_gas, START + 2),
            Ok(FinalizeOutcome::Settled { .. })
        ));
    }

    #[test]
    fn departed_backups_are_not_eligible() {
        let (mut pool, job) = pool_with_job(100, PoolParams::default());
        let backup = job.backups[0].operator;

        pool.leave_pod(backup).unwrap();

        assert_eq!(
            pool.finalize(&job.id, backup, report(10), START + ALLOWANCE),
            Err(PoolError::NotEligible {
                operator: backup,
                job: job.id
            })
        );
    }

    #[test]
    fn abandonment_slashes_to_the_sink() {
        let (mut pool, job) = pool_with_job(100, PoolParams::default());
        let deadline = START + 6 * ALLOWANCE;

        assert_eq!(
            pool.abandon_job(&job.id, deadline - 1),
            Err(PoolError::JobStillActive(job.id))
        );
        assert_eq!(
            pool.job_status(&job.id, deadline).unwrap().state,
            JobState::BackupWindow(5),
            "the deadline alone does not abandon a job"
        );

        let outcome = pool.abandon_job(&job.id, deadline).unwrap();
        assert_eq!(outcome.slashed, Amount::from_tokens(50));
        assert_eq!(
            outcome.primary_fate,
            PrimaryFate::Evicted {
                withdrawable: Amount::from_tokens(50)
            }
        );
        assert_eq!(outcome.republish, None);
        assert_eq!(
            pool.sink().total_for(SinkReason::AbandonedJob),
            Amount::from_tokens(50)
        );

        assert_eq!(
            pool.abandon_job(&job.id, deadline),
            Err(PoolError::JobAbandoned(job.id))
        );
        assert_eq!(
            pool.finalize(&job.id, job.primary, report(10), deadline),
            Err(PoolError::JobAbandoned(job.id))
        );
        let status = pool.job_status(&job.id, deadline + 1).unwrap();
        assert_eq!(status.state, JobState::Abandoned);
        assert_eq!(status.window_opens_at, deadline);
    }

    #[test]
    fn last_backup_can_finalize_past_the_deadline() {
        let (mut pool, job) = pool_with_job(100, PoolParams::default());
        let last_backup = job.backups[4].operator;
        let late = START + 10 * ALLOWANCE;

        let outcome = pool.finalize(&job.id, last_backup, report(10), late).unwrap();
        let FinalizeOutcome::Settled { settlement, .. } = outcome else {
            panic!("expected a settlement, got {outcome:?}");
        };
        assert!(matches!(settlement, Settlement::Slashed { .. }));

        let primary = pool.balance(&job.primary).unwrap();
        assert_eq!(primary.escrowed, Amount::ZERO, "the escrow must not stay locked");
        assert_eq!(primary.locked_for, None);
        assert_eq!(
            pool.abandon_job(&job.id, late),
            Err(PoolError::JobAlreadyFinalized(job.id))
        );
    }

    #[test]
    fn republish_policy_hands_back_the_request() {
        let params = PoolParams {
            jobs: JobParams {
                abandonment: AbandonmentPolicy::Republish,
                ..Default::default()
            },
            ..Default::default()
        };
        let (mut pool, job) = pool_with_job(100, params);

        let outcome = pool
            .abandon_job(&job.id, START + 6 * ALLOWANCE)
            .unwrap();
        let request = outcome.republish.unwrap();
        assert_eq!(request, job.request());

        let republished = pool.publish_job(request, ctx(2)).unwrap();
        assert_eq!(republished, job.id);
        assert!(pool.job(&job.id).is_some());
    }
}
