//! Publication of jobs and selection of the operators that may finalize them.

use std::collections::{BTreeMap, VecDeque};

use operator_pool_params::{default::ARCHIVE_CAPACITY, prelude::NUM_BACKUP_OPERATORS};
use operator_pool_primitives::{ChainContext, JobId, OperatorId, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    errors::{PoolError, PoolResult},
    escrow::EscrowLedger,
    job::{BackupSlot, FailedAttempt, JobRequest, JobState, JobStatus, OperatorJob, Role},
    pod_registry::{Member, PodRegistry},
    randomness::{backup_seed, derive_index, derive_seed, mix_with_block_hash, Seed},
};

/// The terminal record of a settled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArchivedJob {
    /// The job was finalized.
    Finalized {
        /// The operator that finalized it.
        by: OperatorId,
        /// The capacity it acted in.
        role: Role,
        /// When it was finalized.
        at: Timestamp,
    },

    /// The job was abandoned after every window closed.
    Abandoned {
        /// When the last window closed.
        closed_at: Timestamp,
    },
}

impl ArchivedJob {
    fn status(&self) -> JobStatus {
        match *self {
            ArchivedJob::Finalized { at, .. } => JobStatus {
                state: JobState::Finalized,
                eligible_operator: None,
                window_opens_at: at,
                next_window_at: None,
            },
            ArchivedJob::Abandoned { closed_at } => JobStatus {
                state: JobState::Abandoned,
                eligible_operator: None,
                window_opens_at: closed_at,
                next_window_at: None,
            },
        }
    }
}

/// Owns every published job and decides who may finalize it when.
///
/// Settled jobs keep a terminal record until `archive_capacity` newer ones push it out. Once
/// pruned, a job is unknown again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobScheduler {
    /// Unsettled jobs.
    jobs: BTreeMap<JobId, OperatorJob>,

    /// Settled jobs.
    archive: BTreeMap<JobId, ArchivedJob>,

    /// Archived job ids, oldest first.
    archive_order: VecDeque<JobId>,

    archive_capacity: usize,

    last_nonce: Option<u64>,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler {
    /// Creates a scheduler without any jobs that keeps the default number of settled jobs.
    pub const fn new() -> Self {
        Self::with_archive_capacity(ARCHIVE_CAPACITY as usize)
    }

    /// Creates a scheduler without any jobs that keeps at most `capacity` settled jobs.
    pub const fn with_archive_capacity(capacity: usize) -> Self {
        Self {
            jobs: BTreeMap::new(),
            archive: BTreeMap::new(),
            archive_order: VecDeque::new(),
            archive_capacity: capacity,
            last_nonce: None,
        }
    }

    /// The number of settled jobs whose terminal record is currently kept.
    pub fn archived_count(&self) -> usize {
        self.archive.len()
    }

    /// Returns the unsettled job with the given id.
    pub fn job(&self, job_id: &JobId) -> Option<&OperatorJob> {
        self.jobs.get(job_id)
    }

    /// Returns an iterator over all unsettled jobs.
    pub fn jobs(&self) -> impl Iterator<Item = &OperatorJob> {
        self.jobs.values()
    }

    /// Returns the terminal record of a settled job.
    pub fn archived(&self, job_id: &JobId) -> Option<&ArchivedJob> {
        self.archive.get(job_id)
    }

    /// The last nonce a job was published with.
    pub const fn last_nonce(&self) -> Option<u64> {
        self.last_nonce
    }

    /// Publishes a job, selects its pod, primary and backups, and escrows the primary's bond.
    pub fn publish_job(
        &mut self,
        request: JobRequest,
        ctx: &ChainContext,
        registry: &mut PodRegistry,
        ledger: &mut EscrowLedger,
    ) -> PoolResult<JobId> {
        let job_id = request.job_id();

        if self.jobs.contains_key(&job_id)
            || matches!(
                self.archive.get(&job_id),
                Some(ArchivedJob::Finalized { .. })
            )
        {
            return Err(PoolError::DuplicateJob(job_id));
        }

        if request.block_time_allowance == 0 {
            return Err(PoolError::InvalidAllowance);
        }

        if let Some(last) = self.last_nonce {
            if ctx.nonce <= last {
                return Err(PoolError::StaleNonce {
                    nonce: ctx.nonce,
                    last,
                });
            }
        }

        let seed = derive_seed(&job_id, ctx.nonce, ctx.block_number, ctx.block_timestamp);

        let active_pods = registry.active_pods();
        if active_pods.is_empty() {
            return Err(PoolError::EmptyPodSet);
        }
        let pod = active_pods[derive_index(seed, active_pods.len())?];

        let available = registry.available_members(pod);
        let primary_seed = mix_with_block_hash(seed, &ctx.prior_block_hash);
        let primary = available[derive_index(primary_seed, available.len())?];

        let candidates: Vec<Member> = registry
            .members(pod)
            .iter()
            .filter(|member| member.operator != primary.operator)
            .copied()
            .collect();
        let backups = select_backups(seed, &candidates)?;

        let escrowed = registry.curve().current_bond(pod, primary.bond_position)?;
        ledger.lock(&primary.operator, job_id, escrowed)?;
        registry.mark_busy(primary.operator)?;

        debug!(%job_id, %seed, %pod, ?backups, "selected operators");
        info!(%job_id, %pod, primary = %primary.operator, %escrowed, nonce = ctx.nonce, "job published");

        let job = OperatorJob {
            id: job_id,
            pod,
            block_time_allowance: request.block_time_allowance,
            primary: primary.operator,
            primary_bond_position: primary.bond_position,
            escrowed,
            start_block: ctx.block_number,
            start_timestamp: ctx.block_timestamp,
            nonce: ctx.nonce,
            gas_limit: request.gas_limit,
            max_gas_price: request.max_gas_price,
            payload: request.payload,
            backups,
            failed_attempts: Vec::new(),
        };

        if self.archive.remove(&job_id).is_some() {
            self.archive_order.retain(|archived| *archived != job_id);
        }
        self.jobs.insert(job_id, job);
        self.last_nonce = Some(ctx.nonce);

        Ok(job_id)
    }

    /// The status of the job at `now`.
    pub fn job_status(&self, job_id: &JobId, now: Timestamp) -> PoolResult<JobStatus> {
        if let Some(job) = self.jobs.get(job_id) {
            return Ok(job.status_at(now));
        }

        self.archive
            .get(job_id)
            .map(ArchivedJob::status)
            .ok_or(PoolError::UnknownJob(*job_id))
    }

    /// Returns the unsettled job, or the error that explains why it cannot be acted upon.
    pub(crate) fn open_job(&self, job_id: &JobId) -> PoolResult<&OperatorJob> {
        if let Some(job) = self.jobs.get(job_id) {
            return Ok(job);
        }

        match self.archive.get(job_id) {
            Some(ArchivedJob::Finalized { .. }) => Err(PoolError::JobAlreadyFinalized(*job_id)),
            Some(ArchivedJob::Abandoned { .. }) => Err(PoolError::JobAbandoned(*job_id)),
            None => Err(PoolError::UnknownJob(*job_id)),
        }
    }

    /// Records a finalize attempt that failed.
    pub(crate) fn record_failure(
        &mut self,
        job_id: &JobId,
        attempt: FailedAttempt,
    ) -> PoolResult<usize> {
        let job = self
            .jobs
            .get_mut(job_id)
            .ok_or(PoolError::UnknownJob(*job_id))?;
        job.failed_attempts.push(attempt);

        Ok(job.failed_attempts.len())
    }

    /// Removes a job from the set of unsettled jobs and keeps its terminal record.
    pub(crate) fn archive(
        &mut self,
        job_id: &JobId,
        record: ArchivedJob,
    ) -> PoolResult<OperatorJob> {
        let job = self
            .jobs
            .remove(job_id)
            .ok_or(PoolError::UnknownJob(*job_id))?;
        self.archive.insert(*job_id, record);
        self.archive_order.push_back(*job_id);

        while self.archive_order.len() > self.archive_capacity {
            let Some(pruned) = self.archive_order.pop_front() else {
                break;
            };
            self.archive.remove(&pruned);
            debug!(job_id = %pruned, "pruned archived job");
        }

        Ok(job)
    }
}

/// Selects up to [`NUM_BACKUP_OPERATORS`] backups from the candidates, which must not include the
/// primary.
///
/// With at least as many candidates as backups, collisions are resolved by probing the next
/// candidate so that all backups are distinct. With fewer candidates, backups may repeat.
pub fn select_backups(seed: Seed, candidates: &[Member]) -> PoolResult<Vec<BackupSlot>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let distinct = candidates.len() >= NUM_BACKUP_OPERATORS;
    let mut taken = vec![false; candidates.len()];
    let mut backups = Vec::with_capacity(NUM_BACKUP_OPERATORS);

    for salt in 0..NUM_BACKUP_OPERATORS as u8 {
        let mut idx = derive_index(backup_seed(seed, salt), candidates.len())?;

        if distinct {
            while taken[idx] {
                idx = (idx + 1) % candidates.len();
            }
            taken[idx] = true;
        }

        let member = candidates[idx];
        backups.push(BackupSlot {
            operator: member.operator,
            position: member.position,
        });
    }

    Ok(backups)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use ethnum::U256;
    use operator_pool_params::prelude::BondCurveParams;
    use operator_pool_primitives::{Amount, BlockHash};
    use proptest::prelude::*;

    use super::*;
    use crate::bond_curve::BondCurve;

    fn operator(byte: u8) -> OperatorId {
        OperatorId::new([byte; 20])
    }

    fn members(n: u8) -> Vec<Member> {
        (0..n)
            .map(|i| Member {
                operator: operator(i),
                position: u32::from(i) + 1,
                bond_position: u32::from(i) + 1,
            })
            .collect()
    }

    fn ctx(nonce: u64) -> ChainContext {
        ChainContext {
            nonce,
            block_number: 100 + nonce,
            block_timestamp: 1_000,
            prior_block_hash: BlockHash::new([7; 32]),
        }
    }

    fn request(payload: &[u8]) -> JobRequest {
        JobRequest {
            payload: payload.to_vec(),
            gas_limit: 100_000,
            max_gas_price: 50,
            block_time_allowance: 10,
        }
    }

    fn setup(n: u8) -> (PodRegistry, EscrowLedger) {
        let mut registry = PodRegistry::new(BondCurve::new(BondCurveParams::default()).unwrap());
        let mut ledger = EscrowLedger::new();

        for i in 0..n {
            registry
                .join_pod(operator(i), 0, Amount::from_tokens(100), &mut ledger)
                .unwrap();
        }

        (registry, ledger)
    }

    #[test]
    fn publish_escrows_the_primary_and_marks_it_busy() {
        let (mut registry, mut ledger) = setup(8);
        let mut scheduler = JobScheduler::new();

        let job_id = scheduler
            .publish_job(request(b"job"), &ctx(1), &mut registry, &mut ledger)
            .unwrap();
        let job = scheduler.job(&job_id).unwrap().clone();

        assert_eq!(job.pod, 0);
        assert_eq!(job.escrowed, Amount::from_tokens(100));
        assert_eq!(job.backups.len(), NUM_BACKUP_OPERATORS);
        assert!(job.backups.iter().all(|b| b.operator != job.primary));

        let entry = ledger.entry(&job.primary).unwrap();
        assert_eq!(entry.escrowed, Amount::from_tokens(100));
        assert_eq!(entry.locked_for, Some(job_id));
        assert!(registry.pod(0).unwrap().is_busy(&job.primary));
        assert_eq!(scheduler.last_nonce(), Some(1));
    }

    #[test]
    fn publish_validates_the_request() {
        let (mut registry, mut ledger) = setup(2);
        let mut scheduler = JobScheduler::new();

        scheduler
            .publish_job(request(b"job"), &ctx(5), &mut registry, &mut ledger)
            .unwrap();

        assert_eq!(
            scheduler.publish_job(request(b"job"), &ctx(6), &mut registry, &mut ledger),
            Err(PoolError::DuplicateJob(JobId::from_payload(b"job")))
        );
        assert_eq!(
            scheduler.publish_job(request(b"other"), &ctx(5), &mut registry, &mut ledger),
            Err(PoolError::StaleNonce { nonce: 5, last: 5 })
        );

        let mut zero = request(b"zero");
        zero.block_time_allowance = 0;
        assert_eq!(
            scheduler.publish_job(zero, &ctx(6), &mut registry, &mut ledger),
            Err(PoolError::InvalidAllowance)
        );
    }

    #[test]
    fn publish_fails_without_available_operators() {
        let (mut registry, mut ledger) = setup(0);
        let mut scheduler = JobScheduler::new();

        assert_eq!(
            scheduler.publish_job(request(b"a"), &ctx(1), &mut registry, &mut ledger),
            Err(PoolError::EmptyPodSet)
        );

        let (mut registry, mut ledger) = setup(1);
        scheduler
            .publish_job(request(b"a"), &ctx(1), &mut registry, &mut ledger)
            .unwrap();
        assert_eq!(
            scheduler.publish_job(request(b"b"), &ctx(2), &mut registry, &mut ledger),
            Err(PoolError::EmptyPodSet),
            "the only operator is busy"
        );
    }

    #[test]
    fn lone_primary_has_no_backups() {
        let (mut registry, mut ledger) = setup(1);
        let mut scheduler = JobScheduler::new();

        let job_id = scheduler
            .publish_job(request(b"job"), &ctx(1), &mut registry, &mut ledger)
            .unwrap();

        assert!(scheduler.job(&job_id).unwrap().backups.is_empty());
    }

    #[test]
    fn archive_prunes_the_oldest_records() {
        let (mut registry, mut ledger) = setup(8);
        let mut scheduler = JobScheduler::with_archive_capacity(2);

        let job_ids: Vec<_> = (1..=3u8)
            .map(|i| {
                let job_id = scheduler
                    .publish_job(request(&[i]), &ctx(u64::from(i)), &mut registry, &mut ledger)
                    .unwrap();
                let primary = scheduler.job(&job_id).unwrap().primary;
                scheduler
                    .archive(
                        &job_id,
                        ArchivedJob::Finalized {
                            by: primary,
                            role: Role::Primary,
                            at: 1_000,
                        },
                    )
                    .unwrap();
                job_id
            })
            .collect();

        assert_eq!(scheduler.archived_count(), 2);
        assert_eq!(scheduler.archived(&job_ids[0]), None);
        assert_eq!(
            scheduler.job_status(&job_ids[0], 1_000),
            Err(PoolError::UnknownJob(job_ids[0]))
        );
        assert_eq!(
            scheduler.job_status(&job_ids[2], 1_000).unwrap().state,
            JobState::Finalized
        );
    }

    #[test]
    fn status_of_unknown_job_fails() {
        let scheduler = JobScheduler::new();
        let job_id = JobId::from_payload(b"nothing");

        assert_eq!(
            scheduler.job_status(&job_id, 0),
            Err(PoolError::UnknownJob(job_id))
        );
    }

    #[test]
    fn few_candidates_repeat() {
        let seed = Seed::new(U256::new(42));
        let backups = select_backups(seed, &members(2)).unwrap();

        assert_eq!(backups.len(), NUM_BACKUP_OPERATORS);
        assert!(backups
            .iter()
            .all(|b| b.operator == operator(0) || b.operator == operator(1)));
    }

    proptest! {
        #[test]
        fn backups_are_distinct_with_enough_candidates(
            bytes in any::<[u8; 32]>(),
            n in (NUM_BACKUP_OPERATORS as u8)..40,
        ) {
            let seed = Seed::new(U256::from_be_bytes(bytes));
            let backups = select_backups(seed, &members(n)).unwrap();

            let distinct: BTreeSet<_> = backups.iter().map(|b| b.operator).collect();
            prop_assert_eq!(backups.len(), NUM_BACKUP_OPERATORS);
            prop_assert_eq!(distinct.len(), NUM_BACKUP_OPERATORS);
        }

        #[test]
        fn selection_is_deterministic(nonce in 1u64..1_000, n in 1u8..12) {
            let run = || {
                let (mut registry, mut ledger) = setup(n);
                let mut scheduler = JobScheduler::new();
                let job_id = scheduler
                    .publish_job(request(b"job"), &ctx(nonce), &mut registry, &mut ledger)
                    .unwrap();
                scheduler.job(&job_id).unwrap().clone()
            };

            prop_assert_eq!(run(), run());
        }
    }
}
