//! Actor-based wrapper around [`OperatorPool`] that serializes every mutation through a single
//! task while letting readers query the pool concurrently.
//!
//! The actor task is the only writer. It holds the write lock only for the duration of a single
//! synchronous operation and answers the caller after the lock is released, so every read issued
//! after a successful write observes it. The events recorded by an operation are broadcast before
//! the answer is sent.

use std::sync::Arc;

use operator_pool_primitives::{
    Amount, ChainContext, JobId, OperatorId, PodIdx, Position, Timestamp,
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    errors::{PoolError, PoolResult},
    escrow::BondLedgerEntry,
    events::PoolEvent,
    job::{ExecutionReport, JobRequest, JobStatus, OperatorJob},
    pod_registry::{JoinReceipt, LeaveReceipt},
    pool::{OperatorPool, PoolView},
    sink::FeeSink,
    slashing::{AbandonOutcome, FinalizeOutcome},
};

/// The number of events a slow subscriber may fall behind before it starts missing them.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Errors returned by a [`PoolActor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolActorError {
    /// The pool rejected the operation.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The actor has shut down and no longer accepts requests.
    #[error("pool actor has stopped")]
    ActorStopped,
}

/// Message types that can be sent to a [`PoolActor`].
#[derive(Debug)]
pub enum PoolMessage {
    /// Admit an operator into a pod.
    JoinPod {
        /// The operator to admit.
        operator: OperatorId,
        /// The pod to join.
        pod: PodIdx,
        /// The bond the operator offers.
        offered: Amount,
        /// Channel to send the result back on.
        respond_to: oneshot::Sender<PoolResult<JoinReceipt>>,
    },

    /// Remove an operator from its pod.
    LeavePod {
        /// The operator to remove.
        operator: OperatorId,
        /// Channel to send the result back on.
        respond_to: oneshot::Sender<PoolResult<LeaveReceipt>>,
    },

    /// Pay out an operator's withdrawable balance.
    Withdraw {
        /// The operator to pay out.
        operator: OperatorId,
        /// Channel to send the result back on.
        respond_to: oneshot::Sender<PoolResult<Amount>>,
    },

    /// Publish a job.
    PublishJob {
        /// The job to publish.
        request: JobRequest,
        /// The chain context the job is published in.
        ctx: ChainContext,
        /// Channel to send the result back on.
        respond_to: oneshot::Sender<PoolResult<JobId>>,
    },

    /// Finalize a job.
    Finalize {
        /// The job to finalize.
        job_id: JobId,
        /// The operator finalizing it.
        operator: OperatorId,
        /// The execution report.
        report: ExecutionReport,
        /// The current time.
        now: Timestamp,
        /// Channel to send the result back on.
        respond_to: oneshot::Sender<PoolResult<FinalizeOutcome>>,
    },

    /// Abandon a job whose last window has been open for a full allowance.
    AbandonJob {
        /// The job to abandon.
        job_id: JobId,
        /// The current time.
        now: Timestamp,
        /// Channel to send the result back on.
        respond_to: oneshot::Sender<PoolResult<AbandonOutcome>>,
    },

    /// Stop processing messages and hand back the pool.
    Shutdown,
}

/// Single writer of an [`OperatorPool`] running in its own task.
#[derive(Debug)]
pub struct PoolActor<S> {
    /// Channel for sending messages to the actor.
    sender: mpsc::UnboundedSender<PoolMessage>,

    /// The pool, written only by the actor task.
    pool: Arc<RwLock<OperatorPool<S>>>,

    /// Events of committed operations.
    events: broadcast::Sender<PoolEvent>,

    /// Handle to the actor task.
    handle: JoinHandle<()>,
}

impl<S> PoolActor<S>
where
    S: FeeSink + Send + Sync + 'static,
{
    /// Spawns a new actor that takes ownership of the pool.
    pub fn spawn(pool: OperatorPool<S>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let pool = Arc::new(RwLock::new(pool));

        let shared = pool.clone();
        let event_tx = events.clone();
        let handle = tokio::spawn(async move {
            info!("pool actor started");

            while let Some(message) = receiver.recv().await {
                match message {
                    PoolMessage::JoinPod {
                        operator,
                        pod,
                        offered,
                        respond_to,
                    } => {
                        debug!(%operator, %pod, %offered, "processing join");
                        apply(&shared, &event_tx, respond_to, |pool| {
                            pool.join_pod(operator, pod, offered)
                        })
                        .await;
                    }
                    PoolMessage::LeavePod {
                        operator,
                        respond_to,
                    } => {
                        debug!(%operator, "processing leave");
                        apply(&shared, &event_tx, respond_to, |pool| pool.leave_pod(operator))
                            .await;
                    }
                    PoolMessage::Withdraw {
                        operator,
                        respond_to,
                    } => {
                        debug!(%operator, "processing withdrawal");
                        apply(&shared, &event_tx, respond_to, |pool| pool.withdraw(operator))
                            .await;
                    }
                    PoolMessage::PublishJob {
                        request,
                        ctx,
                        respond_to,
                    } => {
                        debug!(nonce = ctx.nonce, "processing job publication");
                        apply(&shared, &event_tx, respond_to, |pool| {
                            pool.publish_job(request, ctx)
                        })
                        .await;
                    }
                    PoolMessage::Finalize {
                        job_id,
                        operator,
                        report,
                        now,
                        respond_to,
                    } => {
                        debug!(%job_id, %operator, ?report, "processing finalize");
                        apply(&shared, &event_tx, respond_to, |pool| {
                            pool.finalize(&job_id, operator, report, now)
                        })
                        .await;
                    }
                    PoolMessage::AbandonJob {
                        job_id,
                        now,
                        respond_to,
                    } => {
                        debug!(%job_id, "processing abandonment");
                        apply(&shared, &event_tx, respond_to, |pool| {
                            pool.abandon_job(&job_id, now)
                        })
                        .await;
                    }
                    PoolMessage::Shutdown => {
                        info!("pool actor shutting down");
                        break;
                    }
                }
            }

            info!("pool actor terminated");
        });

        Self {
            sender,
            pool,
            events,
            handle,
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<PoolResult<T>>) -> PoolMessage,
    ) -> Result<T, PoolActorError> {
        let (respond_to, receiver) = oneshot::channel();
        self.sender
            .send(make(respond_to))
            .map_err(|_| PoolActorError::ActorStopped)?;

        Ok(receiver.await.map_err(|_| PoolActorError::ActorStopped)??)
    }

    /// Admits the operator into the pod.
    pub async fn join_pod(
        &self,
        operator: OperatorId,
        pod: PodIdx,
        offered: Amount,
    ) -> Result<JoinReceipt, PoolActorError> {
        self.request(|respond_to| PoolMessage::JoinPod {
            operator,
            pod,
            offered,
            respond_to,
        })
        .await
    }

    /// Removes the operator from its pod.
    pub async fn leave_pod(&self, operator: OperatorId) -> Result<LeaveReceipt, PoolActorError> {
        self.request(|respond_to| PoolMessage::LeavePod {
            operator,
            respond_to,
        })
        .await
    }

    /// Pays out the operator's withdrawable balance.
    pub async fn withdraw(&self, operator: OperatorId) -> Result<Amount, PoolActorError> {
        self.request(|respond_to| PoolMessage::Withdraw {
            operator,
            respond_to,
        })
        .await
    }

    /// Publishes a job.
    pub async fn publish_job(
        &self,
        request: JobRequest,
        ctx: ChainContext,
    ) -> Result<JobId, PoolActorError> {
        self.request(|respond_to| PoolMessage::PublishJob {
            request,
            ctx,
            respond_to,
        })
        .await
    }

    /// Finalizes a job on behalf of the operator.
    pub async fn finalize(
        &self,
        job_id: JobId,
        operator: OperatorId,
        report: ExecutionReport,
        now: Timestamp,
    ) -> Result<FinalizeOutcome, PoolActorError> {
        self.request(|respond_to| PoolMessage::Finalize {
            job_id,
            operator,
            report,
            now,
            respond_to,
        })
        .await
    }

    /// Abandons a job whose last window has been open for a full allowance.
    pub async fn abandon_job(
        &self,
        job_id: JobId,
        now: Timestamp,
    ) -> Result<AbandonOutcome, PoolActorError> {
        self.request(|respond_to| PoolMessage::AbandonJob {
            job_id,
            now,
            respond_to,
        })
        .await
    }

    /// Gracefully shuts down the actor and returns the pool it owned.
    pub async fn shutdown(self) -> Result<OperatorPool<S>, PoolActorError> {
        let _ = self.sender.send(PoolMessage::Shutdown);

        self.handle
            .await
            .map_err(|_| PoolActorError::ActorStopped)?;

        Arc::try_unwrap(self.pool)
            .map(RwLock::into_inner)
            .map_err(|_| PoolActorError::ActorStopped)
    }
}

impl<S> PoolActor<S> {
    /// A copy of the whole pool as it is right now.
    pub async fn view(&self) -> PoolView {
        self.pool.read().await.view()
    }

    /// A receiver of the events of every operation committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// The bond required for the given position in the given pod.
    pub async fn preview_bond(&self, pod: PodIdx, position: Position) -> PoolResult<Amount> {
        self.pool.read().await.preview_bond(pod, position)
    }

    /// The bond required to join the pod.
    pub async fn required_bond(&self, pod: PodIdx) -> PoolResult<Amount> {
        self.pool.read().await.required_bond(pod)
    }

    /// The status of the job at `now`.
    pub async fn job_status(&self, job_id: &JobId, now: Timestamp) -> PoolResult<JobStatus> {
        self.pool.read().await.job_status(job_id, now)
    }

    /// The unsettled job with the given id.
    pub async fn job(&self, job_id: &JobId) -> Option<OperatorJob> {
        self.pool.read().await.job(job_id).cloned()
    }

    /// The balances of the operator.
    pub async fn balance(&self, operator: &OperatorId) -> PoolResult<BondLedgerEntry> {
        self.pool.read().await.balance(operator)
    }
}

/// Runs one operation under the write lock, then broadcasts its events and answers the caller.
async fn apply<S: FeeSink, T>(
    pool: &RwLock<OperatorPool<S>>,
    events: &broadcast::Sender<PoolEvent>,
    respond_to: oneshot::Sender<PoolResult<T>>,
    op: impl FnOnce(&mut OperatorPool<S>) -> PoolResult<T>,
) {
    let (result, emitted) = {
        let mut pool = pool.write().await;
        let result = op(&mut *pool);
        (result, pool.drain_events())
    };

    for event in emitted {
        // Having no subscribers is fine.
        let _ = events.send(event);
    }

    let _ = respond_to.send(result);
}

#[cfg(test)]
mod tests {
    use operator_pool_params::prelude::PoolParams;
    use operator_pool_primitives::BlockHash;
    use tokio::sync::broadcast::error::RecvError;

    use super::*;
    use crate::sink::RecordingSink;

    fn operator(byte: u8) -> OperatorId {
        OperatorId::new([byte; 20])
    }

    fn spawn() -> PoolActor<RecordingSink> {
        PoolActor::spawn(OperatorPool::new(PoolParams::default(), RecordingSink::new()).unwrap())
    }

    fn job_request() -> JobRequest {
        JobRequest {
            payload: b"relay".to_vec(),
            gas_limit: 21_000,
            max_gas_price: 10,
            block_time_allowance: 30,
        }
    }

    fn ctx() -> ChainContext {
        ChainContext {
            nonce: 1,
            block_number: 10,
            block_timestamp: 500,
            prior_block_hash: BlockHash::new([1; 32]),
        }
    }

    #[tokio::test]
    async fn mutations_are_visible_to_readers() {
        let actor = spawn();
        let before = actor.view().await;

        let receipt = actor
            .join_pod(operator(1), 0, Amount::from_tokens(100))
            .await
            .unwrap();
        assert_eq!(receipt.position, 1);

        assert!(before.balance(&operator(1)).is_err());
        assert_eq!(
            actor.balance(&operator(1)).await.unwrap().bonded,
            Amount::from_tokens(100)
        );
        assert_eq!(
            actor.required_bond(0).await.unwrap(),
            Amount::from_tokens(100)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reads_observe_completed_writes() {
        let actor = Arc::new(spawn());

        let tasks: Vec<_> = (0..4u8)
            .map(|worker| {
                let actor = actor.clone();
                tokio::spawn(async move {
                    for i in 0..50u8 {
                        let mut bytes = [0; 20];
                        bytes[0] = worker;
                        bytes[1] = i;
                        let operator = OperatorId::new(bytes);

                        actor
                            .join_pod(operator, 0, Amount::from_tokens(100))
                            .await
                            .unwrap();
                        assert_eq!(
                            actor.balance(&operator).await.map(|entry| entry.bonded),
                            Ok(Amount::from_tokens(100)),
                            "a read after a successful join must see it"
                        );
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let job_id = actor.publish_job(job_request(), ctx()).await.unwrap();
        assert!(actor.job(&job_id).await.is_some());
    }

    #[tokio::test]
    async fn pool_errors_are_forwarded() {
        let actor = spawn();

        assert_eq!(
            actor.leave_pod(operator(1)).await,
            Err(PoolActorError::Pool(PoolError::NotInPod(operator(1))))
        );
    }

    #[tokio::test]
    async fn job_lifecycle_through_the_actor() {
        let actor = spawn();
        for byte in 1..=3 {
            actor
                .join_pod(operator(byte), 0, Amount::from_tokens(100))
                .await
                .unwrap();
        }

        let job_id = actor.publish_job(job_request(), ctx()).await.unwrap();

        let status = actor.job_status(&job_id, 500).await.unwrap();
        let primary = status.eligible_operator.unwrap();

        let outcome = actor
            .finalize(
                job_id,
                primary,
                ExecutionReport {
                    gas_used: 21_000,
                    gas_price: 5,
                    reverted: false,
                },
                510,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, FinalizeOutcome::Settled { .. }));

        let pool = actor.shutdown().await.unwrap();
        assert_eq!(
            pool.balance(&primary).unwrap().bonded,
            Amount::from_tokens(101)
        );
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let actor = spawn();
        let mut events = actor.subscribe();

        actor
            .join_pod(operator(1), 0, Amount::from_tokens(100))
            .await
            .unwrap();
        let job_id = actor.publish_job(job_request(), ctx()).await.unwrap();
        actor
            .finalize(
                job_id,
                operator(1),
                ExecutionReport {
                    gas_used: 21_000,
                    gas_price: 5,
                    reverted: false,
                },
                510,
            )
            .await
            .unwrap();

        let published = events.recv().await.unwrap();
        assert!(
            matches!(published, PoolEvent::JobPublished { primary, .. } if primary == operator(1))
        );
        let finalized = events.recv().await.unwrap();
        assert!(matches!(
            finalized,
            PoolEvent::JobFinalized { operator: by, .. } if by == operator(1)
        ));

        let _pool = actor.shutdown().await.unwrap();
        assert_eq!(events.recv().await, Err(RecvError::Closed));
    }
}
