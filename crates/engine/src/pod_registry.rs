//! Pod membership and ordering.
//!
//! Operators join a pod by bonding at least the current bond of the pod's next position. Every
//! member gets two positions at join time: a unique position that counts the admissions to the
//! pod and is never reused, and the bond position it was priced at, which is the pod's size after
//! it joined. Leaving never shifts either position of other members, and new members are priced
//! against the pod's current size.

use std::collections::{BTreeMap, BTreeSet};

use operator_pool_primitives::{Amount, FixedPoint, OperatorId, PodIdx, Position};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    bond_curve::BondCurve,
    errors::{PoolError, PoolResult},
    escrow::EscrowLedger,
    sink::{FeeSink, SinkReason},
};

/// The pod and position an operator was assigned when it joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// The pod the operator belongs to.
    pub pod: PodIdx,

    /// The operator's 1-based position in the pod, unique among everyone that ever joined it.
    pub position: Position,

    /// The position the operator's bond was priced at.
    pub bond_position: Position,
}

/// A member of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// The member's identity.
    pub operator: OperatorId,

    /// The position the member was assigned when it joined.
    pub position: Position,

    /// The position the member's bond was priced at.
    pub bond_position: Position,
}

/// A tier of operators sharing the same minimum bond.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pod {
    idx: PodIdx,

    /// Members in join order.
    members: Vec<Member>,

    /// Members that are currently the primary of an unsettled job.
    busy: BTreeSet<OperatorId>,

    /// The number of operators ever admitted.
    admitted: Position,
}

impl Pod {
    const fn new(idx: PodIdx) -> Self {
        Self {
            idx,
            members: Vec::new(),
            busy: BTreeSet::new(),
            admitted: 0,
        }
    }

    /// The ordinal of the pod.
    pub const fn idx(&self) -> PodIdx {
        self.idx
    }

    /// The members of the pod in join order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// The number of members.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// The members that are not the primary of an unsettled job, in join order.
    pub fn available(&self) -> impl Iterator<Item = &Member> {
        self.members
            .iter()
            .filter(|member| !self.busy.contains(&member.operator))
    }

    /// Whether the operator is currently the primary of an unsettled job.
    pub fn is_busy(&self, operator: &OperatorId) -> bool {
        self.busy.contains(operator)
    }

    /// The bond position of the next member: one past the current size.
    fn next_bond_position(&self) -> Position {
        Position::try_from(self.members.len())
            .unwrap_or(Position::MAX)
            .saturating_add(1)
    }
}

/// Receipt of a successful [`PodRegistry::join_pod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinReceipt {
    /// The operator that joined.
    pub operator: OperatorId,

    /// The pod it joined.
    pub pod: PodIdx,

    /// The position it was assigned.
    pub position: Position,

    /// The position its bond was priced at.
    pub bond_position: Position,

    /// The bond that was required for that position.
    pub required: Amount,

    /// The bond that was actually put up.
    pub bonded: Amount,
}

/// Receipt of a successful [`PodRegistry::leave_pod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveReceipt {
    /// The operator that left.
    pub operator: OperatorId,

    /// The pod it left.
    pub pod: PodIdx,

    /// The bond that was unbonded.
    pub withdrawn: Amount,

    /// The withdrawal fee routed to the sink.
    pub fee: Amount,

    /// The operator's withdrawable balance after the fee was deducted.
    pub withdrawable: Amount,
}

/// The set of pods and their members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRegistry {
    curve: BondCurve,

    /// Pods by ordinal; pods are created on demand and never removed.
    pods: Vec<Pod>,

    memberships: BTreeMap<OperatorId, Membership>,
}

impl PodRegistry {
    /// Creates a registry without any pods.
    pub const fn new(curve: BondCurve) -> Self {
        Self {
            curve,
            pods: Vec::new(),
            memberships: BTreeMap::new(),
        }
    }

    /// The bonding curve used to price admission.
    pub const fn curve(&self) -> &BondCurve {
        &self.curve
    }

    /// The number of pods that have been created so far.
    pub fn pod_count(&self) -> usize {
        self.pods.len()
    }

    /// Returns the pod with the given ordinal, if it exists.
    pub fn pod(&self, pod: PodIdx) -> Option<&Pod> {
        self.pods.get(pod as usize)
    }

    /// Returns all pods in ordinal order.
    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    /// Returns the membership of the operator, if it belongs to a pod.
    pub fn membership(&self, operator: &OperatorId) -> Option<Membership> {
        self.memberships.get(operator).copied()
    }

    /// The number of members of the pod; zero for pods that do not exist yet.
    pub fn pod_size(&self, pod: PodIdx) -> usize {
        self.pod(pod).map_or(0, Pod::size)
    }

    /// The members of the pod in join order.
    pub fn members(&self, pod: PodIdx) -> &[Member] {
        match self.pod(pod) {
            Some(pod) => pod.members(),
            None => &[],
        }
    }

    /// The members of the pod that are free to be selected as primary, in join order.
    pub fn available_members(&self, pod: PodIdx) -> Vec<Member> {
        self.pod(pod)
            .map(|pod| pod.available().copied().collect())
            .unwrap_or_default()
    }

    /// The ordinals of all pods with at least one available member.
    pub fn active_pods(&self) -> Vec<PodIdx> {
        self.pods
            .iter()
            .filter(|pod| pod.available().next().is_some())
            .map(Pod::idx)
            .collect()
    }

    /// The bond required for the given position in the given pod.
    pub fn preview_bond(&self, pod: PodIdx, position: Position) -> PoolResult<Amount> {
        self.curve.current_bond(pod, position)
    }

    /// The bond required to join the pod right now.
    pub fn required_bond(&self, pod: PodIdx) -> PoolResult<Amount> {
        let next = self.pod(pod).map_or(1, Pod::next_bond_position);

        self.curve.current_bond(pod, next)
    }

    /// Admits the operator into the pod and bonds the full offered amount.
    pub fn join_pod(
        &mut self,
        operator: OperatorId,
        pod: PodIdx,
        offered: Amount,
        ledger: &mut EscrowLedger,
    ) -> PoolResult<JoinReceipt> {
        if let Some(membership) = self.membership(&operator) {
            return Err(PoolError::AlreadyInPod {
                operator,
                pod: membership.pod,
            });
        }

        let required = self.required_bond(pod)?;
        if offered < required {
            return Err(PoolError::InsufficientBond { required, offered });
        }

        ledger.bond(operator, offered)?;

        while self.pods.len() <= pod as usize {
            let idx = self.pods.len() as PodIdx;
            self.pods.push(Pod::new(idx));
        }

        let entry = &mut self.pods[pod as usize];
        let bond_position = entry.next_bond_position();
        entry.admitted = entry.admitted.saturating_add(1);
        let position = entry.admitted;

        entry.members.push(Member {
            operator,
            position,
            bond_position,
        });
        self.memberships.insert(
            operator,
            Membership {
                pod,
                position,
                bond_position,
            },
        );

        info!(%operator, %pod, %position, %bond_position, %required, %offered, "operator joined pod");

        Ok(JoinReceipt {
            operator,
            pod,
            position,
            bond_position,
            required,
            bonded: offered,
        })
    }

    /// Removes the operator from its pod and makes its bond withdrawable, minus the
    /// withdrawal fee which is routed to the sink.
    pub fn leave_pod(
        &mut self,
        operator: OperatorId,
        fee_rate: FixedPoint,
        ledger: &mut EscrowLedger,
        sink: &mut impl FeeSink,
    ) -> PoolResult<LeaveReceipt> {
        let membership = self
            .membership(&operator)
            .ok_or(PoolError::NotInPod(operator))?;

        let (withdrawn, fee) = ledger.unbond_with_fee(&operator, fee_rate)?;

        if !fee.is_zero() {
            sink.route_to_burn_or_treasury(fee, SinkReason::WithdrawalFee);
        }

        self.remove_member(&operator, membership);

        let withdrawable = ledger
            .entry(&operator)
            .map(|entry| entry.withdrawable)
            .unwrap_or_default();

        info!(%operator, pod = %membership.pod, %withdrawn, %fee, "operator left pod");

        Ok(LeaveReceipt {
            operator,
            pod: membership.pod,
            withdrawn,
            fee,
            withdrawable,
        })
    }

    /// Removes the operator from its pod without a fee and makes its bond withdrawable.
    ///
    /// Returns the operator's withdrawable balance afterwards.
    pub fn evict(&mut self, operator: OperatorId, ledger: &mut EscrowLedger) -> PoolResult<Amount> {
        let membership = self
            .membership(&operator)
            .ok_or(PoolError::NotInPod(operator))?;

        ledger.release_to_withdrawable(&operator)?;
        self.remove_member(&operator, membership);

        let withdrawable = ledger
            .entry(&operator)
            .map(|entry| entry.withdrawable)
            .unwrap_or_default();

        info!(%operator, pod = %membership.pod, %withdrawable, "operator evicted from pod");

        Ok(withdrawable)
    }

    /// Marks the operator as the primary of an unsettled job.
    pub fn mark_busy(&mut self, operator: OperatorId) -> PoolResult<()> {
        let pod = self.pod_of_mut(&operator)?;
        pod.busy.insert(operator);

        Ok(())
    }

    /// Returns the operator to its pod's set of available members.
    pub fn mark_available(&mut self, operator: &OperatorId) -> PoolResult<()> {
        let pod = self.pod_of_mut(operator)?;
        pod.busy.remove(operator);

        Ok(())
    }

    fn pod_of_mut(&mut self, operator: &OperatorId) -> PoolResult<&mut Pod> {
        let membership = self
            .membership(operator)
            .ok_or(PoolError::NotInPod(*operator))?;

        self.pods
            .get_mut(membership.pod as usize)
            .ok_or(PoolError::NotInPod(*operator))
    }

    fn remove_member(&mut self, operator: &OperatorId, membership: Membership) {
        if let Some(pod) = self.pods.get_mut(membership.pod as usize) {
            pod.members.retain(|member| member.operator != *operator);
            pod.busy.remove(operator);
        }

        self.memberships.remove(operator);
    }
}
