//! Bookkeeping of every operator's bonded, escrowed and withdrawable balances.
//!
//! The ledger is the only place where balances change. The registry, the scheduler and the
//! slashing engine all go through it.

use std::collections::BTreeMap;

use operator_pool_primitives::{Amount, FixedPoint, JobId, OperatorId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{PoolError, PoolResult};

/// The balances of a single operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondLedgerEntry {
    /// Stake that backs the operator's pod membership and is free to be escrowed.
    pub bonded: Amount,

    /// Stake locked for the job in [`Self::locked_for`].
    pub escrowed: Amount,

    /// Stake that no longer backs any membership and can be paid out.
    pub withdrawable: Amount,

    /// The job holding the escrow lock, if any.
    ///
    /// This is `Some` if and only if [`Self::escrowed`] is non-zero.
    pub locked_for: Option<JobId>,
}

impl BondLedgerEntry {
    /// Whether part of the bond is currently locked for a job.
    pub fn has_job_in_flight(&self) -> bool {
        self.locked_for.is_some()
    }
}

/// The ledger of all operators that ever bonded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscrowLedger {
    entries: BTreeMap<OperatorId, BondLedgerEntry>,
}

impl EscrowLedger {
    /// Creates an empty ledger.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the entry of the operator, if it ever bonded.
    pub fn entry(&self, operator: &OperatorId) -> Option<&BondLedgerEntry> {
        self.entries.get(operator)
    }

    /// Returns an iterator over all entries.
    pub fn entries(&self) -> impl Iterator<Item = (&OperatorId, &BondLedgerEntry)> {
        self.entries.iter()
    }

    fn entry_mut(&mut self, operator: &OperatorId) -> PoolResult<&mut BondLedgerEntry> {
        self.entries
            .get_mut(operator)
            .ok_or(PoolError::UnknownOperator(*operator))
    }

    /// Adds `amount` to the operator's bonded balance, creating its entry if needed.
    pub fn bond(&mut self, operator: OperatorId, amount: Amount) -> PoolResult<()> {
        let entry = self.entries.entry(operator).or_default();
        entry.bonded = entry
            .bonded
            .checked_add(amount)
            .ok_or(PoolError::BalanceOverflow(operator))?;

        debug!(%operator, %amount, bonded = %entry.bonded, "bonded");

        Ok(())
    }

    /// Moves `amount` from bonded to escrowed for the given job.
    pub fn lock(&mut self, operator: &OperatorId, job: JobId, amount: Amount) -> PoolResult<()> {
        let entry = self.entry_mut(operator)?;

        if entry.has_job_in_flight() {
            return Err(PoolError::JobInFlight {
                operator: *operator,
                job: entry.locked_for,
            });
        }

        entry.bonded = entry
            .bonded
            .checked_sub(amount)
            .ok_or(PoolError::InsufficientBond {
                required: amount,
                offered: entry.bonded,
            })?;
        entry.escrowed = amount;
        entry.locked_for = Some(job);

        debug!(%operator, %job, %amount, "escrow locked");

        Ok(())
    }

    /// Returns the whole escrow to the bonded balance and clears the lock.
    pub fn release(&mut self, operator: &OperatorId) -> PoolResult<Amount> {
        let entry = self.entry_mut(operator)?;

        let escrowed = entry.escrowed;
        let bonded = entry
            .bonded
            .checked_add(escrowed)
            .ok_or(PoolError::BalanceOverflow(*operator))?;

        entry.bonded = bonded;
        entry.escrowed = Amount::ZERO;
        entry.locked_for = None;

        debug!(%operator, %escrowed, "escrow released");

        Ok(escrowed)
    }

    /// The part of the operator's escrow that slashing by `fraction` would take.
    pub fn slash_amount(&self, operator: &OperatorId, fraction: FixedPoint) -> PoolResult<Amount> {
        let escrowed = self
            .entry(operator)
            .ok_or(PoolError::UnknownOperator(*operator))?
            .escrowed;

        Ok(escrowed
            .checked_mul_fixed(fraction)
            .ok_or(PoolError::BalanceOverflow(*operator))?
            .min(escrowed))
    }

    /// Slashes `fraction` of the escrow, returns the rest of it to the bonded balance and clears
    /// the lock.
    ///
    /// Returns the slashed amount, which is no longer accounted for by the ledger. The entry is
    /// left untouched on error.
    pub fn slash(&mut self, operator: &OperatorId, fraction: FixedPoint) -> PoolResult<Amount> {
        let slashed = self.slash_amount(operator, fraction)?;
        let entry = self.entry_mut(operator)?;

        let escrowed = entry.escrowed;
        let bonded = entry
            .bonded
            .checked_add(escrowed.saturating_sub(slashed))
            .ok_or(PoolError::BalanceOverflow(*operator))?;

        entry.bonded = bonded;
        entry.escrowed = Amount::ZERO;
        entry.locked_for = None;

        debug!(%operator, %escrowed, %slashed, "escrow slashed");

        Ok(slashed)
    }

    /// Credits `amount` to the operator's bonded balance.
    pub fn reward(&mut self, operator: &OperatorId, amount: Amount) -> PoolResult<()> {
        let entry = self.entry_mut(operator)?;
        entry.bonded = entry
            .bonded
            .checked_add(amount)
            .ok_or(PoolError::BalanceOverflow(*operator))?;

        debug!(%operator, %amount, "rewarded");

        Ok(())
    }

    /// Moves the operator's entire bonded balance to its withdrawable balance, keeping back
    /// `fee_rate` of it.
    ///
    /// Returns the unbonded amount and the fee kept back, which is no longer accounted for by
    /// the ledger. Fails without touching the entry if part of the bond is escrowed for a job.
    pub fn unbond_with_fee(
        &mut self,
        operator: &OperatorId,
        fee_rate: FixedPoint,
    ) -> PoolResult<(Amount, Amount)> {
        let entry = self.entry_mut(operator)?;

        if entry.has_job_in_flight() {
            return Err(PoolError::JobInFlight {
                operator: *operator,
                job: entry.locked_for,
            });
        }

        let unbonded = entry.bonded;
        let fee = unbonded
            .checked_mul_fixed(fee_rate)
            .ok_or(PoolError::BalanceOverflow(*operator))?
            .min(unbonded);
        let withdrawable = entry
            .withdrawable
            .checked_add(unbonded.saturating_sub(fee))
            .ok_or(PoolError::BalanceOverflow(*operator))?;

        entry.bonded = Amount::ZERO;
        entry.withdrawable = withdrawable;

        debug!(%operator, %unbonded, %fee, %withdrawable, "unbonded");

        Ok((unbonded, fee))
    }

    /// Moves the operator's entire bonded balance to its withdrawable balance.
    pub fn release_to_withdrawable(&mut self, operator: &OperatorId) -> PoolResult<Amount> {
        let (unbonded, _) = self.unbond_with_fee(operator, FixedPoint::ZERO)?;

        Ok(unbonded)
    }

    /// Pays out the operator's withdrawable balance and returns it.
    pub fn withdraw(&mut self, operator: &OperatorId) -> PoolResult<Amount> {
        let entry = self.entry_mut(operator)?;
        let amount = std::mem::take(&mut entry.withdrawable);

        debug!(%operator, %amount, "withdrawn");

        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use ethnum::U256;

    use super::*;

    fn operator(byte: u8) -> OperatorId {
        OperatorId::new([byte; 20])
    }

    fn job() -> JobId {
        JobId::from_payload(b"job")
    }

    #[test]
    fn lock_and_release_round_trip() {
        let mut ledger = EscrowLedger::new();
        let op = operator(1);

        ledger.bond(op, Amount::from_tokens(120)).unwrap();
        ledger.lock(&op, job(), Amount::from_tokens(100)).unwrap();

        let entry = ledger.entry(&op).unwrap();
        assert_eq!(entry.bonded, Amount::from_tokens(20));
        assert_eq!(entry.escrowed, Amount::from_tokens(100));
        assert_eq!(entry.locked_for, Some(job()));

        assert_eq!(ledger.release(&op).unwrap(), Amount::from_tokens(100));
        let entry = ledger.entry(&op).unwrap();
        assert_eq!(entry.bonded, Amount::from_tokens(120));
        assert_eq!(entry.escrowed, Amount::ZERO);
        assert!(!entry.has_job_in_flight());
    }

    #[test]
    fn escrowed_operator_cannot_unbond() {
        let mut ledger = EscrowLedger::new();
        let op = operator(2);

        ledger.bond(op, Amount::from_tokens(100)).unwrap();
        ledger.lock(&op, job(), Amount::from_tokens(100)).unwrap();

        assert_eq!(
            ledger.unbond_with_fee(&op, FixedPoint::ZERO),
            Err(PoolError::JobInFlight {
                operator: op,
                job: Some(job())
            })
        );
    }

    #[test]
    fn cannot_lock_more_than_bonded() {
        let mut ledger = EscrowLedger::new();
        let op = operator(3);

        ledger.bond(op, Amount::from_tokens(50)).unwrap();
        assert_eq!(
            ledger.lock(&op, job(), Amount::from_tokens(100)),
            Err(PoolError::InsufficientBond {
                required: Amount::from_tokens(100),
                offered: Amount::from_tokens(50),
            })
        );
        assert_eq!(ledger.entry(&op).unwrap().bonded, Amount::from_tokens(50));
    }

    #[test]
    fn slash_keeps_the_unslashed_remainder() {
        let mut ledger = EscrowLedger::new();
        let op = operator(4);
        let half = FixedPoint::from_ratio(1, 2).unwrap();

        ledger.bond(op, Amount::from_tokens(100)).unwrap();
        ledger.lock(&op, job(), Amount::from_tokens(100)).unwrap();

        assert_eq!(ledger.slash(&op, half).unwrap(), Amount::from_tokens(50));

        let entry = ledger.entry(&op).unwrap();
        assert_eq!(entry.bonded, Amount::from_tokens(50));
        assert_eq!(entry.escrowed, Amount::ZERO);
        assert_eq!(entry.locked_for, None);
    }

    #[test]
    fn overflowing_slash_leaves_the_entry_untouched() {
        let mut ledger = EscrowLedger::new();
        let op = operator(7);
        let huge = Amount::from_base_units(U256::MAX / 2);

        ledger.bond(op, huge).unwrap();
        ledger.lock(&op, job(), huge).unwrap();
        ledger.reward(&op, huge).unwrap();
        ledger.reward(&op, huge).unwrap();
        let before = ledger.entry(&op).unwrap().clone();

        assert_eq!(
            ledger.slash(&op, FixedPoint::ZERO),
            Err(PoolError::BalanceOverflow(op))
        );
        assert_eq!(ledger.release(&op), Err(PoolError::BalanceOverflow(op)));
        assert_eq!(ledger.entry(&op), Some(&before));
    }

    #[test]
    fn overflowing_fee_leaves_the_entry_untouched() {
        let mut ledger = EscrowLedger::new();
        let op = operator(8);

        ledger
            .bond(op, Amount::from_base_units(U256::MAX / 2))
            .unwrap();
        let before = ledger.entry(&op).unwrap().clone();

        assert_eq!(
            ledger.unbond_with_fee(&op, FixedPoint::from_ratio(1, 1_000).unwrap()),
            Err(PoolError::BalanceOverflow(op))
        );
        assert_eq!(ledger.entry(&op), Some(&before));
    }

    #[test]
    fn unbond_keeps_back_the_fee() {
        let mut ledger = EscrowLedger::new();
        let op = operator(9);

        ledger.bond(op, Amount::from_tokens(1_000)).unwrap();
        assert_eq!(
            ledger.unbond_with_fee(&op, FixedPoint::from_ratio(1, 1_000).unwrap()),
            Ok((Amount::from_tokens(1_000), Amount::from_tokens(1)))
        );

        let entry = ledger.entry(&op).unwrap();
        assert_eq!(entry.bonded, Amount::ZERO);
        assert_eq!(entry.withdrawable, Amount::from_tokens(999));
    }

    #[test]
    fn withdraw_drains_withdrawable() {
        let mut ledger = EscrowLedger::new();
        let op = operator(5);

        ledger.bond(op, Amount::from_tokens(10)).unwrap();
        assert_eq!(
            ledger.release_to_withdrawable(&op).unwrap(),
            Amount::from_tokens(10)
        );
        assert_eq!(ledger.withdraw(&op).unwrap(), Amount::from_tokens(10));
        assert_eq!(ledger.withdraw(&op).unwrap(), Amount::ZERO);

        assert_eq!(
            ledger.withdraw(&operator(6)),
            Err(PoolError::UnknownOperator(operator(6)))
        );
    }
}
