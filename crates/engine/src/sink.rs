//! The destination of withdrawal fees and slashed stake that is not paid to another operator.
//!
//! Whether those funds are burned or sent to a treasury is decided outside of the pool.

use std::fmt;

use operator_pool_primitives::Amount;
use serde::{Deserialize, Serialize};

/// Why funds are routed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkReason {
    /// The fee charged when an operator leaves its pod.
    WithdrawalFee,

    /// The part of a slashed bond that is not paid to the backup that stepped in.
    SlashedBond,

    /// The slashed bond of a primary whose job was abandoned.
    AbandonedJob,
}

impl fmt::Display for SinkReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SinkReason::WithdrawalFee => "withdrawal fee",
            SinkReason::SlashedBond => "slashed bond",
            SinkReason::AbandonedJob => "abandoned job",
        };

        f.write_str(reason)
    }
}

/// Receives funds that leave the pool without going to an operator.
pub trait FeeSink {
    /// Routes `amount` to the burn address or the treasury.
    fn route_to_burn_or_treasury(&mut self, amount: Amount, reason: SinkReason);
}

impl<F> FeeSink for F
where
    F: FnMut(Amount, SinkReason),
{
    fn route_to_burn_or_treasury(&mut self, amount: Amount, reason: SinkReason) {
        self(amount, reason)
    }
}

/// A sink that keeps a record of everything routed to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingSink {
    routed: Vec<(Amount, SinkReason)>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub const fn new() -> Self {
        Self { routed: Vec::new() }
    }

    /// Returns everything routed so far, in order.
    pub fn routed(&self) -> &[(Amount, SinkReason)] {
        &self.routed
    }

    /// Returns the sum of everything routed for the given reason.
    pub fn total_for(&self, reason: SinkReason) -> Amount {
        self.routed
            .iter()
            .filter(|(_, r)| *r == reason)
            .fold(Amount::ZERO, |acc, (amount, _)| {
                acc.checked_add(*amount).unwrap_or(acc)
            })
    }

    /// Returns the sum of everything routed so far.
    pub fn total(&self) -> Amount {
        self.routed.iter().fold(Amount::ZERO, |acc, (amount, _)| {
            acc.checked_add(*amount).unwrap_or(acc)
        })
    }
}

impl FeeSink for RecordingSink {
    fn route_to_burn_or_treasury(&mut self, amount: Amount, reason: SinkReason) {
        self.routed.push((amount, reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_sinks() {
        let mut burned = Amount::ZERO;
        {
            let mut sink = |amount: Amount, _reason: SinkReason| {
                burned = burned.checked_add(amount).unwrap();
            };
            sink.route_to_burn_or_treasury(Amount::from_tokens(2), SinkReason::SlashedBond);
            sink.route_to_burn_or_treasury(Amount::from_tokens(3), SinkReason::WithdrawalFee);
        }

        assert_eq!(burned, Amount::from_tokens(5));
    }

    #[test]
    fn recording_sink_totals_by_reason() {
        let mut sink = RecordingSink::new();
        sink.route_to_burn_or_treasury(Amount::from_tokens(2), SinkReason::SlashedBond);
        sink.route_to_burn_or_treasury(Amount::from_tokens(3), SinkReason::WithdrawalFee);
        sink.route_to_burn_or_treasury(Amount::from_tokens(4), SinkReason::SlashedBond);

        assert_eq!(sink.total(), Amount::from_tokens(9));
        assert_eq!(
            sink.total_for(SinkReason::SlashedBond),
            Amount::from_tokens(6)
        );
        assert_eq!(sink.routed().len(), 3);
    }
}
