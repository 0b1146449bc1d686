//! The fee sink of the node.

use operator_pool_engine::sink::{FeeSink, SinkReason};
use operator_pool_primitives::Amount;
use tracing::{info, warn};

use crate::config::SinkDestination;

/// Logs every routing to the configured destination and keeps a running total.
///
/// Moving the funds themselves happens outside of the pool.
#[derive(Debug, Clone)]
pub(crate) struct LoggingSink {
    destination: SinkDestination,
    total: Amount,
}

impl LoggingSink {
    pub(crate) const fn new(destination: SinkDestination) -> Self {
        Self {
            destination,
            total: Amount::ZERO,
        }
    }

    pub(crate) const fn total(&self) -> Amount {
        self.total
    }
}

impl FeeSink for LoggingSink {
    fn route_to_burn_or_treasury(&mut self, amount: Amount, reason: SinkReason) {
        match self.total.checked_add(amount) {
            Some(total) => self.total = total,
            None => warn!(%amount, "sink total overflowed, keeping previous total"),
        }

        info!(%amount, %reason, destination = %self.destination, total = %self.total, "routed funds out of the pool");
    }
}
