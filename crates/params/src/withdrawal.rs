//! Parameters for operators leaving their pod.

use operator_pool_primitives::FixedPoint;
use serde::{Deserialize, Serialize};

use crate::{default::WITHDRAWAL_FEE, errors::ParamsError};

/// The parameters applied when an operator unbonds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalParams {
    /// The fee, as a fraction of the withdrawn bond, routed to the burn/treasury sink.
    pub fee: FixedPoint,
}

impl WithdrawalParams {
    /// Checks that the fee lies in `[0, 1]`.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.fee > FixedPoint::ONE {
            return Err(ParamsError::FractionOutOfRange {
                name: "fee",
                value: self.fee.to_string(),
            });
        }

        Ok(())
    }
}

impl Default for WithdrawalParams {
    fn default() -> Self {
        Self {
            fee: WITHDRAWAL_FEE,
        }
    }
}
