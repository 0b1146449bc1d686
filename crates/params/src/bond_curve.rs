//! Parameters for the bonding curve that prices admission into each pod.

use operator_pool_primitives::{Amount, FixedPoint};
use serde::{Deserialize, Serialize};

use crate::{
    default::{
        BASE_BOND_AMOUNT, OPERATOR_THRESHOLD, OPERATOR_THRESHOLD_MULTIPLIER,
        OPERATOR_THRESHOLD_STEP, POD_MULTIPLIER,
    },
    errors::ParamsError,
};

/// The constants from which every pod's threshold, minimum bond and current bond are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondCurveParams {
    /// The minimum bond of pod 0.
    pub base_bond_amount: Amount,

    /// The factor by which the minimum bond grows from one pod to the next.
    pub pod_multiplier: u32,

    /// The number of positions in pod 0 priced at the minimum bond; halved for every pod.
    pub operator_threshold: u32,

    /// The number of positions past the threshold that share the same surcharge.
    pub operator_threshold_step: u32,

    /// The surcharge per step, as a fraction of the pod's minimum bond.
    pub operator_threshold_multiplier: FixedPoint,
}

impl BondCurveParams {
    /// Checks that the curve is well-formed.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.pod_multiplier < 2 {
            return Err(ParamsError::PodMultiplierTooSmall(self.pod_multiplier));
        }

        if self.operator_threshold_step == 0 {
            return Err(ParamsError::ZeroThresholdStep);
        }

        if self.base_bond_amount.is_zero() {
            return Err(ParamsError::ZeroBaseBond);
        }

        Ok(())
    }
}

impl Default for BondCurveParams {
    fn default() -> Self {
        Self {
            base_bond_amount: BASE_BOND_AMOUNT,
            pod_multiplier: POD_MULTIPLIER,
            operator_threshold: OPERATOR_THRESHOLD,
            operator_threshold_step: OPERATOR_THRESHOLD_STEP,
            operator_threshold_multiplier: OPERATOR_THRESHOLD_MULTIPLIER,
        }
    }
}
