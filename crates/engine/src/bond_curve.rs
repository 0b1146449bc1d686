//! The bonding curve that prices admission into each pod.
//!
//! Every pod has a minimum bond that grows geometrically with the pod's ordinal. The first
//! `pod_threshold(pod)` positions of a pod pay exactly that minimum; later positions pay a
//! surcharge for every full step of positions past the threshold.

use ethnum::U256;
use operator_pool_params::prelude::{BondCurveParams, ParamsError};
use operator_pool_primitives::{Amount, PodIdx, Position};

use crate::errors::{PoolError, PoolResult};

/// A validated bonding curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BondCurve {
    params: BondCurveParams,
}

impl BondCurve {
    /// Creates a new bonding curve after validating its parameters.
    pub fn new(params: BondCurveParams) -> Result<Self, ParamsError> {
        params.validate()?;

        Ok(Self { params })
    }

    /// Returns the parameters of the curve.
    pub const fn params(&self) -> &BondCurveParams {
        &self.params
    }

    /// The number of positions in the pod that are priced at the pod's minimum bond.
    ///
    /// This halves with every pod and bottoms out at zero.
    pub fn pod_threshold(&self, pod: PodIdx) -> u32 {
        self.params
            .operator_threshold
            .checked_shr(pod)
            .unwrap_or(0)
    }

    /// The bond every member of the pod has to put up at least.
    pub fn minimum_bond(&self, pod: PodIdx) -> PoolResult<Amount> {
        U256::from(self.params.pod_multiplier)
            .checked_pow(pod)
            .and_then(|factor| self.params.base_bond_amount.checked_mul_int(factor))
            .ok_or(PoolError::BondOverflow(pod))
    }

    /// The bond required for the given position in the pod.
    pub fn current_bond(&self, pod: PodIdx, position: Position) -> PoolResult<Amount> {
        let minimum = self.minimum_bond(pod)?;
        let threshold = self.pod_threshold(pod);

        if position <= threshold {
            return Ok(minimum);
        }

        let steps = (position - threshold)
            .checked_div(self.params.operator_threshold_step)
            .unwrap_or(0);

        minimum
            .checked_mul_fixed(self.params.operator_threshold_multiplier)
            .and_then(|surcharge| surcharge.checked_mul_int(U256::from(steps)))
            .and_then(|surcharge| minimum.checked_add(surcharge))
            .ok_or(PoolError::BondOverflow(pod))
    }
}
