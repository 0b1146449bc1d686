//! The complete set of parameters of an operator pool.

use serde::{Deserialize, Serialize};

use crate::{
    bond_curve::BondCurveParams, errors::ParamsError, job::JobParams, slashing::SlashingParams,
    withdrawal::WithdrawalParams,
};

/// The consensus-critical parameters of an operator pool.
///
/// Differences in these values among the participants of a network lead to different bond
/// prices and settlements, and thereby, to diverging views of the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolParams {
    /// The bonding curve that prices admission into each pod.
    pub bond_curve: BondCurveParams,

    /// The rewards and penalties applied when jobs settle.
    pub slashing: SlashingParams,

    /// The parameters applied when an operator leaves its pod.
    pub withdrawal: WithdrawalParams,

    /// The parameters that govern published jobs.
    pub jobs: JobParams,
}

impl PoolParams {
    /// Checks every group of parameters.
    pub fn validate(&self) -> Result<(), ParamsError> {
        self.bond_curve.validate()?;
        self.slashing.validate()?;
        self.withdrawal.validate()?;
        self.jobs.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::AbandonmentPolicy;

    #[test]
    fn test_pool_params_serde_toml() {
        let params = r#"
            [bond_curve]
            base_bond_amount = "100"
            pod_multiplier = 2
            operator_threshold = 1000
            operator_threshold_step = 10
            operator_threshold_multiplier = "0.01"

            [slashing]
            job_reward = "1"
            slash_fraction = "0.5"
            backup_share = "0.5"

            [withdrawal]
            fee = "0.001"

            [jobs]
            abandonment = "republish"
            archive_capacity = 500
        "#;

        let params = toml::from_str::<PoolParams>(params);
        assert!(
            params.is_ok(),
            "must be able to deserialize params from toml but got: {}",
            params.unwrap_err()
        );

        let params = params.unwrap();
        assert_eq!(params.jobs.abandonment, AbandonmentPolicy::Republish);
        assert_eq!(params.jobs.archive_capacity, 500);
        assert!(params.validate().is_ok());

        let serialized = toml::to_string(&params).unwrap();
        let deserialized = toml::from_str::<PoolParams>(&serialized).unwrap();
        assert_eq!(
            deserialized, params,
            "must be able to serialize and deserialize params to toml"
        );
    }
}
