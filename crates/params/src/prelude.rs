//! Just import this if you want a no-brainer `use` statement to get all the params.

pub use crate::{
    bond_curve::BondCurveParams,
    errors::ParamsError,
    job::{AbandonmentPolicy, JobParams, NUM_BACKUP_OPERATORS},
    pool::PoolParams,
    slashing::SlashingParams,
    withdrawal::WithdrawalParams,
};
