//! Re-exports of every test utility.

pub use crate::{
    arbitrary_generator::{arb_amount, arb_operator_id, ArbitraryGenerator},
    fixtures::{chain_context, generate_operator_id, generate_operator_ids, job_payload},
};
