//! Block and header validation for emerald.
//!
//! Structural and semantic header checks, difficulty recalculation across
//! the four supported algorithms, uncle eligibility, proof-of-work gating,
//! and post-execution validation of receipts, bloom, gas and state root.

mod difficulty;
mod error;
mod pow;
mod validation;

pub use difficulty::calc_difficulty;
pub use error::ConsensusError;
pub use pow::{NoopPow, PowVerifier};
pub use validation::{
    validate_block_post_execution, validate_body, validate_header, BlockValidator, ChainLookup,
};
