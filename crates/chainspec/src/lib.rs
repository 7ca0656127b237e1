//! Chain configuration for emerald.
//!
//! A chain is described by an ordered set of forks, each activating feature
//! variants (difficulty algorithm, gas schedule, replay protection, reward
//! schedule) at a block height, plus required-hash checkpoints and a list of
//! known-bad header hashes. The JSON configuration format is parsed once
//! into typed variants at load.

mod error;
mod fork;
mod gas_table;
mod genesis;
mod spec;

pub use error::{CheckpointError, SpecError};
pub use fork::{
    BadHash, DifficultyFeature, Eip155Feature, FeatureKind, Fork, ForkFeature, GasTableFeature,
    RewardFeature,
};
pub use gas_table::GasTable;
pub use genesis::{GenesisAccount, GenesisDump};
pub use spec::{ChainSpec, ChainSpecBuilder, ConsensusEngine, DifficultyAlgorithm, RewardSchedule};
