use emerald_primitives::{BlockNumber, B256};

/// Errors raised while loading or validating a chain configuration.
#[derive(thiserror::Error, Debug)]
pub enum SpecError {
    /// The configuration document is not valid JSON.
    #[error("invalid chain configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// `chainConfig.forks` is missing or empty.
    #[error("chain configuration declares no forks")]
    NoForks,

    /// A fork feature could not be parsed into a known variant.
    #[error("fork {fork:?} feature {id:?}: {reason}")]
    InvalidFeature {
        /// Name of the declaring fork.
        fork: String,
        /// Feature id as it appears in the document.
        id: String,
        /// What was wrong with the options.
        reason: String,
    },

    /// A genesis dump field failed to parse.
    #[error("invalid genesis dump: {0}")]
    InvalidGenesis(String),
}

/// Failures of the per-header checkpoint checks.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    /// The header sits at a fork height but does not match the fork's
    /// declared required hash.
    #[error("header at fork height {number} has hash {got}, fork requires {expected}")]
    ForkRequiredHash {
        /// Fork activation height.
        number: BlockNumber,
        /// Hash the fork declares.
        expected: B256,
        /// Hash the header actually has.
        got: B256,
    },

    /// The header hash is on the known-bad list.
    #[error("header {hash} at height {number} is a known-bad block")]
    BadHash {
        /// Height of the bad entry.
        number: BlockNumber,
        /// The banned hash.
        hash: B256,
    },
}
