use emerald_consensus::ConsensusError;
use emerald_db::StoreError;
use emerald_executor::BlockExecutionError;
use emerald_primitives::{BlockNumber, GotExpected, B256, U256};
use emerald_state::StateError;

/// Chain-level failures.
#[derive(thiserror::Error, Debug)]
pub enum ChainError {
    /// A block or header failed validation.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// Transaction execution failed.
    #[error(transparent)]
    Execution(#[from] BlockExecutionError),

    /// World-state failure.
    #[error(transparent)]
    State(#[from] StateError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Chain configuration failure.
    #[error(transparent)]
    Spec(#[from] emerald_chainspec::SpecError),

    /// An input block sequence is not contiguous.
    #[error("non-contiguous chain at position {index}: parent {got}, previous block {expected}")]
    NonContiguousChain {
        /// Offending position in the input.
        index: usize,
        /// Parent hash the block declares.
        got: B256,
        /// Hash of the preceding input block.
        expected: B256,
    },

    /// The stored genesis differs from the configured dump.
    #[error("stored genesis {stored} does not match configured genesis {computed}")]
    GenesisMismatch {
        /// Hash persisted at height zero.
        stored: B256,
        /// Hash computed from the configuration.
        computed: B256,
    },

    /// A header referenced by hash is not stored.
    #[error("missing header {hash}")]
    MissingHeader {
        /// The absent header hash.
        hash: B256,
    },

    /// A body referenced by hash is not stored.
    #[error("missing body for block {hash}")]
    MissingBody {
        /// The absent block hash.
        hash: B256,
    },

    /// A total-difficulty entry is missing.
    #[error("missing total difficulty for block {hash}")]
    MissingTotalDifficulty {
        /// The absent block hash.
        hash: B256,
    },

    /// The canonical mapping has a hole.
    #[error("missing canonical hash at height {number}")]
    MissingCanonicalHash {
        /// The unmapped height.
        number: BlockNumber,
    },

    /// A head pointer is missing from storage.
    #[error("missing head pointer {name}")]
    MissingHeadPointer {
        /// Which pointer.
        name: &'static str,
    },

    /// A stored total difficulty disagrees with the parent-linked sum.
    #[error("total difficulty of {hash} inconsistent: {td}")]
    TotalDifficultyMismatch {
        /// Offending block.
        hash: B256,
        /// Stored versus recomputed value.
        td: GotExpected<U256>,
    },

    /// A stored total difficulty is zero.
    #[error("total difficulty of {hash} is zero")]
    ZeroTotalDifficulty {
        /// Offending block.
        hash: B256,
    },

    /// Block data exists far beyond the recorded head, indicating a
    /// regressed head pointer.
    #[error("block data found at height {found} beyond head {head}")]
    DataBeyondHead {
        /// Height where stray data was found.
        found: BlockNumber,
        /// Recorded head height.
        head: BlockNumber,
    },

    /// The three head pointers violate `header ≥ fast ≥ block`.
    #[error("head pointers out of order: header {header}, fast {fast}, block {block}")]
    HeadsOutOfOrder {
        /// Head header height.
        header: BlockNumber,
        /// Fast head height.
        fast: BlockNumber,
        /// Full head height.
        block: BlockNumber,
    },

    /// A full block's parent lacks state outside the fast-sync boundary.
    #[error("block {hash} has no usable parent state")]
    ParentStateMissing {
        /// Offending block.
        hash: B256,
    },

    /// A fast block sits inside the fully synced region.
    #[error("fast block {hash} precedes materialized state")]
    FastBlockHasState {
        /// Offending block.
        hash: B256,
    },
}

/// An [`ChainError`] annotated with the failing position of a batch insert.
#[derive(thiserror::Error, Debug)]
#[error("block {hash} at input position {index}: {kind}")]
pub struct InsertError {
    /// Position of the failing block in the input sequence.
    pub index: usize,
    /// Hash of the failing block.
    pub hash: B256,
    /// Underlying failure.
    #[source]
    pub kind: ChainError,
}

impl InsertError {
    pub(crate) fn new(index: usize, hash: B256, kind: impl Into<ChainError>) -> Self {
        Self { index, hash, kind: kind.into() }
    }
}
