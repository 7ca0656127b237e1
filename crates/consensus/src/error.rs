use emerald_chainspec::CheckpointError;
use emerald_primitives::{BlockNumber, Bloom, GotExpected, B256, U256};

/// Reasons a block or header fails validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// The parent block is not known at all.
    #[error("unknown ancestor {hash}")]
    UnknownAncestor {
        /// Hash of the missing parent.
        hash: B256,
    },

    /// The parent block is known but its state is unavailable.
    #[error("pruned ancestor {hash}")]
    PrunedAncestor {
        /// Hash of the stateless parent.
        hash: B256,
    },

    /// The block was already imported. Ignorable.
    #[error("block {hash} already known")]
    KnownBlock {
        /// Hash of the known block.
        hash: B256,
    },

    /// Required-hash checkpoint or known-bad list violation.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The header's timestamp lies in the future.
    #[error("block timestamp {timestamp} is ahead of wall clock {now}")]
    BlockFuture {
        /// Header timestamp.
        timestamp: U256,
        /// Wall clock at validation time.
        now: u64,
    },

    /// The header's timestamp does not strictly exceed its parent's.
    #[error("block timestamp {timestamp} is not after parent timestamp {parent}")]
    BlockEqualTimestamp {
        /// Header timestamp.
        timestamp: U256,
        /// Parent timestamp.
        parent: U256,
    },

    /// An uncle header's timestamp exceeds the maximum representable value.
    #[error("block timestamp is too large")]
    BlockTimestampTooBig,

    /// The header's number is not parent number + 1.
    #[error("block number {0}")]
    BlockNumberMismatch(GotExpected<BlockNumber>),

    /// Proof-of-work nonce verification failed.
    #[error("invalid proof-of-work nonce on block {hash}")]
    InvalidPowNonce {
        /// Hash of the offending header.
        hash: B256,
    },

    /// The declared difficulty does not match the recalculation.
    #[error("difficulty mismatch: {0}")]
    DifficultyMismatch(GotExpected<U256>),

    /// Gas limit drifted too far from the parent or fell below the floor.
    #[error("gas limit {gas_limit} out of bounds for parent gas limit {parent_gas_limit}")]
    GasLimitDrift {
        /// Parent header gas limit.
        parent_gas_limit: u64,
        /// Offending gas limit.
        gas_limit: u64,
    },

    /// Declared gas used does not match execution.
    #[error("gas used mismatch: {0}")]
    GasUsedMismatch(GotExpected<u64>),

    /// Computed ommers hash differs from the header.
    #[error("ommers root mismatch: {0}")]
    OmmersRootMismatch(GotExpected<B256>),

    /// Computed transaction root differs from the header.
    #[error("transaction root mismatch: {0}")]
    TransactionRootMismatch(GotExpected<B256>),

    /// Computed receipts root differs from the header.
    #[error("receipts root mismatch: {0}")]
    ReceiptsRootMismatch(GotExpected<B256>),

    /// Computed post-state root differs from the header.
    #[error("state root mismatch: {0}")]
    StateRootMismatch(GotExpected<B256>),

    /// Computed log bloom differs from the header.
    #[error("bloom mismatch: {0}")]
    BloomMismatch(Box<GotExpected<Bloom>>),

    /// An uncle appears twice within the recent window.
    #[error("uncle {hash} is not unique")]
    UncleNotUnique {
        /// Hash of the repeated uncle.
        hash: B256,
    },

    /// An uncle is itself an ancestor of the including block.
    #[error("uncle {hash} is an ancestor")]
    UncleIsAncestor {
        /// Hash of the offending uncle.
        hash: B256,
    },

    /// An uncle's parent is not within the ancestor window.
    #[error("uncle {hash} has a parent outside the ancestor window")]
    UncleParentNotAncestor {
        /// Hash of the offending uncle.
        hash: B256,
    },

    /// More uncles than allowed.
    #[error("too many uncles: {count}")]
    TooManyUncles {
        /// Number of uncles in the block.
        count: usize,
    },

    /// Header extra-data exceeds the cap.
    #[error("extra data is {len} bytes, limit {max}")]
    ExtraDataTooLong {
        /// Actual length.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },
}
