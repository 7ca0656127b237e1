use emerald_db::StoreError;
use emerald_primitives::{Address, B256, U256};

/// World-state errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// No committed state exists for the requested root.
    #[error("state for root {0} is not available")]
    MissingState(B256),

    /// A balance subtraction would underflow.
    #[error("account {address} balance {have} is below required {want}")]
    InsufficientBalance {
        /// The debited account.
        address: Address,
        /// Its current balance.
        have: U256,
        /// The amount that was to be subtracted.
        want: U256,
    },

    /// A persisted diff record failed to decode.
    #[error("corrupt state diff for root {root}: {reason}")]
    CorruptDiff {
        /// Root whose record is damaged.
        root: B256,
        /// Decoder message.
        reason: String,
    },

    /// Underlying storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
