use emerald_primitives::{Address, GotExpected, SignatureError, B256, U256};
use emerald_state::StateError;

/// Reasons block execution fails.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockExecutionError {
    /// A replay-protected transaction is bound to the wrong chain.
    #[error("transaction {tx} carries chain id {embedded}, configuration expects {configured}")]
    InvalidChainId {
        /// The offending transaction.
        tx: B256,
        /// Chain id embedded in the signature.
        embedded: u64,
        /// Chain id the configuration requires.
        configured: u64,
    },

    /// The sender could not be recovered.
    #[error("cannot recover sender of transaction {tx}")]
    SenderRecovery {
        /// The offending transaction.
        tx: B256,
        /// Underlying signature failure.
        #[source]
        source: SignatureError,
    },

    /// The transaction nonce does not match the sender account.
    #[error("transaction {tx} nonce invalid: {nonce}")]
    InvalidNonce {
        /// The offending transaction.
        tx: B256,
        /// Transaction nonce versus account nonce.
        nonce: GotExpected<u64>,
    },

    /// The sender cannot pay for the gas it is buying.
    #[error("sender {address} of transaction {tx} has balance {have}, gas purchase needs {want}")]
    InsufficientBalanceForGas {
        /// The offending transaction.
        tx: B256,
        /// The paying account.
        address: Address,
        /// Available balance.
        have: U256,
        /// Cost of the gas purchase.
        want: U256,
    },

    /// The block gas pool cannot cover the transaction's gas limit.
    #[error("gas pool holds {pool}, transaction {tx} wants {want}")]
    GasLimitReached {
        /// The offending transaction.
        tx: B256,
        /// Remaining pool gas.
        pool: u64,
        /// Requested gas.
        want: u64,
    },

    /// The transaction's gas limit does not cover its intrinsic cost.
    #[error("transaction {tx} gas limit {gas_limit} is below intrinsic cost {required}")]
    IntrinsicGas {
        /// The offending transaction.
        tx: B256,
        /// Purchased gas.
        gas_limit: u64,
        /// Intrinsic requirement.
        required: u64,
    },

    /// World-state failure during execution.
    #[error(transparent)]
    State(#[from] StateError),
}
