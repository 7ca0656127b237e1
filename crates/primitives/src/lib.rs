//! Commonly used types for the emerald chain core.
//!
//! Headers, blocks, legacy transactions with both signing schemes, receipts
//! with the dual pre/post status encoding, accounts, and the deterministic
//! root computations that tie them into consensus hashes.

mod account;
mod block;
pub mod constants;
mod header;
mod log;
pub mod proofs;
mod receipt;
mod transaction;

pub use account::Account;
pub use block::{Block, BlockBody, SealedBlock};
pub use header::{Header, SealedHeader};
pub use log::{logs_bloom, Log};
pub use receipt::{Receipt, ReceiptOutcome, ReceiptWithBloom};
pub use transaction::{
    sign_transaction, Signature, SignatureError, Signer, Transaction, TransactionSigned,
    TxLookupEntry,
};

pub use alloy_primitives::{self, keccak256, Address, Bloom, Bytes, TxKind, B256, B64, U256};

/// A block number.
pub type BlockNumber = u64;

/// Pair of computed and expected values carried by mismatch errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GotExpected<T> {
    /// The computed value.
    pub got: T,
    /// The value the header or caller declared.
    pub expected: T,
}

impl<T: std::fmt::Display> std::fmt::Display for GotExpected<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "got {}, expected {}", self.got, self.expected)
    }
}

impl<T> From<(T, T)> for GotExpected<T> {
    fn from((got, expected): (T, T)) -> Self {
        Self { got, expected }
    }
}
