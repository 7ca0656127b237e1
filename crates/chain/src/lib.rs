//! Canonical-chain maintenance for emerald.
//!
//! The [`BlockChain`] ingests externally produced blocks (plus header-only
//! and receipt-only chains for fast sync), validates and executes them,
//! persists the results, and keeps a single canonical chain under the
//! heaviest-total-difficulty rule, reorganizing competing branches and
//! recovering from partial persistent state on startup. Chain events fan
//! out through a typed broadcast bus, and a secondary index maps addresses
//! to the transactions involving them.

pub mod accessors;
mod atxi;
mod blockchain;
mod error;
mod events;
mod header_chain;
mod recovery;
mod reorg;
#[cfg(test)]
pub mod test_utils;

pub use atxi::{AddrTxQuery, Direction, EntryKind};
pub use blockchain::{BlockChain, BlockChainConfig, InsertSummary, WriteStatus};
pub use error::{ChainError, InsertError};
pub use events::{ChainNotification, EventSender};
pub use header_chain::{HeaderChain, HeaderInsertSummary};
