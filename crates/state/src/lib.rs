//! Versioned world-state store.
//!
//! A [`State`] is a mutable, journaled view rooted at a 32-byte state root:
//! account and storage mutations are recorded in a journal with integer
//! snapshot ids, so the message executor can revert failed sub-calls in time
//! proportional to the mutations since the snapshot.
//!
//! Commits persist as parent-linked diff records keyed by the post-state
//! root. Any committed root, side branches included, can be reopened;
//! materialization walks the diff chain and is amortized by a bounded cache
//! of materialized roots. Roots themselves are computed through the trie
//! interface and are bit-stable.

mod diff;
mod error;
mod state;
mod store;

pub use diff::{AccountDiff, SlotDiff, StateDiff};
pub use error::StateError;
pub use state::State;
pub use store::StateStore;
