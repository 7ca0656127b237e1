use crate::{diff::StateDiff, State, StateError};
use alloy_rlp::Decodable;
use emerald_db::{schema, KeyValueStore};
use emerald_primitives::{
    constants::{EMPTY_ROOT_HASH, KECCAK_EMPTY},
    Address, Bytes, B256, U256,
};
use parking_lot::Mutex;
use schnellru::{ByLength, LruMap};
use std::{collections::HashMap, sync::Arc};
use tracing::trace;

/// Number of fully materialized roots kept in memory. The parent of the next
/// block is almost always among them.
const MATERIALIZED_CACHE_SIZE: u32 = 128;

/// A fully materialized account set at one root.
#[derive(Clone, Default)]
pub(crate) struct Materialized {
    pub(crate) accounts: HashMap<Address, AccountEntry>,
}

/// In-memory shape of one account, storage included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AccountEntry {
    pub(crate) nonce: u64,
    pub(crate) balance: U256,
    pub(crate) code_hash: B256,
    pub(crate) storage: HashMap<B256, U256>,
}

impl AccountEntry {
    pub(crate) fn new(nonce: u64) -> Self {
        Self { nonce, balance: U256::ZERO, code_hash: KECCAK_EMPTY, storage: HashMap::new() }
    }
}

/// Factory for [`State`] values, rooted at arbitrary committed roots.
///
/// Committed transitions are stored as parent-linked diffs; opening a state
/// materializes the account set by walking the chain of diffs down to the
/// empty root or a cached ancestor.
#[derive(Clone)]
pub struct StateStore {
    store: Arc<dyn KeyValueStore>,
    starting_nonce: u64,
    cache: Arc<Mutex<LruMap<B256, Arc<Materialized>>>>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("starting_nonce", &self.starting_nonce)
            .finish_non_exhaustive()
    }
}

impl StateStore {
    /// Creates a store over `store`. `starting_nonce` is assigned to newly
    /// created accounts.
    pub fn new(store: Arc<dyn KeyValueStore>, starting_nonce: u64) -> Self {
        Self {
            store,
            starting_nonce,
            cache: Arc::new(Mutex::new(LruMap::new(ByLength::new(MATERIALIZED_CACHE_SIZE)))),
        }
    }

    /// Whether a state is available for `root`.
    pub fn has_state(&self, root: &B256) -> bool {
        *root == EMPTY_ROOT_HASH ||
            self.cache.lock().peek(root).is_some() ||
            self.store.has(&schema::state_diff_key(root)).unwrap_or(false)
    }

    /// Opens a mutable state rooted at `root`.
    pub fn state_at(&self, root: B256) -> Result<State, StateError> {
        let base = self.materialize(root)?;
        Ok(State::new(
            self.store.clone(),
            self.cache.clone(),
            base,
            root,
            self.starting_nonce,
        ))
    }

    /// Reads a code blob by hash.
    pub fn code(&self, code_hash: &B256) -> Result<Option<Bytes>, StateError> {
        if *code_hash == KECCAK_EMPTY {
            return Ok(Some(Bytes::new()));
        }
        Ok(self.store.get(&schema::code_key(code_hash))?.map(Bytes::from))
    }

    fn materialize(&self, root: B256) -> Result<Arc<Materialized>, StateError> {
        if root == EMPTY_ROOT_HASH {
            return Ok(Arc::new(Materialized::default()));
        }
        if let Some(hit) = self.cache.lock().get(&root) {
            return Ok(hit.clone());
        }

        // walk parent links until the empty root or a cached ancestor
        let mut pending = Vec::new();
        let mut cursor = root;
        let mut base = loop {
            if cursor == EMPTY_ROOT_HASH {
                break Materialized::default();
            }
            if let Some(hit) = self.cache.lock().get(&cursor) {
                break (**hit).clone();
            }
            let raw = self
                .store
                .get(&schema::state_diff_key(&cursor))?
                .ok_or(StateError::MissingState(cursor))?;
            let diff = StateDiff::decode(&mut raw.as_slice())
                .map_err(|e| StateError::CorruptDiff { root: cursor, reason: e.to_string() })?;
            cursor = diff.parent;
            pending.push(diff);
        };

        trace!(target: "state", %root, depth = pending.len(), "materializing state");
        for diff in pending.iter().rev() {
            apply_diff(&mut base, diff);
        }

        let base = Arc::new(base);
        self.cache.lock().insert(root, base.clone());
        Ok(base)
    }
}

fn apply_diff(base: &mut Materialized, diff: &StateDiff) {
    for account in &diff.accounts {
        if account.removed {
            base.accounts.remove(&account.address);
            continue;
        }
        let entry = base
            .accounts
            .entry(account.address)
            .or_insert_with(|| AccountEntry::new(0));
        entry.nonce = account.nonce;
        entry.balance = account.balance;
        entry.code_hash = account.code_hash;
        for slot in &account.storage {
            if slot.value.is_zero() {
                entry.storage.remove(&slot.key);
            } else {
                entry.storage.insert(slot.key, slot.value);
            }
        }
    }
}
