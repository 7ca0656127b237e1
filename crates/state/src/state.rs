use crate::{
    diff::{AccountDiff, SlotDiff, StateDiff},
    store::{AccountEntry, Materialized},
    StateError,
};
use emerald_db::{schema, Batch, KeyValueStore};
use emerald_primitives::{
    constants::KECCAK_EMPTY, keccak256, proofs, Account, Address, Bytes, Log, B256, U256,
};
use parking_lot::Mutex;
use schnellru::LruMap;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// A mutable world-state view rooted at a committed state root.
///
/// All mutations run through a journal; [`State::snapshot`] returns an
/// integer id and [`State::revert_to`] undoes everything recorded since.
/// A state value is single-writer: callers hand it out by exclusive
/// reference for the duration of a block.
pub struct State {
    store: Arc<dyn KeyValueStore>,
    cache: Arc<Mutex<LruMap<B256, Arc<Materialized>>>>,
    base: Arc<Materialized>,
    base_root: B256,
    starting_nonce: u64,

    overlay: HashMap<Address, AccountEntry>,
    suicides: HashSet<Address>,
    dirty_code: HashMap<B256, Bytes>,
    journal: Vec<JournalEntry>,

    logs: Vec<Log>,
    refund: u64,
    tx_hash: B256,
    block_hash: B256,
    tx_index: u64,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("base_root", &self.base_root)
            .field("dirty_accounts", &self.overlay.len())
            .field("journal_len", &self.journal.len())
            .field("logs", &self.logs.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum JournalEntry {
    AccountCreated { address: Address },
    BalanceChange { address: Address, prev: U256 },
    NonceChange { address: Address, prev: u64 },
    StorageChange { address: Address, key: B256, prev: U256 },
    CodeChange { address: Address, prev: B256 },
    SuicideMarked { address: Address, prev_marked: bool, prev_balance: U256 },
    RefundChange { prev: u64 },
    LogAdded,
}

impl State {
    pub(crate) fn new(
        store: Arc<dyn KeyValueStore>,
        cache: Arc<Mutex<LruMap<B256, Arc<Materialized>>>>,
        base: Arc<Materialized>,
        base_root: B256,
        starting_nonce: u64,
    ) -> Self {
        Self {
            store,
            cache,
            base,
            base_root,
            starting_nonce,
            overlay: HashMap::new(),
            suicides: HashSet::new(),
            dirty_code: HashMap::new(),
            journal: Vec::new(),
            logs: Vec::new(),
            refund: 0,
            tx_hash: B256::ZERO,
            block_hash: B256::ZERO,
            tx_index: 0,
        }
    }

    /// The root this state was opened at.
    pub fn base_root(&self) -> B256 {
        self.base_root
    }

    fn entry(&self, address: &Address) -> Option<&AccountEntry> {
        self.overlay.get(address).or_else(|| self.base.accounts.get(address))
    }

    /// Whether an account exists. Suicided accounts remain visible until
    /// commit.
    pub fn exists(&self, address: &Address) -> bool {
        self.entry(address).is_some()
    }

    /// Balance of `address`, zero for missing accounts.
    pub fn balance(&self, address: &Address) -> U256 {
        self.entry(address).map(|e| e.balance).unwrap_or_default()
    }

    /// Nonce of `address`, zero for missing accounts.
    pub fn nonce(&self, address: &Address) -> u64 {
        self.entry(address).map(|e| e.nonce).unwrap_or_default()
    }

    /// Code hash of `address`, the empty-code hash for missing accounts.
    pub fn code_hash(&self, address: &Address) -> B256 {
        self.entry(address).map(|e| e.code_hash).unwrap_or(KECCAK_EMPTY)
    }

    /// Code of `address`, empty for missing accounts.
    pub fn code(&self, address: &Address) -> Result<Bytes, StateError> {
        let hash = self.code_hash(address);
        if hash == KECCAK_EMPTY {
            return Ok(Bytes::new());
        }
        if let Some(code) = self.dirty_code.get(&hash) {
            return Ok(code.clone());
        }
        Ok(self.store.get(&schema::code_key(&hash))?.map(Bytes::from).unwrap_or_default())
    }

    /// Storage slot `key` of `address`, zero when unset.
    pub fn storage(&self, address: &Address, key: &B256) -> U256 {
        self.entry(address).and_then(|e| e.storage.get(key).copied()).unwrap_or_default()
    }

    fn ensure_entry(&mut self, address: Address) -> &mut AccountEntry {
        if !self.overlay.contains_key(&address) {
            let entry = match self.base.accounts.get(&address) {
                Some(existing) => existing.clone(),
                None => {
                    self.journal.push(JournalEntry::AccountCreated { address });
                    AccountEntry::new(self.starting_nonce)
                }
            };
            self.overlay.insert(address, entry);
        }
        self.overlay.get_mut(&address).expect("just inserted")
    }

    /// Creates `address` if missing. New accounts start at the configured
    /// starting nonce.
    pub fn create_account(&mut self, address: Address) {
        self.ensure_entry(address);
    }

    /// Credits `address` with `amount`, creating the account if needed.
    pub fn add_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        let prev = {
            let entry = self.ensure_entry(address);
            let prev = entry.balance;
            entry.balance = prev.saturating_add(amount);
            prev
        };
        self.journal.push(JournalEntry::BalanceChange { address, prev });
        Ok(())
    }

    /// Debits `amount` from `address`, failing without mutation when the
    /// balance is insufficient.
    pub fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        let have = self.balance(&address);
        if have < amount {
            return Err(StateError::InsufficientBalance { address, have, want: amount });
        }
        let entry = self.ensure_entry(address);
        let prev = entry.balance;
        entry.balance = prev - amount;
        self.journal.push(JournalEntry::BalanceChange { address, prev });
        Ok(())
    }

    /// Overwrites the balance of `address`.
    pub fn set_balance(&mut self, address: Address, balance: U256) {
        let entry = self.ensure_entry(address);
        let prev = entry.balance;
        entry.balance = balance;
        self.journal.push(JournalEntry::BalanceChange { address, prev });
    }

    /// Overwrites the nonce of `address`.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        let entry = self.ensure_entry(address);
        let prev = entry.nonce;
        entry.nonce = nonce;
        self.journal.push(JournalEntry::NonceChange { address, prev });
    }

    /// Installs `code` on `address`.
    pub fn set_code(&mut self, address: Address, code: Bytes) {
        let hash = keccak256(&code);
        let entry = self.ensure_entry(address);
        let prev = entry.code_hash;
        entry.code_hash = hash;
        self.journal.push(JournalEntry::CodeChange { address, prev });
        self.dirty_code.insert(hash, code);
    }

    /// Sets storage slot `key` of `address`. Zero clears the slot.
    pub fn set_state(&mut self, address: Address, key: B256, value: U256) {
        let entry = self.ensure_entry(address);
        let prev = entry.storage.get(&key).copied().unwrap_or_default();
        if value.is_zero() {
            entry.storage.remove(&key);
        } else {
            entry.storage.insert(key, value);
        }
        self.journal.push(JournalEntry::StorageChange { address, key, prev });
    }

    /// Marks `address` for deletion at commit and zeroes its balance.
    /// Returns whether the account existed.
    pub fn suicide(&mut self, address: Address) -> bool {
        if !self.exists(&address) {
            return false;
        }
        let prev_marked = self.suicides.contains(&address);
        let entry = self.ensure_entry(address);
        let prev_balance = entry.balance;
        entry.balance = U256::ZERO;
        self.suicides.insert(address);
        self.journal.push(JournalEntry::SuicideMarked { address, prev_marked, prev_balance });
        true
    }

    /// Adds to the refund counter consumed at the end of a transaction.
    pub fn add_refund(&mut self, amount: u64) {
        self.journal.push(JournalEntry::RefundChange { prev: self.refund });
        self.refund += amount;
    }

    /// The accumulated refund counter.
    pub fn refund(&self) -> u64 {
        self.refund
    }

    /// Sets the transaction position used to attribute logs.
    ///
    /// Also resets the per-transaction refund counter.
    pub fn set_tx_context(&mut self, tx_hash: B256, block_hash: B256, tx_index: u64) {
        self.tx_hash = tx_hash;
        self.block_hash = block_hash;
        self.tx_index = tx_index;
        self.refund = 0;
    }

    /// Records a log against the current transaction context.
    pub fn add_log(&mut self, mut log: Log) {
        log.transaction_hash = self.tx_hash;
        log.block_hash = self.block_hash;
        log.transaction_index = self.tx_index;
        self.journal.push(JournalEntry::LogAdded);
        self.logs.push(log);
    }

    /// Logs recorded for `tx_hash`, in emission order.
    pub fn logs_for(&self, tx_hash: &B256) -> Vec<Log> {
        self.logs.iter().filter(|log| log.transaction_hash == *tx_hash).cloned().collect()
    }

    /// All logs recorded so far.
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    /// Opens a snapshot. Valid until a revert to an earlier snapshot.
    pub fn snapshot(&self) -> usize {
        self.journal.len()
    }

    /// Reverts every mutation recorded since `snapshot`.
    pub fn revert_to(&mut self, snapshot: usize) {
        assert!(snapshot <= self.journal.len(), "invalid state snapshot id");
        while self.journal.len() > snapshot {
            match self.journal.pop().expect("journal length checked") {
                JournalEntry::AccountCreated { address } => {
                    self.overlay.remove(&address);
                }
                JournalEntry::BalanceChange { address, prev } => {
                    if let Some(entry) = self.overlay.get_mut(&address) {
                        entry.balance = prev;
                    }
                }
                JournalEntry::NonceChange { address, prev } => {
                    if let Some(entry) = self.overlay.get_mut(&address) {
                        entry.nonce = prev;
                    }
                }
                JournalEntry::StorageChange { address, key, prev } => {
                    if let Some(entry) = self.overlay.get_mut(&address) {
                        if prev.is_zero() {
                            entry.storage.remove(&key);
                        } else {
                            entry.storage.insert(key, prev);
                        }
                    }
                }
                JournalEntry::CodeChange { address, prev } => {
                    if let Some(entry) = self.overlay.get_mut(&address) {
                        entry.code_hash = prev;
                    }
                }
                JournalEntry::SuicideMarked { address, prev_marked, prev_balance } => {
                    if !prev_marked {
                        self.suicides.remove(&address);
                    }
                    if let Some(entry) = self.overlay.get_mut(&address) {
                        entry.balance = prev_balance;
                    }
                }
                JournalEntry::RefundChange { prev } => {
                    self.refund = prev;
                }
                JournalEntry::LogAdded => {
                    self.logs.pop();
                }
            }
        }
    }

    fn merged_view(&self) -> HashMap<Address, AccountEntry> {
        let mut merged: HashMap<Address, AccountEntry> = self
            .base
            .accounts
            .iter()
            .filter(|(address, _)| !self.overlay.contains_key(*address))
            .map(|(address, entry)| (*address, entry.clone()))
            .collect();
        for (address, entry) in &self.overlay {
            if !self.suicides.contains(address) {
                merged.insert(*address, entry.clone());
            }
        }
        merged
    }

    fn account_of(entry: &AccountEntry) -> Account {
        Account {
            nonce: entry.nonce,
            balance: entry.balance,
            storage_root: proofs::storage_root(
                entry.storage.iter().map(|(key, value)| (*key, *value)),
            ),
            code_hash: entry.code_hash,
        }
    }

    /// Recomputes the state root over the current account set without
    /// persisting anything.
    pub fn intermediate_root(&self) -> B256 {
        proofs::state_root(
            self.merged_view().iter().map(|(address, entry)| (*address, Self::account_of(entry))),
        )
    }

    /// Commits the current account set into `batch` and returns the new
    /// root.
    ///
    /// The diff record, dirty code blobs, and the materialization cache are
    /// updated; the state itself continues from the committed root with an
    /// empty journal. The caller writes the batch; a batch-write failure
    /// after this point is fatal to the process, as the cached state would
    /// diverge from disk.
    pub fn commit_to(&mut self, batch: &mut Batch) -> Result<B256, StateError> {
        let merged = self.merged_view();
        let root = proofs::state_root(
            merged.iter().map(|(address, entry)| (*address, Self::account_of(entry))),
        );
        if root == self.base_root {
            self.clear_transient();
            return Ok(root);
        }

        let mut accounts = Vec::new();
        for (address, entry) in &self.overlay {
            if self.suicides.contains(address) {
                if self.base.accounts.contains_key(address) {
                    accounts.push(AccountDiff {
                        address: *address,
                        removed: true,
                        nonce: 0,
                        balance: U256::ZERO,
                        code_hash: B256::ZERO,
                        storage: Vec::new(),
                    });
                }
                continue;
            }
            let base = self.base.accounts.get(address);
            if base == Some(entry) {
                continue;
            }

            let mut storage = Vec::new();
            let base_storage = base.map(|b| &b.storage);
            for (key, value) in &entry.storage {
                if base_storage.and_then(|s| s.get(key)) != Some(value) {
                    storage.push(SlotDiff { key: *key, value: *value });
                }
            }
            if let Some(base_storage) = base_storage {
                for key in base_storage.keys() {
                    if !entry.storage.contains_key(key) {
                        storage.push(SlotDiff { key: *key, value: U256::ZERO });
                    }
                }
            }
            storage.sort_unstable_by(|a, b| a.key.cmp(&b.key));

            if self.dirty_code.contains_key(&entry.code_hash) {
                if let Some(code) = self.dirty_code.get(&entry.code_hash) {
                    batch.put(schema::code_key(&entry.code_hash), code.to_vec());
                }
            }

            accounts.push(AccountDiff {
                address: *address,
                removed: false,
                nonce: entry.nonce,
                balance: entry.balance,
                code_hash: entry.code_hash,
                storage,
            });
        }
        accounts.sort_unstable_by(|a, b| a.address.cmp(&b.address));

        let diff = StateDiff { parent: self.base_root, accounts };
        batch.put(schema::state_diff_key(&root), alloy_rlp::encode(&diff));

        let materialized = Arc::new(Materialized { accounts: merged });
        self.cache.lock().insert(root, materialized.clone());
        self.base = materialized;
        self.base_root = root;
        self.clear_transient();
        Ok(root)
    }

    fn clear_transient(&mut self) {
        self.overlay.clear();
        self.suicides.clear();
        self.dirty_code.clear();
        self.journal.clear();
        self.refund = 0;
    }
}
