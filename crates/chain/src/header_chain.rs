use crate::{accessors, ChainError, InsertError};
use emerald_consensus::BlockValidator;
use emerald_db::{Batch, KeyValueStore, StoreError};
use emerald_primitives::{BlockNumber, SealedHeader, B256, U256};
use parking_lot::{Mutex, RwLock};
use schnellru::{ByLength, LruMap};
use std::sync::Arc;
use tracing::{debug, info};

const HEADER_CACHE_SIZE: u32 = 512;
const TD_CACHE_SIZE: u32 = 1024;

/// Summary of one `insert_header_chain` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderInsertSummary {
    /// Headers written.
    pub inserted: usize,
    /// Headers skipped as already known.
    pub ignored: usize,
}

/// Stores headers with their total difficulties and maintains the canonical
/// number-to-hash mapping and the head-header pointer.
pub struct HeaderChain {
    store: Arc<dyn KeyValueStore>,
    validator: BlockValidator,
    current: RwLock<SealedHeader>,
    header_cache: Mutex<LruMap<B256, SealedHeader>>,
    td_cache: Mutex<LruMap<B256, U256>>,
}

impl std::fmt::Debug for HeaderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderChain")
            .field("current", &self.current.read().num_hash())
            .finish_non_exhaustive()
    }
}

impl HeaderChain {
    /// Creates a header chain. The current header is set once the genesis
    /// or persisted head is known.
    pub fn new(store: Arc<dyn KeyValueStore>, validator: BlockValidator) -> Self {
        Self {
            store,
            validator,
            current: RwLock::new(SealedHeader::default()),
            header_cache: Mutex::new(LruMap::new(ByLength::new(HEADER_CACHE_SIZE))),
            td_cache: Mutex::new(LruMap::new(ByLength::new(TD_CACHE_SIZE))),
        }
    }

    /// The head header.
    pub fn current_header(&self) -> SealedHeader {
        self.current.read().clone()
    }

    /// Points the in-memory head header at `header`.
    pub fn set_current_header(&self, header: SealedHeader) {
        *self.current.write() = header;
    }

    /// Header by hash.
    pub fn header(&self, hash: &B256) -> Result<Option<SealedHeader>, StoreError> {
        if let Some(hit) = self.header_cache.lock().get(hash) {
            return Ok(Some(hit.clone()));
        }
        let header = accessors::read_header(&*self.store, hash)?;
        if let Some(header) = &header {
            self.header_cache.lock().insert(*hash, header.clone());
        }
        Ok(header)
    }

    /// Whether a header with `hash` is stored.
    pub fn has_header(&self, hash: &B256) -> Result<bool, StoreError> {
        if self.header_cache.lock().peek(hash).is_some() {
            return Ok(true);
        }
        Ok(accessors::read_header_number(&*self.store, hash)?.is_some())
    }

    /// Canonical header at `number`.
    pub fn header_by_number(&self, number: BlockNumber) -> Result<Option<SealedHeader>, StoreError> {
        match accessors::read_canonical_hash(&*self.store, number)? {
            Some(hash) => self.header(&hash),
            None => Ok(None),
        }
    }

    /// Total difficulty of the block with `hash`.
    pub fn td(&self, hash: &B256) -> Result<Option<U256>, StoreError> {
        if let Some(hit) = self.td_cache.lock().get(hash) {
            return Ok(Some(*hit));
        }
        let td = accessors::read_td(&*self.store, hash)?;
        if let Some(td) = td {
            self.td_cache.lock().insert(*hash, td);
        }
        Ok(td)
    }

    pub(crate) fn cache_td(&self, hash: B256, td: U256) {
        self.td_cache.lock().insert(hash, td);
    }

    pub(crate) fn cache_header(&self, header: SealedHeader) {
        self.header_cache.lock().insert(header.hash(), header);
    }

    /// Inserts a chain of headers.
    ///
    /// Each header is validated against its stored parent. Proof of work is
    /// checked on every `check_freq`-th header; the rest are trusted because
    /// their hashes are part of the total-difficulty chain. A header whose
    /// accumulated difficulty beats the current canonical head rewrites the
    /// canonical mapping up to its height and takes over the head pointer.
    pub fn insert_header_chain(
        &self,
        headers: &[SealedHeader],
        check_freq: usize,
    ) -> Result<HeaderInsertSummary, InsertError> {
        let mut summary = HeaderInsertSummary::default();

        for (index, header) in headers.iter().enumerate() {
            let fail =
                |kind: ChainError| InsertError::new(index, header.hash(), kind);

            if self.has_header(&header.hash()).map_err(|e| fail(e.into()))? {
                summary.ignored += 1;
                continue;
            }
            let parent = self
                .header(&header.parent_hash)
                .map_err(|e| fail(e.into()))?
                .ok_or_else(|| {
                    fail(emerald_consensus::ConsensusError::UnknownAncestor {
                        hash: header.parent_hash,
                    }
                    .into())
                })?;

            let check_pow = check_freq != 0 && index % check_freq == 0;
            self.validator
                .validate_header(header, &parent, check_pow, false)
                .map_err(|e| fail(e.into()))?;

            let parent_td = self
                .td(&header.parent_hash)
                .map_err(|e| fail(e.into()))?
                .ok_or_else(|| fail(ChainError::MissingTotalDifficulty { hash: header.parent_hash }))?;
            let td = parent_td + header.difficulty;

            let mut batch = Batch::new();
            accessors::write_header(&mut batch, header);
            accessors::write_td(&mut batch, &header.hash(), td);

            let local_td = {
                let current = self.current.read();
                self.td(&current.hash()).map_err(|e| fail(e.into()))?.unwrap_or_default()
            };
            let takes_over = td > local_td;
            if takes_over {
                self.rewrite_canonical(&mut batch, header).map_err(fail)?;
                accessors::write_head_header_hash(&mut batch, &header.hash());
            }

            self.store.write_batch(batch).map_err(|e| fail(e.into()))?;
            self.cache_header(header.clone());
            self.cache_td(header.hash(), td);
            if takes_over {
                self.set_current_header(header.clone());
            }
            summary.inserted += 1;
        }

        debug!(
            target: "chain::headers",
            inserted = summary.inserted,
            ignored = summary.ignored,
            "inserted header chain"
        );
        Ok(summary)
    }

    /// Rewrites the canonical mapping so it ends at `head`: stale entries
    /// above it are dropped, and its ancestry is written back until the
    /// mapping already agrees.
    fn rewrite_canonical(&self, batch: &mut Batch, head: &SealedHeader) -> Result<(), ChainError> {
        let current_number = self.current.read().number;
        let mut stale = head.number + 1;
        while stale <= current_number {
            if accessors::read_canonical_hash(&*self.store, stale)?.is_none() {
                break;
            }
            accessors::delete_canonical_hash(batch, stale);
            stale += 1;
        }

        let mut cursor = head.clone();
        loop {
            accessors::write_canonical_hash(batch, cursor.number, &cursor.hash());
            if cursor.number == 0 {
                break;
            }
            if accessors::read_canonical_hash(&*self.store, cursor.number - 1)?
                == Some(cursor.parent_hash)
            {
                break;
            }
            cursor = self
                .header(&cursor.parent_hash)?
                .ok_or(ChainError::MissingHeader { hash: cursor.parent_hash })?;
        }
        Ok(())
    }

    /// Rewinds the canonical chain to `target`, deleting headers, total
    /// difficulties and canonical entries strictly above it. Block data
    /// beyond headers is dropped through `delete_block_data`.
    ///
    /// The head header moves to the canonical header at `target` (genesis if
    /// the mapping is damaged).
    pub fn set_head(
        &self,
        target: BlockNumber,
        mut delete_block_data: impl FnMut(&mut Batch, BlockNumber, &B256),
    ) -> Result<(), ChainError> {
        let mut batch = Batch::new();
        let mut number = self.current.read().number;
        while number > target {
            if let Some(hash) = accessors::read_canonical_hash(&*self.store, number)? {
                accessors::delete_header(&mut batch, number, &hash);
                accessors::delete_td(&mut batch, &hash);
                delete_block_data(&mut batch, number, &hash);
                self.header_cache.lock().remove(&hash);
                self.td_cache.lock().remove(&hash);
            }
            accessors::delete_canonical_hash(&mut batch, number);
            number -= 1;
        }

        let new_head = match accessors::read_canonical_hash(&*self.store, target)? {
            Some(hash) => self
                .header(&hash)?
                .ok_or(ChainError::MissingHeader { hash })?,
            None => self
                .header_by_number(0)?
                .ok_or(ChainError::MissingCanonicalHash { number: 0 })?,
        };
        accessors::write_head_header_hash(&mut batch, &new_head.hash());
        self.store.write_batch(batch)?;

        info!(target: "chain::headers", number = new_head.number, hash = %new_head.hash(), "header chain rewound");
        self.set_current_header(new_head);
        Ok(())
    }
}
