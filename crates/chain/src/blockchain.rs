use crate::{
    accessors, ChainError, ChainNotification, EventSender, HeaderChain, HeaderInsertSummary,
    InsertError,
};
use emerald_chainspec::ChainSpec;
use emerald_consensus::{
    validate_block_post_execution, BlockValidator, ChainLookup, ConsensusError, PowVerifier,
};
use emerald_db::{Batch, KeyValueStore, StoreError};
use emerald_executor::{MessageExecutor, StateProcessor};
use emerald_primitives::{
    constants::EMPTY_ROOT_HASH, logs_bloom, BlockNumber, Receipt, SealedBlock, SealedHeader,
    TransactionSigned, TxLookupEntry, B256, U256,
};
use emerald_state::StateStore;
use parking_lot::{Mutex, RwLock};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use schnellru::{ByLength, LruMap};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info, trace};

/// Tuning knobs of the chain manager.
#[derive(Debug, Clone)]
pub struct BlockChainConfig {
    /// Maintain the address-transaction index during inserts.
    pub atxi: bool,
    /// Capacity of the full-block cache.
    pub block_cache_size: u32,
    /// Capacity of the future-blocks cache.
    pub future_cap: u32,
    /// How far past the wall clock a block may lie and still be parked in
    /// the future-blocks cache, in seconds.
    pub future_horizon_secs: u64,
    /// Verify proof of work on every n-th header during header-only sync.
    pub pow_check_freq: usize,
    /// Fixed seed for the canonical tiebreak and probe jitter. `None` seeds
    /// from the OS.
    pub tiebreak_seed: Option<u64>,
}

impl Default for BlockChainConfig {
    fn default() -> Self {
        Self {
            atxi: true,
            block_cache_size: 256,
            future_cap: 256,
            future_horizon_secs: 30,
            pow_check_freq: 100,
            tiebreak_seed: None,
        }
    }
}

/// Counters of one `insert_chain` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    /// Blocks validated, executed and written.
    pub inserted: usize,
    /// Blocks skipped because they were already known.
    pub ignored: usize,
    /// Blocks parked in the future-blocks cache.
    pub queued: usize,
}

/// How a written block relates to the canonical chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The block extends or takes over the canonical chain.
    Canonical {
        /// Whether taking over required a reorganization.
        reorged: bool,
    },
    /// The block was stored on a side branch.
    Side,
}

#[derive(Debug)]
pub(crate) struct Heads {
    pub(crate) current_block: SealedBlock,
    pub(crate) current_fast: SealedHeader,
}

/// The chain manager: validates, executes and persists blocks, maintains
/// the three head pointers and the canonical mapping under the
/// heaviest-total-difficulty rule, and emits chain events.
///
/// A reader-writer lock protects the head pointers; a separate mutex
/// serializes the insertion pipelines so at most one insert runs at a time.
pub struct BlockChain {
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) spec: Arc<ChainSpec>,
    pub(crate) validator: BlockValidator,
    pub(crate) processor: StateProcessor,
    pub(crate) state_store: StateStore,
    pub(crate) header_chain: HeaderChain,
    pub(crate) heads: RwLock<Heads>,
    pub(crate) chain_mu: Mutex<()>,
    pub(crate) block_cache: Mutex<LruMap<B256, SealedBlock>>,
    pub(crate) future_blocks: Mutex<LruMap<B256, SealedBlock>>,
    pub(crate) events: EventSender,
    pub(crate) interrupt: Arc<AtomicBool>,
    pub(crate) rng: Mutex<StdRng>,
    pub(crate) config: BlockChainConfig,
}

impl std::fmt::Debug for BlockChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let heads = self.heads.read();
        f.debug_struct("BlockChain")
            .field("network", &self.spec.network)
            .field("head_block", &heads.current_block.num_hash())
            .field("head_fast", &heads.current_fast.num_hash())
            .finish_non_exhaustive()
    }
}

impl BlockChain {
    /// Opens a chain over `store`, writing the genesis from the spec's dump
    /// if the store is empty and recovering a consistent head otherwise.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        spec: Arc<ChainSpec>,
        pow: Arc<dyn PowVerifier>,
        evm: Arc<dyn MessageExecutor>,
        config: BlockChainConfig,
    ) -> Result<Self, ChainError> {
        let validator = BlockValidator::new(spec.clone(), pow);
        let header_chain = HeaderChain::new(store.clone(), validator.clone());
        let state_store = StateStore::new(store.clone(), spec.starting_nonce);
        let processor = StateProcessor::new(spec.clone(), evm);
        let rng = match config.tiebreak_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let placeholder = SealedBlock {
            header: SealedHeader::default(),
            body: Vec::new(),
            ommers: Vec::new(),
        };
        let chain = Self {
            store,
            spec,
            validator,
            processor,
            state_store,
            header_chain,
            heads: RwLock::new(Heads {
                current_block: placeholder,
                current_fast: SealedHeader::default(),
            }),
            chain_mu: Mutex::new(()),
            block_cache: Mutex::new(LruMap::new(ByLength::new(config.block_cache_size))),
            future_blocks: Mutex::new(LruMap::new(ByLength::new(config.future_cap))),
            events: EventSender::default(),
            interrupt: Arc::new(AtomicBool::new(false)),
            rng: Mutex::new(rng),
            config,
        };

        chain.setup_genesis()?;
        chain.load_last_state(false)?;
        Ok(chain)
    }

    /// The chain configuration.
    pub fn spec(&self) -> &Arc<ChainSpec> {
        &self.spec
    }

    /// The state-store factory backing this chain.
    pub fn state_store(&self) -> &StateStore {
        &self.state_store
    }

    /// The header chain.
    pub fn header_chain(&self) -> &HeaderChain {
        &self.header_chain
    }

    /// Flag aborting the insertion loop and index builds at their next
    /// safe boundary. Wire this to a signal handler.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Opens a subscription to chain events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ChainNotification> {
        self.events.subscribe()
    }

    /// Announces a locally mined block to subscribers.
    pub fn post_mined_block(&self, block: SealedBlock) {
        self.events.notify(ChainNotification::NewMinedBlock { block: Arc::new(block) });
    }

    // --- genesis -----------------------------------------------------------

    /// Materializes the configured genesis dump and writes block zero,
    /// unless it is already stored. Rewriting with a different dump is
    /// rejected; the stored genesis is immutable.
    pub fn setup_genesis(&self) -> Result<SealedBlock, ChainError> {
        let mut state = self.state_store.state_at(EMPTY_ROOT_HASH)?;
        for (address, account) in &self.spec.genesis.alloc {
            state.create_account(*address);
            state.set_balance(*address, account.balance);
            if let Some(code) = &account.code {
                state.set_code(*address, code.clone());
            }
            if let Some(storage) = &account.storage {
                for (key, value) in storage {
                    state.set_state(*address, B256::from(*key), *value);
                }
            }
        }
        let root = state.intermediate_root();
        let header = self.spec.genesis.header(root).seal_slow();
        let genesis = SealedBlock { header, body: Vec::new(), ommers: Vec::new() };

        if let Some(stored) = accessors::read_canonical_hash(&*self.store, 0)? {
            if stored != genesis.hash() {
                return Err(ChainError::GenesisMismatch { stored, computed: genesis.hash() });
            }
            return Ok(genesis);
        }

        let mut batch = Batch::new();
        state.commit_to(&mut batch)?;
        accessors::write_header(&mut batch, &genesis.header);
        accessors::write_body(&mut batch, 0, &genesis.hash(), &genesis.to_body());
        accessors::write_td(&mut batch, &genesis.hash(), genesis.difficulty);
        accessors::write_canonical_hash(&mut batch, 0, &genesis.hash());
        accessors::write_head_block_hash(&mut batch, &genesis.hash());
        accessors::write_head_header_hash(&mut batch, &genesis.hash());
        accessors::write_head_fast_hash(&mut batch, &genesis.hash());
        self.store.write_batch(batch)?;

        info!(target: "chain", hash = %genesis.hash(), "wrote genesis block");
        Ok(genesis)
    }

    // --- queries -----------------------------------------------------------

    /// The head full block.
    pub fn current_block(&self) -> SealedBlock {
        self.heads.read().current_block.clone()
    }

    /// The head header, which may be ahead of the head block.
    pub fn current_header(&self) -> SealedHeader {
        self.header_chain.current_header()
    }

    /// The fast-sync head, between the head block and the head header.
    pub fn current_fast_block(&self) -> SealedHeader {
        self.heads.read().current_fast.clone()
    }

    /// Block by hash.
    pub fn block_by_hash(&self, hash: &B256) -> Result<Option<SealedBlock>, StoreError> {
        if let Some(hit) = self.block_cache.lock().get(hash) {
            return Ok(Some(hit.clone()));
        }
        let block = accessors::read_block(&*self.store, hash)?;
        if let Some(block) = &block {
            self.block_cache.lock().insert(*hash, block.clone());
        }
        Ok(block)
    }

    /// Canonical block at `number`.
    pub fn block_by_number(&self, number: BlockNumber) -> Result<Option<SealedBlock>, StoreError> {
        match accessors::read_canonical_hash(&*self.store, number)? {
            Some(hash) => self.block_by_hash(&hash),
            None => Ok(None),
        }
    }

    /// The genesis block.
    pub fn genesis_block(&self) -> Result<SealedBlock, ChainError> {
        self.block_by_number(0)?.ok_or(ChainError::MissingCanonicalHash { number: 0 })
    }

    /// Total difficulty of the block with `hash`.
    pub fn td_by_hash(&self, hash: &B256) -> Result<Option<U256>, StoreError> {
        self.header_chain.td(hash)
    }

    /// Receipts of the block with `hash`.
    pub fn receipts_by_hash(&self, hash: &B256) -> Result<Option<Vec<Receipt>>, StoreError> {
        let Some(number) = accessors::read_header_number(&*self.store, hash)? else {
            return Ok(None);
        };
        accessors::read_receipts(&*self.store, number, hash)
    }

    /// A canonical transaction and its inclusion entry, by hash.
    pub fn transaction_by_hash(
        &self,
        tx_hash: &B256,
    ) -> Result<Option<(TransactionSigned, TxLookupEntry)>, StoreError> {
        let Some(entry) = accessors::read_tx_lookup(&*self.store, tx_hash)? else {
            return Ok(None);
        };
        let Some(block) = self.block_by_hash(&entry.block_hash)? else { return Ok(None) };
        Ok(block.body.get(entry.index as usize).map(|tx| (tx.clone(), entry)))
    }

    // --- block insertion ---------------------------------------------------

    /// Inserts a contiguous sequence of blocks: validate, execute, persist,
    /// update the canonical chain, emit events.
    ///
    /// Future blocks and blocks whose parent is still parked in the future
    /// cache are queued rather than rejected; already-known blocks count as
    /// ignored. The first real failure aborts the run and reports the
    /// failing input position.
    pub fn insert_chain(&self, blocks: Vec<SealedBlock>) -> Result<InsertSummary, InsertError> {
        if blocks.is_empty() {
            return Ok(InsertSummary::default());
        }
        for index in 1..blocks.len() {
            let previous = &blocks[index - 1];
            let block = &blocks[index];
            if block.number != previous.number + 1 || block.parent_hash != previous.hash() {
                return Err(InsertError::new(
                    index,
                    block.hash(),
                    ChainError::NonContiguousChain {
                        index,
                        got: block.parent_hash,
                        expected: previous.hash(),
                    },
                ));
            }
        }

        let _guard = self.chain_mu.lock();
        let start = Instant::now();

        // seal verification for the whole batch runs up front in parallel;
        // per-block consumption below blocks on its single result
        let seal_results: Vec<Result<(), ConsensusError>> = blocks
            .par_iter()
            .map(|block| self.validator.pow().verify_seal(&block.header))
            .collect();

        let mut summary = InsertSummary::default();
        for (index, block) in blocks.iter().enumerate() {
            if self.interrupt.load(Ordering::Relaxed) {
                debug!(target: "chain", "insert interrupted at block boundary");
                break;
            }
            let hash = block.hash();

            match self.validate_block(block) {
                Ok(()) => {}
                Err(ConsensusError::KnownBlock { .. }) => {
                    summary.ignored += 1;
                    continue;
                }
                Err(ConsensusError::BlockFuture { .. }) => {
                    self.queue_future(block).map_err(|e| InsertError::new(index, hash, e))?;
                    summary.queued += 1;
                    continue;
                }
                Err(ConsensusError::UnknownAncestor { .. })
                    if self.future_blocks.lock().peek(&block.parent_hash).is_some() =>
                {
                    self.queue_future(block).map_err(|e| InsertError::new(index, hash, e))?;
                    summary.queued += 1;
                    continue;
                }
                Err(err) => return Err(InsertError::new(index, hash, err)),
            }
            seal_results[index]
                .clone()
                .map_err(|e| InsertError::new(index, hash, e))?;

            let parent = self
                .header_chain
                .header(&block.parent_hash)
                .map_err(|e| InsertError::new(index, hash, e))?
                .ok_or_else(|| {
                    InsertError::new(
                        index,
                        hash,
                        ConsensusError::UnknownAncestor { hash: block.parent_hash },
                    )
                })?;

            // execute against the parent state
            let mut state = self
                .state_store
                .state_at(parent.state_root)
                .map_err(|e| InsertError::new(index, hash, e))?;
            let output = self
                .processor
                .process(block, &mut state)
                .map_err(|e| InsertError::new(index, hash, e))?;
            validate_block_post_execution(
                block,
                &output.receipts,
                output.gas_used,
                state.intermediate_root(),
            )
            .map_err(|e| InsertError::new(index, hash, e))?;

            let mut batch = Batch::new();
            state.commit_to(&mut batch).map_err(|e| InsertError::new(index, hash, e))?;
            accessors::write_receipts(&mut batch, block.number, &hash, &output.receipts);

            let (status, reorg_events) = self
                .write_block(block, &output.receipts, batch)
                .map_err(|e| InsertError::new(index, hash, e))?;
            self.future_blocks.lock().remove(&hash);

            for event in reorg_events {
                self.events.notify(event);
            }
            let shared = Arc::new(block.clone());
            match status {
                WriteStatus::Canonical { reorged } => {
                    trace!(target: "chain", number = block.number, %hash, reorged, "inserted canonical block");
                    self.events.notify(ChainNotification::Chain {
                        block: shared.clone(),
                        hash,
                        logs: output.logs.clone(),
                    });
                    if self.heads.read().current_block.hash() == hash {
                        self.events.notify(ChainNotification::ChainHead { block: shared });
                    }
                }
                WriteStatus::Side => {
                    trace!(target: "chain", number = block.number, %hash, "inserted side block");
                    self.events.notify(ChainNotification::ChainSide {
                        block: shared,
                        logs: output.logs.clone(),
                    });
                }
            }
            summary.inserted += 1;
        }

        let elapsed = start.elapsed();
        self.events.notify(ChainNotification::ChainInsert {
            inserted: summary.inserted,
            ignored: summary.ignored,
            queued: summary.queued,
            elapsed,
        });
        info!(
            target: "chain",
            inserted = summary.inserted,
            ignored = summary.ignored,
            queued = summary.queued,
            ?elapsed,
            "imported chain segment"
        );
        Ok(summary)
    }

    fn validate_block(&self, block: &SealedBlock) -> Result<(), ConsensusError> {
        self.validator.validate_body(self, block)?;
        let parent = self
            .lookup_header(&block.parent_hash)
            .ok_or(ConsensusError::UnknownAncestor { hash: block.parent_hash })?;
        // seal verification is consumed separately from the parallel pass
        self.validator.validate_header(&block.header, &parent, false, false)
    }

    /// Persists `block` with its total difficulty and decides canonical
    /// status under the heaviest-td rule. Ties flip a coin, which blunts
    /// selfish-mining strategies that rely on deterministic tie handling.
    ///
    /// The batch already carries the committed state and receipts; all
    /// remaining writes for the block join it so the whole block commits
    /// atomically. Returns the status and any reorg events to publish.
    pub(crate) fn write_block(
        &self,
        block: &SealedBlock,
        receipts: &[Receipt],
        mut batch: Batch,
    ) -> Result<(WriteStatus, Vec<ChainNotification>), ChainError> {
        let hash = block.hash();
        let parent_td = self
            .header_chain
            .td(&block.parent_hash)?
            .ok_or(ChainError::MissingTotalDifficulty { hash: block.parent_hash })?;
        let extern_td = parent_td + block.difficulty;

        let (local_hash, local_number) = {
            let heads = self.heads.read();
            (heads.current_block.hash(), heads.current_block.number)
        };
        let local_td = self.header_chain.td(&local_hash)?.unwrap_or_default();

        accessors::write_header(&mut batch, &block.header);
        accessors::write_body(&mut batch, block.number, &hash, &block.to_body());
        accessors::write_td(&mut batch, &hash, extern_td);

        let canonical = extern_td > local_td ||
            (extern_td == local_td && self.rng.lock().gen_bool(0.5));

        let mut events = Vec::new();
        let mut reorged = false;
        let mut update_heads = false;
        if canonical {
            if block.parent_hash != local_hash {
                events = self.reorg(&mut batch, block)?;
                reorged = true;
            }
            update_heads =
                accessors::read_canonical_hash(&*self.store, block.number)? != Some(hash);

            accessors::write_canonical_hash(&mut batch, block.number, &hash);
            accessors::write_tx_lookups(&mut batch, block);
            if self.config.atxi {
                self.write_block_atxi(&mut batch, block);
            }
            let bloom = logs_bloom(receipts.iter().flat_map(|receipt| receipt.logs.iter()));
            accessors::write_mipmap_bloom(&*self.store, &mut batch, block.number, bloom)?;

            accessors::write_head_block_hash(&mut batch, &hash);
            if update_heads {
                accessors::write_head_header_hash(&mut batch, &hash);
                accessors::write_head_fast_hash(&mut batch, &hash);
            }
            // stale canonical entries above the new head, if the old chain
            // was longer
            let mut stale = block.number + 1;
            while stale <= local_number {
                accessors::delete_canonical_hash(&mut batch, stale);
                stale += 1;
            }
        }

        self.store.write_batch(batch)?;

        self.header_chain.cache_header(block.header.clone());
        self.header_chain.cache_td(hash, extern_td);
        self.block_cache.lock().insert(hash, block.clone());
        if canonical {
            let mut heads = self.heads.write();
            heads.current_block = block.clone();
            if update_heads {
                heads.current_fast = block.header.clone();
                self.header_chain.set_current_header(block.header.clone());
            }
        }

        let status =
            if canonical { WriteStatus::Canonical { reorged } } else { WriteStatus::Side };
        Ok((status, events))
    }

    // --- header-only and receipt-only sync ---------------------------------

    /// Inserts a header-only chain, verifying proof of work on every
    /// configured n-th header.
    pub fn insert_header_chain(
        &self,
        headers: &[SealedHeader],
    ) -> Result<HeaderInsertSummary, InsertError> {
        let _guard = self.chain_mu.lock();
        self.header_chain.insert_header_chain(headers, self.config.pow_check_freq)
    }

    /// Attaches bodies and receipts to already-synced headers without
    /// executing them, advancing the fast-sync head.
    pub fn insert_receipt_chain(
        &self,
        items: Vec<(SealedBlock, Vec<Receipt>)>,
    ) -> Result<InsertSummary, InsertError> {
        for index in 1..items.len() {
            let previous = &items[index - 1].0;
            let block = &items[index].0;
            if block.number != previous.number + 1 || block.parent_hash != previous.hash() {
                return Err(InsertError::new(
                    index,
                    block.hash(),
                    ChainError::NonContiguousChain {
                        index,
                        got: block.parent_hash,
                        expected: previous.hash(),
                    },
                ));
            }
        }

        let _guard = self.chain_mu.lock();
        let mut summary = InsertSummary::default();
        for (index, (block, receipts)) in items.iter().enumerate() {
            if self.interrupt.load(Ordering::Relaxed) {
                debug!(target: "chain", "receipt-chain insert interrupted");
                break;
            }
            let hash = block.hash();
            let fail = |kind: ChainError| InsertError::new(index, hash, kind);

            if !self.header_chain.has_header(&hash).map_err(|e| fail(e.into()))? {
                return Err(fail(ChainError::MissingHeader { hash }));
            }
            if self.has_block(&hash) {
                summary.ignored += 1;
                continue;
            }

            let tx_root = emerald_primitives::proofs::calculate_transaction_root(&block.body);
            if tx_root != block.transactions_root {
                return Err(fail(
                    ConsensusError::TransactionRootMismatch(
                        (tx_root, block.transactions_root).into(),
                    )
                    .into(),
                ));
            }
            let with_bloom: Vec<_> =
                receipts.iter().map(|receipt| receipt.clone().with_bloom()).collect();
            let receipts_root = emerald_primitives::proofs::calculate_receipt_root(&with_bloom);
            if receipts_root != block.receipts_root {
                return Err(fail(
                    ConsensusError::ReceiptsRootMismatch(
                        (receipts_root, block.receipts_root).into(),
                    )
                    .into(),
                ));
            }

            let mut batch = Batch::new();
            accessors::write_body(&mut batch, block.number, &hash, &block.to_body());
            accessors::write_receipts(&mut batch, block.number, &hash, receipts);

            let canonical = accessors::read_canonical_hash(&*self.store, block.number)
                .map_err(|e| fail(e.into()))? ==
                Some(hash);
            if canonical {
                accessors::write_tx_lookups(&mut batch, block);
                if self.config.atxi {
                    self.write_block_atxi(&mut batch, block);
                }
            }

            // ratchet the fast head forward by total difficulty
            let block_td =
                self.header_chain.td(&hash).map_err(|e| fail(e.into()))?.unwrap_or_default();
            let fast_td = {
                let fast_hash = self.heads.read().current_fast.hash();
                self.header_chain.td(&fast_hash).map_err(|e| fail(e.into()))?.unwrap_or_default()
            };
            let advances = canonical && block_td > fast_td;
            if advances {
                accessors::write_head_fast_hash(&mut batch, &hash);
            }

            self.store.write_batch(batch).map_err(|e| fail(e.into()))?;
            self.block_cache.lock().insert(hash, block.clone());
            if advances {
                self.heads.write().current_fast = block.header.clone();
            }
            summary.inserted += 1;
        }

        debug!(
            target: "chain",
            inserted = summary.inserted,
            ignored = summary.ignored,
            "attached receipt chain"
        );
        Ok(summary)
    }

    // --- future blocks ------------------------------------------------------

    fn queue_future(&self, block: &SealedBlock) -> Result<(), ChainError> {
        let now = unix_now();
        if block.timestamp > U256::from(now + self.config.future_horizon_secs) {
            return Err(ConsensusError::BlockFuture { timestamp: block.timestamp, now }.into());
        }
        trace!(target: "chain", number = block.number, hash = %block.hash(), "queued future block");
        self.future_blocks.lock().insert(block.hash(), block.clone());
        Ok(())
    }

    /// Drains parked future blocks whose parent is now known, in ascending
    /// number order. Called by the periodic tick.
    pub fn process_future_blocks(&self) {
        let mut parked: Vec<SealedBlock> = {
            let mut cache = self.future_blocks.lock();
            cache.iter().map(|(_, block)| block.clone()).collect()
        };
        if parked.is_empty() {
            return;
        }
        parked.sort_by_key(|block| block.number);

        for block in parked {
            if self.has_block(&block.parent_hash) {
                self.future_blocks.lock().remove(&block.hash());
                if let Err(err) = self.insert_chain(vec![block]) {
                    debug!(target: "chain", %err, "future block import failed");
                }
            }
        }
    }

    /// Spawns the 5-second future-block tick on the current tokio runtime.
    pub fn spawn_future_block_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let chain = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                if chain.interrupt.load(Ordering::Relaxed) {
                    break;
                }
                chain.process_future_blocks();
            }
        })
    }

    // --- head control -------------------------------------------------------

    /// Rewinds the chain so that `target` is the highest block, purging all
    /// data above it, then reloads a consistent head state.
    pub fn set_head(&self, target: BlockNumber) -> Result<(), ChainError> {
        {
            let _guard = self.chain_mu.lock();
            self.rewind_to(target)?;
        }
        self.load_last_state(false)
    }

    /// Purges everything above `target` and repoints the three heads, the
    /// full and fast heads falling back to genesis when the state at the
    /// target is gone.
    pub(crate) fn rewind_to(&self, target: BlockNumber) -> Result<(), ChainError> {
        info!(target: "chain", block = target, "rewinding chain");
        self.header_chain.set_head(target, |batch, number, hash| {
            accessors::delete_body(batch, number, hash);
            accessors::delete_receipts(batch, number, hash);
        })?;
        self.block_cache.lock().clear();
        self.future_blocks.lock().clear();

        let head_header = self.header_chain.current_header();
        let new_head = if self.state_store.has_state(&head_header.state_root) {
            self.block_by_hash(&head_header.hash())?
        } else {
            None
        };
        let new_head = match new_head {
            Some(block) => block,
            None => self.genesis_block()?,
        };

        let mut batch = Batch::new();
        accessors::write_head_block_hash(&mut batch, &new_head.hash());
        accessors::write_head_fast_hash(&mut batch, &head_header.hash());
        self.store.write_batch(batch)?;

        let mut heads = self.heads.write();
        heads.current_block = new_head;
        heads.current_fast = head_header;
        Ok(())
    }

    // --- lookups ------------------------------------------------------------

    pub(crate) fn has_block(&self, hash: &B256) -> bool {
        if self.block_cache.lock().peek(hash).is_some() {
            return true;
        }
        match accessors::read_header_number(&*self.store, hash) {
            Ok(Some(number)) => self
                .store
                .has(&emerald_db::schema::body_key(number, hash))
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl ChainLookup for BlockChain {
    fn lookup_header(&self, hash: &B256) -> Option<SealedHeader> {
        self.header_chain.header(hash).ok().flatten()
    }

    fn lookup_block(&self, hash: &B256) -> Option<SealedBlock> {
        self.block_by_hash(hash).ok().flatten()
    }

    fn has_block(&self, hash: &B256) -> bool {
        Self::has_block(self, hash)
    }

    fn has_block_and_state(&self, hash: &B256) -> bool {
        let Some(header) = self.lookup_header(hash) else { return false };
        Self::has_block(self, hash) && self.state_store.has_state(&header.state_root)
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
