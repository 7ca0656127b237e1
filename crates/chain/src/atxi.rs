//! Address-transaction index (ATXI).
//!
//! A secondary index mapping each address to the transactions that involve
//! it. Every canonical transaction writes two fixed-layout keys, one under
//! the sender and one under the recipient (the zero address for contract
//! creations); values are empty. A persistent bookmark lets an interrupted
//! index build resume at the last completed batch.

use crate::{accessors, BlockChain, ChainError};
use emerald_db::{schema, Batch, StoreError};
use emerald_primitives::{
    Address, BlockNumber, SealedBlock, TransactionSigned, TxKind, B256,
};
use std::{collections::HashSet, sync::atomic::Ordering};
use tracing::{debug, warn};

/// Which side of a transaction an index entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The address is the sender.
    From,
    /// The address is the recipient.
    To,
}

impl Direction {
    fn byte(self) -> u8 {
        match self {
            Self::From => schema::ATX_DIR_FROM,
            Self::To => schema::ATX_DIR_TO,
        }
    }
}

/// What kind of transaction an index entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A standard call.
    Standard,
    /// A contract creation.
    Create,
}

impl EntryKind {
    fn byte(self) -> u8 {
        match self {
            Self::Standard => schema::ATX_KIND_STANDARD,
            Self::Create => schema::ATX_KIND_CREATE,
        }
    }
}

/// Query parameters for [`BlockChain::address_transactions`].
#[derive(Debug, Clone, Copy)]
pub struct AddrTxQuery {
    /// Inclusive block range to search.
    pub block_range: (BlockNumber, BlockNumber),
    /// Restrict to one direction; `None` matches both.
    pub direction: Option<Direction>,
    /// Restrict to one kind; `None` matches both.
    pub kind: Option<EntryKind>,
    /// First result index of the page.
    pub page_start: usize,
    /// One past the last result index; `None` runs to the end.
    pub page_end: Option<usize>,
    /// Sort oldest block first instead of the default newest first.
    pub oldest_first: bool,
}

impl Default for AddrTxQuery {
    fn default() -> Self {
        Self {
            block_range: (0, BlockNumber::MAX),
            direction: None,
            kind: None,
            page_start: 0,
            page_end: None,
            oldest_first: false,
        }
    }
}

fn tx_parties(tx: &TransactionSigned) -> (EntryKind, Address) {
    match tx.transaction.to {
        TxKind::Call(to) => (EntryKind::Standard, to),
        TxKind::Create => (EntryKind::Create, Address::ZERO),
    }
}

impl BlockChain {
    /// Records both index keys for every transaction of `block`.
    pub(crate) fn write_block_atxi(&self, batch: &mut Batch, block: &SealedBlock) {
        let signer = self.spec.signer(block.number);
        for tx in &block.body {
            let sender = match signer.recover(tx) {
                Ok(sender) => sender,
                Err(err) => {
                    warn!(target: "atxi", tx = %tx.hash(), %err, "skipping unindexable transaction");
                    continue;
                }
            };
            let (kind, recipient) = tx_parties(tx);
            batch.put(
                schema::atx_key(
                    &sender,
                    block.number,
                    Direction::From.byte(),
                    kind.byte(),
                    &tx.hash(),
                ),
                Vec::new(),
            );
            batch.put(
                schema::atx_key(
                    &recipient,
                    block.number,
                    Direction::To.byte(),
                    kind.byte(),
                    &tx.hash(),
                ),
                Vec::new(),
            );
        }
    }

    /// Deletes the index entries of one transaction under both of its
    /// parties, by prefix scan and suffix match.
    pub(crate) fn remove_tx_atxi(
        &self,
        batch: &mut Batch,
        block: &SealedBlock,
        tx: &TransactionSigned,
    ) -> Result<(), ChainError> {
        let signer = self.spec.signer(block.number);
        let (_, recipient) = tx_parties(tx);
        let mut parties = vec![recipient];
        if let Ok(sender) = signer.recover(tx) {
            parties.push(sender);
        }

        for party in parties {
            for (key, _) in self.store.iter_with_prefix(&schema::atx_address_prefix(&party))? {
                if let Some((_, _, _, _, tx_hash)) = schema::parse_atx_key(&key) {
                    if tx_hash == tx.hash() {
                        batch.delete(key);
                    }
                }
            }
        }
        Ok(())
    }

    /// The highest block whose index entries are known complete.
    pub fn atxi_bookmark(&self) -> Result<Option<BlockNumber>, StoreError> {
        accessors::read_atxi_bookmark(&*self.store)
    }

    /// Builds the index over canonical blocks `[start, stop]` in batches of
    /// `step` blocks, one atomic batch per step.
    ///
    /// With `start == None` the build resumes after the persisted bookmark
    /// and keeps the bookmark current after every batch, so an interrupted
    /// build loses at most one step. Returns the highest indexed block.
    pub fn build_atxi(
        &self,
        start: Option<BlockNumber>,
        stop: Option<BlockNumber>,
        step: u64,
    ) -> Result<BlockNumber, ChainError> {
        let step = step.max(1);
        let auto = start.is_none();
        let mut from = match start {
            Some(start) => start,
            None => self.atxi_bookmark()?.map(|mark| mark + 1).unwrap_or(0),
        };
        let stop = match stop {
            Some(stop) => stop,
            None => self.current_block().number,
        };

        let mut highest = from.saturating_sub(1);
        while from <= stop {
            if self.interrupt.load(Ordering::Relaxed) {
                debug!(target: "atxi", highest, "index build interrupted at batch boundary");
                break;
            }
            let upper = (from + step - 1).min(stop);
            let mut batch = Batch::new();
            for number in from..=upper {
                let block = self
                    .block_by_number(number)?
                    .ok_or(ChainError::MissingCanonicalHash { number })?;
                self.write_block_atxi(&mut batch, &block);
            }
            if auto {
                accessors::write_atxi_bookmark(&mut batch, upper);
            }
            self.store.write_batch(batch)?;
            highest = upper;
            from = upper + 1;
        }

        debug!(target: "atxi", highest, "index build finished");
        Ok(highest)
    }

    /// Transactions involving `address`, filtered, sorted by block number
    /// (newest first unless `oldest_first`), deduplicated and paged.
    pub fn address_transactions(
        &self,
        address: &Address,
        query: AddrTxQuery,
    ) -> Result<Vec<B256>, ChainError> {
        let (lo, hi) = query.block_range;
        let mut hits: Vec<(BlockNumber, B256)> = Vec::new();
        for (key, _) in self.store.iter_with_prefix(&schema::atx_address_prefix(address))? {
            let Some((_, number, dir, kind, tx_hash)) = schema::parse_atx_key(&key) else {
                continue;
            };
            if number < lo || number > hi {
                continue;
            }
            if let Some(direction) = query.direction {
                if dir != direction.byte() {
                    continue;
                }
            }
            if let Some(want) = query.kind {
                if kind != want.byte() {
                    continue;
                }
            }
            hits.push((number, tx_hash));
        }

        if query.oldest_first {
            hits.sort_by_key(|(number, _)| *number);
        } else {
            hits.sort_by_key(|(number, _)| std::cmp::Reverse(*number));
        }

        let mut seen = HashSet::new();
        let ordered: Vec<B256> = hits
            .into_iter()
            .filter_map(|(_, tx_hash)| seen.insert(tx_hash).then_some(tx_hash))
            .collect();

        let start = query.page_start.min(ordered.len());
        let end = query.page_end.unwrap_or(ordered.len()).min(ordered.len()).max(start);
        Ok(ordered[start..end].to_vec())
    }
}
