//! Canonical-chain reorganization.
//!
//! When a side branch accumulates more total difficulty than the canonical
//! chain, the two branches are walked back to their common ancestor, the
//! canonical mapping is rewritten onto the new branch, and the transactions
//! and logs of the abandoned branch are unindexed and announced as removed.

use crate::{accessors, BlockChain, ChainError, ChainNotification};
use emerald_db::Batch;
use emerald_primitives::{Log, SealedBlock, TransactionSigned, B256};
use std::{collections::HashSet, sync::Arc};
use tracing::{info, warn};

impl BlockChain {
    /// Rewrites the canonical chain from the current head onto the branch
    /// ending in `new_head`. All store mutations join `batch`; the caller
    /// writes `new_head`'s own canonical entry and head pointers.
    ///
    /// Returns the removal and side-block events to publish once the batch
    /// lands, in their original block order.
    pub(crate) fn reorg(
        &self,
        batch: &mut Batch,
        new_head: &SealedBlock,
    ) -> Result<Vec<ChainNotification>, ChainError> {
        let old_head = self.heads.read().current_block.clone();

        // walk the higher branch down to equal height, then both in lockstep
        // until the common ancestor
        let mut old_chain: Vec<SealedBlock> = Vec::new();
        let mut new_chain: Vec<SealedBlock> = Vec::new();
        let mut old = old_head.clone();
        let mut new = self.fetch_block(&new_head.parent_hash)?;

        while old.number > new.number {
            old_chain.push(old.clone());
            old = self.fetch_block(&old.parent_hash)?;
        }
        while new.number > old.number {
            new_chain.push(new.clone());
            new = self.fetch_block(&new.parent_hash)?;
        }
        while old.hash() != new.hash() {
            old_chain.push(old.clone());
            new_chain.push(new.clone());
            if old.number == 0 || new.number == 0 {
                warn!(target: "chain::reorg", "no common ancestor below genesis");
                return Err(ChainError::MissingHeader { hash: new.parent_hash });
            }
            old = self.fetch_block(&old.parent_hash)?;
            new = self.fetch_block(&new.parent_hash)?;
        }
        let ancestor = old;

        info!(
            target: "chain::reorg",
            ancestor = %ancestor.hash(),
            old_head = %old_head.hash(),
            new_head = %new_head.hash(),
            dropped = old_chain.len(),
            adopted = new_chain.len() + 1,
            "chain reorganization"
        );

        // adopt the new branch: canonical mapping plus transaction indexes,
        // ascending so the final head insert caps a consistent mapping
        for block in new_chain.iter().rev() {
            accessors::write_canonical_hash(batch, block.number, &block.hash());
            accessors::write_tx_lookups(batch, block);
            if self.config.atxi {
                self.write_block_atxi(batch, block);
            }
        }

        // transactions surviving into the new branch keep their entries
        let kept: HashSet<B256> = new_chain
            .iter()
            .flat_map(|block| block.body.iter())
            .chain(new_head.body.iter())
            .map(|tx| tx.hash())
            .collect();

        let mut removed_txs: Vec<TransactionSigned> = Vec::new();
        let mut removed_logs: Vec<Log> = Vec::new();
        let mut side_events = Vec::new();

        for block in old_chain.iter().rev() {
            let logs = self.block_logs(block)?;
            for tx in &block.body {
                if kept.contains(&tx.hash()) {
                    continue;
                }
                accessors::delete_tx_lookup(batch, &tx.hash());
                if self.config.atxi {
                    self.remove_tx_atxi(batch, block, tx)?;
                }
                removed_txs.push(tx.clone());
            }
            removed_logs.extend(logs.iter().cloned());
            side_events.push(ChainNotification::ChainSide {
                block: Arc::new(block.clone()),
                logs,
            });
        }

        let mut events = Vec::new();
        if !removed_txs.is_empty() {
            events.push(ChainNotification::RemovedTransactions { transactions: removed_txs });
        }
        if !removed_logs.is_empty() {
            events.push(ChainNotification::RemovedLogs { logs: removed_logs });
        }
        events.extend(side_events);
        Ok(events)
    }

    fn fetch_block(&self, hash: &B256) -> Result<SealedBlock, ChainError> {
        self.block_by_hash(hash)?.ok_or(ChainError::MissingBody { hash: *hash })
    }

    /// Reassembles the logs of a stored block from its receipts, refilling
    /// the block-scoped fields the consensus encoding drops.
    pub(crate) fn block_logs(&self, block: &SealedBlock) -> Result<Vec<Log>, ChainError> {
        let receipts = accessors::read_receipts(&*self.store, block.number, &block.hash())?
            .unwrap_or_default();
        let mut logs = Vec::new();
        let mut log_index = 0u64;
        for (tx_index, receipt) in receipts.into_iter().enumerate() {
            let tx_hash = block.body.get(tx_index).map(|tx| tx.hash()).unwrap_or_default();
            for mut log in receipt.logs {
                log.block_hash = block.hash();
                log.block_number = block.number;
                log.transaction_hash = tx_hash;
                log.transaction_index = tx_index as u64;
                log.log_index = log_index;
                log_index += 1;
                logs.push(log);
            }
        }
        Ok(logs)
    }
}
