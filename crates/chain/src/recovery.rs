//! Startup recovery and chain health probing.
//!
//! After an unclean shutdown the persisted head pointers may disagree with
//! the data actually on disk. Loading the last state verifies the three
//! heads; on any inconsistency a forward probe walks the canonical chain
//! from genesis, finds the highest internally consistent block, and the
//! chain is rewound onto it.

use crate::{accessors, BlockChain, ChainError};
use emerald_primitives::{proofs, BlockNumber, SealedBlock, SealedHeader, B256};
use rand::Rng;
use tracing::{info, warn};

/// Coarse probe stride used by recovery before honing in.
const RECOVERY_INCREMENT: u64 = 100;

/// How far beyond the recorded head header stray canonical data is probed.
const HEAD_PROBE_WINDOW: u64 = 2048;

/// Which head a block is being checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeadKind {
    /// A block whose state was materialized by execution.
    Full,
    /// A fast-synced block: body and receipts present, state trusted from a
    /// later snapshot.
    Fast,
}

impl BlockChain {
    /// Reads and verifies the persisted head pointers, installing them as
    /// the in-memory heads.
    ///
    /// On inconsistency: with `dryrun` the error is returned and nothing is
    /// mutated; otherwise recovery probes the chain, rewinds onto the
    /// highest consistent block and retries, falling back to genesis if the
    /// damage runs deeper.
    pub fn load_last_state(&self, dryrun: bool) -> Result<(), ChainError> {
        match self.verify_heads() {
            Ok(heads) => {
                self.install_heads(heads);
                Ok(())
            }
            Err(err) if dryrun => Err(err),
            Err(err) => {
                warn!(target: "chain", %err, "head state inconsistent, probing chain");
                let checkpoint = self.recover_chain(0, RECOVERY_INCREMENT);
                info!(target: "chain", checkpoint, "recovery found highest consistent block");
                {
                    let _guard = self.chain_mu.lock();
                    self.rewind_to(checkpoint)?;
                }

                match self.verify_heads() {
                    Ok(heads) => {
                        self.install_heads(heads);
                        Ok(())
                    }
                    Err(err) => {
                        warn!(target: "chain", %err, "recovery insufficient, resetting to genesis");
                        {
                            let _guard = self.chain_mu.lock();
                            self.rewind_to(0)?;
                        }
                        let heads = self.verify_heads()?;
                        self.install_heads(heads);
                        Ok(())
                    }
                }
            }
        }
    }

    fn install_heads(&self, (block, header, fast): (SealedBlock, SealedHeader, SealedHeader)) {
        info!(
            target: "chain",
            block = block.number,
            header = header.number,
            fast = fast.number,
            "loaded chain heads"
        );
        self.header_chain.set_current_header(header);
        let mut heads = self.heads.write();
        heads.current_block = block;
        heads.current_fast = fast;
    }

    fn verify_heads(&self) -> Result<(SealedBlock, SealedHeader, SealedHeader), ChainError> {
        let head_hash = accessors::read_head_block_hash(&*self.store)?
            .ok_or(ChainError::MissingHeadPointer { name: "LastBlock" })?;
        let head_block = self
            .block_by_hash(&head_hash)?
            .ok_or(ChainError::MissingBody { hash: head_hash })?;
        self.check_block_integrity(&head_block, HeadKind::Full)?;

        let header_hash = accessors::read_head_header_hash(&*self.store)?
            .ok_or(ChainError::MissingHeadPointer { name: "LastHeader" })?;
        let head_header = self
            .header_chain
            .header(&header_hash)?
            .ok_or(ChainError::MissingHeader { hash: header_hash })?;

        let fast_hash = accessors::read_head_fast_hash(&*self.store)?
            .ok_or(ChainError::MissingHeadPointer { name: "LastFast" })?;
        let fast_header = self
            .header_chain
            .header(&fast_hash)?
            .ok_or(ChainError::MissingHeader { hash: fast_hash })?;
        if fast_hash != head_hash {
            let fast_block = self
                .block_by_hash(&fast_hash)?
                .ok_or(ChainError::MissingBody { hash: fast_hash })?;
            self.check_block_integrity(&fast_block, HeadKind::Fast)?;
        }

        if head_header.number < fast_header.number || fast_header.number < head_block.number {
            return Err(ChainError::HeadsOutOfOrder {
                header: head_header.number,
                fast: fast_header.number,
                block: head_block.number,
            });
        }

        // a regressed head pointer would make leftover data look like the
        // chain continues past the head
        for offset in 1..=HEAD_PROBE_WINDOW {
            let number = head_header.number + offset;
            if accessors::read_canonical_hash(&*self.store, number)?.is_some() {
                return Err(ChainError::DataBeyondHead {
                    found: number,
                    head: head_header.number,
                });
            }
        }

        Ok((head_block, head_header, fast_header))
    }

    /// Structural sanity of one stored block: roots, checkpoint lists,
    /// parent linkage, total-difficulty arithmetic, and the state-presence
    /// rules that differ between full and fast blocks.
    pub(crate) fn check_block_integrity(
        &self,
        block: &SealedBlock,
        kind: HeadKind,
    ) -> Result<(), ChainError> {
        let hash = block.hash();
        if hash == B256::ZERO {
            return Err(ChainError::MissingHeader { hash });
        }

        let ommers_hash = proofs::calculate_ommers_hash(&block.ommers);
        if ommers_hash != block.ommers_hash {
            return Err(emerald_consensus::ConsensusError::OmmersRootMismatch(
                (ommers_hash, block.ommers_hash).into(),
            )
            .into());
        }
        let tx_root = proofs::calculate_transaction_root(&block.body);
        if tx_root != block.transactions_root {
            return Err(emerald_consensus::ConsensusError::TransactionRootMismatch(
                (tx_root, block.transactions_root).into(),
            )
            .into());
        }
        self.spec
            .header_check(&block.header)
            .map_err(emerald_consensus::ConsensusError::from)?;

        let td = accessors::read_td(&*self.store, &hash)?
            .ok_or(ChainError::MissingTotalDifficulty { hash })?;
        if td.is_zero() {
            return Err(ChainError::ZeroTotalDifficulty { hash });
        }

        if block.number == 0 {
            return Ok(());
        }
        let parent = accessors::read_header(&*self.store, &block.parent_hash)?
            .ok_or(ChainError::MissingHeader { hash: block.parent_hash })?;
        let parent_td = accessors::read_td(&*self.store, &block.parent_hash)?
            .ok_or(ChainError::MissingTotalDifficulty { hash: block.parent_hash })?;
        let expected = parent_td + block.difficulty;
        if td != expected {
            return Err(ChainError::TotalDifficultyMismatch {
                hash,
                td: (td, expected).into(),
            });
        }

        match kind {
            HeadKind::Full => {
                // the parent must carry state, unless the grandparent lacks
                // it too, which marks the point full sync took over from
                // fast sync
                if !self.state_store.has_state(&parent.state_root) {
                    let grandparent_has_state = match accessors::read_header(
                        &*self.store,
                        &parent.parent_hash,
                    )? {
                        Some(grandparent) => self.state_store.has_state(&grandparent.state_root),
                        None => false,
                    };
                    if grandparent_has_state || parent.number == 0 {
                        return Err(ChainError::ParentStateMissing { hash });
                    }
                }
            }
            HeadKind::Fast => {
                // a fast block ahead of the full head must sit in the
                // stateless region
                if self.state_store.has_state(&parent.state_root) {
                    return Err(ChainError::FastBlockHasState { hash });
                }
            }
        }
        Ok(())
    }

    /// Walks the canonical chain forward from `from` (assumed consistent)
    /// and returns the highest block that passes the integrity checks.
    ///
    /// With `increment > 1` the stride is randomized to avoid deterministic
    /// scan patterns; a failed coarse step recurses with unit stride a
    /// little before the failure, so the jitter never changes the returned
    /// checkpoint.
    pub(crate) fn recover_chain(&self, from: BlockNumber, increment: u64) -> BlockNumber {
        let mut checkpoint = from;
        let mut cursor = from;
        loop {
            let stride =
                if increment > 1 { self.rng.lock().gen_range(1..=increment * 2) } else { 1 };
            let next = cursor.saturating_add(stride);
            if self.canonical_probe(next) {
                checkpoint = next;
                cursor = next;
                continue;
            }
            if increment > 1 {
                let mut fine_from = next.saturating_sub(increment);
                if fine_from <= checkpoint || !self.canonical_probe(fine_from) {
                    fine_from = checkpoint;
                }
                let refined = self.recover_chain(fine_from, 1);
                return refined.max(checkpoint);
            }
            return checkpoint;
        }
    }

    fn canonical_probe(&self, number: BlockNumber) -> bool {
        let Ok(Some(hash)) = accessors::read_canonical_hash(&*self.store, number) else {
            return false;
        };
        let Ok(Some(block)) = self.block_by_hash(&hash) else { return false };
        self.check_block_integrity(&block, HeadKind::Full).is_ok()
    }
}
