//! Typed chain event fan-out.
//!
//! All chain events travel over one broadcast channel of the sum type
//! [`ChainNotification`]; subscribers filter for the variants they care
//! about. Ordering from a single producer is preserved; slow subscribers
//! lag and miss events rather than blocking the chain.

use emerald_primitives::{Log, SealedBlock, TransactionSigned, B256};
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 2000;

/// Events emitted by the chain manager.
#[derive(Debug, Clone)]
pub enum ChainNotification {
    /// A block joined the canonical chain.
    Chain {
        /// The inserted block.
        block: Arc<SealedBlock>,
        /// Its hash.
        hash: B256,
        /// Logs the block produced.
        logs: Vec<Log>,
    },
    /// The canonical head moved to this block.
    ChainHead {
        /// The new head.
        block: Arc<SealedBlock>,
    },
    /// A valid block was stored on a side branch.
    ChainSide {
        /// The side block.
        block: Arc<SealedBlock>,
        /// Logs the block produced.
        logs: Vec<Log>,
    },
    /// Summary of one `insert_chain` run.
    ChainInsert {
        /// Blocks written.
        inserted: usize,
        /// Blocks skipped as already known.
        ignored: usize,
        /// Blocks parked in the future-blocks cache.
        queued: usize,
        /// Wall-clock time of the run.
        elapsed: Duration,
    },
    /// Transactions fell out of the canonical chain in a reorg.
    RemovedTransactions {
        /// The removed transactions.
        transactions: Vec<TransactionSigned>,
    },
    /// Logs fell out of the canonical chain in a reorg.
    RemovedLogs {
        /// The removed logs, in their original block order.
        logs: Vec<Log>,
    },
    /// A locally mined block is ready for broadcast.
    NewMinedBlock {
        /// The mined block.
        block: Arc<SealedBlock>,
    },
}

/// Broadcast sender for chain events.
///
/// Sending never blocks and never fails: with no subscribers the event is
/// dropped on the floor.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: broadcast::Sender<ChainNotification>,
}

impl EventSender {
    /// Creates a sender with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emits an event to all current subscribers.
    pub fn notify(&self, event: ChainNotification) {
        let _ = self.sender.send(event);
    }

    /// Opens a new subscription receiving all events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainNotification> {
        self.sender.subscribe()
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
