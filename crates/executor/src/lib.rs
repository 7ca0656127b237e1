//! Transaction processing for emerald.
//!
//! The [`StateProcessor`] drives every transaction of a block through the
//! message executor, assembles receipts and logs, and accumulates miner and
//! uncle rewards per the configured schedule. The EVM itself is an opaque
//! collaborator behind [`MessageExecutor`].

mod error;
mod evm;
mod gas;
mod processor;
mod rewards;

pub use error::BlockExecutionError;
pub use evm::{create_address, Message, MessageContext, MessageExecutor, MessageOutcome, TransferExecutor};
pub use gas::GasPool;
pub use processor::{ProcessOutput, StateProcessor};
pub use rewards::apply_block_rewards;
