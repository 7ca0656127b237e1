//! Consensus constants shared across the core.

use alloy_primitives::{b256, B256, U256};

/// Keccak-256 of the empty byte string. The code hash of accounts without
/// code.
pub const KECCAK_EMPTY: B256 =
    b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// Keccak-256 of the RLP encoding of an empty list. The ommers hash of
/// blocks without uncles.
pub const EMPTY_OMMERS_HASH: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");

/// Root of an empty Merkle-Patricia trie.
pub const EMPTY_ROOT_HASH: B256 = alloy_trie::EMPTY_ROOT_HASH;

/// Lower clamp applied by every difficulty formula (2^17).
pub const MINIMUM_DIFFICULTY: U256 = U256::from_limbs([131_072, 0, 0, 0]);

/// Divisor deriving the per-block difficulty adjustment step.
pub const DIFFICULTY_BOUND_DIVISOR: U256 = U256::from_limbs([2048, 0, 0, 0]);

/// Block-number period of the difficulty bomb exponent.
pub const EXP_DIFF_PERIOD: u64 = 100_000;

/// Divisor bounding the per-block gas-limit drift.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Smallest gas limit a header may carry.
pub const MINIMUM_GAS_LIMIT: u64 = 5000;

/// Default cap on header extra-data length.
pub const MAXIMUM_EXTRA_DATA_SIZE: usize = 32;

/// Maximum number of uncles a block may include.
pub const MAX_UNCLES: usize = 2;

/// Depth of the ancestor window uncles are checked against.
pub const UNCLE_WINDOW: u64 = 7;

/// Base miner reward, 5 ether in wei. Era schedules scale it down.
pub const BASE_BLOCK_REWARD: U256 = U256::from_limbs([5_000_000_000_000_000_000, 0, 0, 0]);

/// Gas charged for every transaction.
pub const TX_GAS: u64 = 21_000;

/// Gas charged for a contract-creating transaction from Homestead on.
pub const TX_CREATE_GAS: u64 = 53_000;

/// Per-byte gas for zero bytes of transaction data.
pub const TX_DATA_ZERO_GAS: u64 = 4;

/// Per-byte gas for non-zero bytes of transaction data.
pub const TX_DATA_NONZERO_GAS: u64 = 68;
