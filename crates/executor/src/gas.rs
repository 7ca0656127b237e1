use crate::BlockExecutionError;
use emerald_primitives::B256;

/// Tracks the gas still available to the transactions of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPool(u64);

impl GasPool {
    /// Opens a pool holding the block gas limit.
    pub const fn new(limit: u64) -> Self {
        Self(limit)
    }

    /// Returns unused gas to the pool.
    pub fn add_gas(&mut self, amount: u64) {
        self.0 = self.0.saturating_add(amount);
    }

    /// Takes `amount` for transaction `tx`, failing when the pool cannot
    /// cover it.
    pub fn sub_gas(&mut self, amount: u64, tx: B256) -> Result<(), BlockExecutionError> {
        if self.0 < amount {
            return Err(BlockExecutionError::GasLimitReached { tx, pool: self.0, want: amount });
        }
        self.0 -= amount;
        Ok(())
    }

    /// Gas remaining in the pool.
    pub fn gas(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn pool_enforces_its_limit() {
        let mut pool = GasPool::new(100_000);
        pool.sub_gas(60_000, B256::ZERO).unwrap();
        assert_eq!(pool.gas(), 40_000);

        assert_matches!(
            pool.sub_gas(40_001, B256::ZERO),
            Err(BlockExecutionError::GasLimitReached { pool: 40_000, want: 40_001, .. })
        );

        pool.add_gas(10_000);
        pool.sub_gas(50_000, B256::ZERO).unwrap();
        assert_eq!(pool.gas(), 0);
    }
}
