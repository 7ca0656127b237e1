use crate::{
    apply_block_rewards, BlockExecutionError, GasPool, Message, MessageContext, MessageExecutor,
    MessageOutcome,
};
use emerald_chainspec::{ChainSpec, DifficultyAlgorithm};
use emerald_primitives::{
    constants::{TX_CREATE_GAS, TX_DATA_NONZERO_GAS, TX_DATA_ZERO_GAS, TX_GAS},
    Log, Receipt, ReceiptOutcome, SealedBlock, SignatureError, TransactionSigned,
};
use emerald_state::State;
use std::sync::Arc;
use tracing::trace;

/// Everything `process` produces for one block.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// One receipt per transaction, in order.
    pub receipts: Vec<Receipt>,
    /// All logs of the block with block-scoped fields filled.
    pub logs: Vec<Log>,
    /// Total gas used by the block.
    pub gas_used: u64,
}

/// Executes the transactions of a block against a world state and
/// accumulates rewards.
#[derive(Debug, Clone)]
pub struct StateProcessor {
    spec: Arc<ChainSpec>,
    evm: Arc<dyn MessageExecutor>,
}

impl StateProcessor {
    /// Creates a processor driving `evm`.
    pub fn new(spec: Arc<ChainSpec>, evm: Arc<dyn MessageExecutor>) -> Self {
        Self { spec, evm }
    }

    /// The chain spec this processor runs under.
    pub fn spec(&self) -> &Arc<ChainSpec> {
        &self.spec
    }

    /// Runs every transaction of `block` in order against `state`, then
    /// applies the block rewards.
    ///
    /// The caller validates the produced gas total, receipts and state root
    /// against the header afterwards.
    pub fn process(
        &self,
        block: &SealedBlock,
        state: &mut State,
    ) -> Result<ProcessOutput, BlockExecutionError> {
        let mut gas_pool = GasPool::new(block.gas_limit);
        let mut cumulative_gas_used = 0u64;
        let mut receipts = Vec::with_capacity(block.body.len());
        let mut logs = Vec::new();
        let mut log_index = 0u64;

        let ctx = MessageContext {
            gas_table: self.spec.gas_table(block.number),
            block_number: block.number,
        };

        for (index, tx) in block.body.iter().enumerate() {
            state.set_tx_context(tx.hash(), block.hash(), index as u64);
            let gas_used =
                self.apply_transaction(block, state, &mut gas_pool, &ctx, tx)?;
            cumulative_gas_used += gas_used;

            let mut tx_logs = state.logs_for(&tx.hash());
            for log in &mut tx_logs {
                log.block_number = block.number;
                log.log_index = log_index;
                log_index += 1;
            }

            receipts.push(Receipt {
                // this chain family never schedules the status change, so
                // receipts carry the intermediate root
                outcome: ReceiptOutcome::StateRoot(state.intermediate_root()),
                cumulative_gas_used,
                logs: tx_logs.clone(),
            });
            logs.extend(tx_logs);
            trace!(
                target: "executor",
                tx = %tx.hash(),
                index,
                gas_used,
                cumulative_gas_used,
                "executed transaction"
            );
        }

        apply_block_rewards(&self.spec, state, block.header.header(), &block.ommers)?;
        Ok(ProcessOutput { receipts, logs, gas_used: cumulative_gas_used })
    }

    /// Runs one transaction: scheme checks, gas purchase, message execution,
    /// refunds. Returns the gas the transaction used.
    fn apply_transaction(
        &self,
        block: &SealedBlock,
        state: &mut State,
        gas_pool: &mut GasPool,
        ctx: &MessageContext,
        tx: &TransactionSigned,
    ) -> Result<u64, BlockExecutionError> {
        let signer = self.spec.signer(block.number);
        let sender = signer.recover(tx).map_err(|err| match err {
            SignatureError::ChainIdMismatch { embedded, configured } => {
                BlockExecutionError::InvalidChainId { tx: tx.hash(), embedded, configured }
            }
            SignatureError::UnexpectedProtection => BlockExecutionError::InvalidChainId {
                tx: tx.hash(),
                embedded: tx.chain_id().unwrap_or_default(),
                configured: 0,
            },
            source => BlockExecutionError::SenderRecovery { tx: tx.hash(), source },
        })?;

        let account_nonce = state.nonce(&sender);
        if account_nonce != tx.transaction.nonce {
            return Err(BlockExecutionError::InvalidNonce {
                tx: tx.hash(),
                nonce: (tx.transaction.nonce, account_nonce).into(),
            });
        }

        // buy gas: debit the full purchase up front, take it from the pool
        let gas_cost = tx.transaction.gas_price * emerald_primitives::U256::from(tx.transaction.gas_limit);
        let balance = state.balance(&sender);
        if balance < gas_cost {
            return Err(BlockExecutionError::InsufficientBalanceForGas {
                tx: tx.hash(),
                address: sender,
                have: balance,
                want: gas_cost,
            });
        }
        state.sub_balance(sender, gas_cost)?;
        gas_pool.sub_gas(tx.transaction.gas_limit, tx.hash())?;

        let intrinsic = intrinsic_gas(tx, self.homestead_rules(block.number));
        if tx.transaction.gas_limit < intrinsic {
            return Err(BlockExecutionError::IntrinsicGas {
                tx: tx.hash(),
                gas_limit: tx.transaction.gas_limit,
                required: intrinsic,
            });
        }

        if !tx.is_contract_creation() {
            state.set_nonce(sender, account_nonce + 1);
        }

        let message = Message {
            caller: sender,
            kind: tx.transaction.to,
            value: tx.transaction.value,
            input: tx.transaction.input.clone(),
            gas: tx.transaction.gas_limit - intrinsic,
            gas_price: tx.transaction.gas_price,
        };
        let MessageOutcome { gas_left, failed, .. } =
            self.evm.execute(state, &message, ctx)?;
        if failed {
            trace!(target: "executor", tx = %tx.hash(), "message execution failed");
        }

        // refund counter, capped at half the gas actually used
        let mut gas_left = gas_left;
        let used = tx.transaction.gas_limit - gas_left;
        let refund = state.refund().min(used / 2);
        gas_left += refund;

        state.add_balance(
            sender,
            tx.transaction.gas_price * emerald_primitives::U256::from(gas_left),
        )?;
        gas_pool.add_gas(gas_left);

        let gas_used = tx.transaction.gas_limit - gas_left;
        state.add_balance(
            block.beneficiary,
            tx.transaction.gas_price * emerald_primitives::U256::from(gas_used),
        )?;
        Ok(gas_used)
    }

    /// Homestead transaction rules apply once any non-frontier difficulty
    /// algorithm is configured.
    fn homestead_rules(&self, number: u64) -> bool {
        self.spec.difficulty_algorithm(number) != DifficultyAlgorithm::Frontier
    }
}

/// The gas charged before any execution: the base transaction cost plus
/// per-byte data costs.
fn intrinsic_gas(tx: &TransactionSigned, homestead: bool) -> u64 {
    let base = if tx.is_contract_creation() && homestead { TX_CREATE_GAS } else { TX_GAS };
    let data = &tx.transaction.input;
    let zero_bytes = data.iter().filter(|byte| **byte == 0).count() as u64;
    let nonzero_bytes = data.len() as u64 - zero_bytes;
    base + zero_bytes * TX_DATA_ZERO_GAS + nonzero_bytes * TX_DATA_NONZERO_GAS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransferExecutor;
    use assert_matches::assert_matches;
    use emerald_chainspec::{
        ChainSpecBuilder, DifficultyFeature, Eip155Feature, ForkFeature, GenesisDump,
    };
    use emerald_db::MemoryStore;
    use emerald_primitives::{
        constants::EMPTY_ROOT_HASH, sign_transaction, Address, Bytes, Header, Transaction, TxKind,
        U256,
    };
    use emerald_state::StateStore;
    use secp256k1::SecretKey;

    const GAS_PRICE: u64 = 1_000;

    fn secret() -> SecretKey {
        SecretKey::from_slice(&[0x42; 32]).unwrap()
    }

    fn sender() -> Address {
        let tx = sign_transaction(Transaction::default(), &secret(), None);
        emerald_primitives::Signer::Basic.recover(&tx).unwrap()
    }

    fn spec(chain_id: Option<u64>) -> Arc<ChainSpec> {
        let mut builder = ChainSpecBuilder::new("unittest", 61, GenesisDump::default()).with_fork(
            "Homestead",
            0,
            vec![ForkFeature::Difficulty(DifficultyFeature::Homestead)],
        );
        if let Some(chain_id) = chain_id {
            builder = builder.with_fork(
                "Diehard",
                0,
                vec![ForkFeature::Eip155(Eip155Feature { chain_id })],
            );
        }
        Arc::new(builder.build())
    }

    fn processor(chain_id: Option<u64>) -> StateProcessor {
        StateProcessor::new(spec(chain_id), Arc::new(TransferExecutor))
    }

    fn funded_state(balance: u64) -> State {
        let store = StateStore::new(std::sync::Arc::new(MemoryStore::new()), 0);
        let mut state = store.state_at(EMPTY_ROOT_HASH).unwrap();
        state.add_balance(sender(), U256::from(balance)).unwrap();
        state
    }

    fn block_with(txs: Vec<emerald_primitives::TransactionSigned>) -> SealedBlock {
        SealedBlock {
            header: Header {
                number: 1,
                gas_limit: 1_000_000,
                beneficiary: Address::repeat_byte(0xee),
                ..Default::default()
            }
            .seal_slow(),
            body: txs,
            ommers: Vec::new(),
        }
    }

    fn transfer(nonce: u64, value: u64) -> emerald_primitives::TransactionSigned {
        sign_transaction(
            Transaction {
                nonce,
                gas_price: U256::from(GAS_PRICE),
                gas_limit: 21_000,
                to: TxKind::Call(Address::repeat_byte(0x99)),
                value: U256::from(value),
                input: Bytes::new(),
            },
            &secret(),
            None,
        )
    }

    #[test]
    fn transfers_move_value_and_charge_gas() {
        let processor = processor(None);
        let mut state = funded_state(100_000_000);
        let block = block_with(vec![transfer(0, 500), transfer(1, 300)]);

        let output = processor.process(&block, &mut state).unwrap();
        assert_eq!(output.gas_used, 42_000);
        assert_eq!(output.receipts.len(), 2);
        assert_eq!(output.receipts[0].cumulative_gas_used, 21_000);
        assert_eq!(output.receipts[1].cumulative_gas_used, 42_000);
        assert_matches!(output.receipts[0].outcome, ReceiptOutcome::StateRoot(_));

        assert_eq!(state.balance(&Address::repeat_byte(0x99)), U256::from(800u64));
        assert_eq!(state.nonce(&sender()), 2);
        assert_eq!(
            state.balance(&sender()),
            U256::from(100_000_000u64 - 800 - 42_000 * GAS_PRICE)
        );
        // the winning miner was paid
        assert!(state.balance(&Address::repeat_byte(0xee)) > U256::ZERO);
    }

    #[test]
    fn nonce_gaps_are_rejected() {
        let processor = processor(None);
        let mut state = funded_state(100_000_000);
        let block = block_with(vec![transfer(5, 1)]);
        assert_matches!(
            processor.process(&block, &mut state),
            Err(BlockExecutionError::InvalidNonce { .. })
        );
    }

    #[test]
    fn gas_purchase_needs_funding() {
        let processor = processor(None);
        let mut state = funded_state(1_000);
        let block = block_with(vec![transfer(0, 1)]);
        assert_matches!(
            processor.process(&block, &mut state),
            Err(BlockExecutionError::InsufficientBalanceForGas { .. })
        );
    }

    #[test]
    fn block_gas_pool_is_enforced() {
        let processor = processor(None);
        let mut state = funded_state(100_000_000);
        let mut block = block_with(vec![transfer(0, 1)]);
        block = SealedBlock {
            header: Header { gas_limit: 20_000, ..block.header.header().clone() }.seal_slow(),
            body: block.body,
            ommers: block.ommers,
        };
        assert_matches!(
            processor.process(&block, &mut state),
            Err(BlockExecutionError::GasLimitReached { .. })
        );
    }

    #[test]
    fn intrinsic_gas_is_charged_per_data_byte() {
        let tx = sign_transaction(
            Transaction {
                gas_limit: 60_000,
                input: Bytes::from_static(&[0, 0, 1, 2]),
                to: TxKind::Call(Address::ZERO),
                ..Default::default()
            },
            &secret(),
            None,
        );
        assert_eq!(intrinsic_gas(&tx, true), 21_000 + 2 * 4 + 2 * 68);

        let create = sign_transaction(
            Transaction { gas_limit: 60_000, to: TxKind::Create, ..Default::default() },
            &secret(),
            None,
        );
        assert_eq!(intrinsic_gas(&create, true), 53_000);
        assert_eq!(intrinsic_gas(&create, false), 21_000);
    }

    #[test]
    fn under_provisioned_gas_limit_is_rejected() {
        let processor = processor(None);
        let mut state = funded_state(100_000_000);
        let tx = sign_transaction(
            Transaction {
                gas_price: U256::from(GAS_PRICE),
                gas_limit: 20_999,
                to: TxKind::Call(Address::ZERO),
                ..Default::default()
            },
            &secret(),
            None,
        );
        let block = block_with(vec![tx]);
        assert_matches!(
            processor.process(&block, &mut state),
            Err(BlockExecutionError::IntrinsicGas { .. })
        );
    }

    #[test]
    fn chain_id_mismatches_are_rejected() {
        let processor = processor(Some(61));
        let mut state = funded_state(100_000_000);
        let tx = sign_transaction(
            Transaction {
                gas_price: U256::from(GAS_PRICE),
                gas_limit: 21_000,
                to: TxKind::Call(Address::ZERO),
                ..Default::default()
            },
            &secret(),
            Some(62),
        );
        let block = block_with(vec![tx]);
        assert_matches!(
            processor.process(&block, &mut state),
            Err(BlockExecutionError::InvalidChainId { embedded: 62, configured: 61, .. })
        );
    }

    #[test]
    fn protected_txs_execute_under_their_configured_id() {
        let processor = processor(Some(61));
        let mut state = funded_state(100_000_000);
        let tx = sign_transaction(
            Transaction {
                gas_price: U256::from(GAS_PRICE),
                gas_limit: 21_000,
                to: TxKind::Call(Address::repeat_byte(0x99)),
                value: U256::from(7u64),
                ..Default::default()
            },
            &secret(),
            Some(61),
        );
        let block = block_with(vec![tx]);
        let output = processor.process(&block, &mut state).unwrap();
        assert_eq!(output.gas_used, 21_000);
        assert_eq!(state.balance(&Address::repeat_byte(0x99)), U256::from(7u64));
    }

    #[test]
    fn failed_messages_still_produce_receipts_and_consume_gas() {
        let processor = processor(None);
        // covers the gas purchase but not the transferred value
        let mut state = funded_state(30_000 * GAS_PRICE);
        let tx = sign_transaction(
            Transaction {
                gas_price: U256::from(GAS_PRICE),
                gas_limit: 30_000,
                to: TxKind::Call(Address::repeat_byte(0x99)),
                value: U256::from(u64::MAX),
                ..Default::default()
            },
            &secret(),
            None,
        );
        let block = block_with(vec![tx]);
        let output = processor.process(&block, &mut state).unwrap();
        // the failed message consumed everything it was given
        assert_eq!(output.gas_used, 30_000);
        assert_eq!(output.receipts.len(), 1);
        assert_eq!(state.balance(&Address::repeat_byte(0x99)), U256::ZERO);
    }
}
