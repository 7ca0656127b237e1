use emerald_chainspec::GasTable;
use emerald_primitives::{keccak256, Address, BlockNumber, Bytes, TxKind, U256};
use emerald_state::{State, StateError};
use alloy_rlp::Encodable;

/// One message to execute: the per-transaction view the interpreter sees.
#[derive(Debug, Clone)]
pub struct Message {
    /// Sender of the message.
    pub caller: Address,
    /// Call target or contract creation.
    pub kind: TxKind,
    /// Wei transferred with the message.
    pub value: U256,
    /// Call data or init code.
    pub input: Bytes,
    /// Gas available after the intrinsic cost.
    pub gas: u64,
    /// Price paid per unit of gas.
    pub gas_price: U256,
}

/// Per-block execution context handed to the interpreter.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext {
    /// Gas schedule in force for the block.
    pub gas_table: GasTable,
    /// Height of the block being executed.
    pub block_number: BlockNumber,
}

/// Result of executing one message.
#[derive(Debug, Clone)]
pub struct MessageOutcome {
    /// Return data of the call.
    pub output: Bytes,
    /// Gas left over after execution.
    pub gas_left: u64,
    /// Whether execution failed. Failed messages keep their state reverted
    /// by the executor; the transaction as a whole still lands on chain.
    pub failed: bool,
}

/// The opaque EVM collaborator.
///
/// Executes exactly one message against the given state, snapshotting and
/// reverting internally on failure, and reports gas plus the failure flag.
/// The chain core never interprets bytecode itself.
pub trait MessageExecutor: Send + Sync + std::fmt::Debug {
    /// Executes `message` against `state`.
    fn execute(
        &self,
        state: &mut State,
        message: &Message,
        ctx: &MessageContext,
    ) -> Result<MessageOutcome, StateError>;
}

/// Address of a contract created by `sender` at `nonce`.
pub fn create_address(sender: Address, nonce: u64) -> Address {
    let mut buf = Vec::new();
    let payload_length = sender.length() + nonce.length();
    alloy_rlp::Header { list: true, payload_length }.encode(&mut buf);
    sender.encode(&mut buf);
    nonce.encode(&mut buf);
    Address::from_slice(&keccak256(&buf)[12..])
}

/// A minimal executor covering plain value transfers and code-less
/// contract creation.
///
/// This stands in for the interpreter in tests and tooling: value moves,
/// accounts come into existence, created contracts store their init code
/// verbatim, and no gas beyond the intrinsic cost is consumed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferExecutor;

impl MessageExecutor for TransferExecutor {
    fn execute(
        &self,
        state: &mut State,
        message: &Message,
        _ctx: &MessageContext,
    ) -> Result<MessageOutcome, StateError> {
        let snapshot = state.snapshot();
        let outcome = match message.kind {
            TxKind::Call(to) => transfer(state, message.caller, to, message.value),
            TxKind::Create => {
                let nonce = state.nonce(&message.caller);
                state.set_nonce(message.caller, nonce + 1);
                let contract = create_address(message.caller, nonce);
                state.create_account(contract);
                match transfer(state, message.caller, contract, message.value) {
                    Ok(()) => {
                        state.set_code(contract, message.input.clone());
                        Ok(())
                    }
                    err => err,
                }
            }
        };

        match outcome {
            Ok(()) => Ok(MessageOutcome {
                output: Bytes::new(),
                gas_left: message.gas,
                failed: false,
            }),
            Err(StateError::InsufficientBalance { .. }) => {
                state.revert_to(snapshot);
                // a failed message consumes everything it was given
                Ok(MessageOutcome { output: Bytes::new(), gas_left: 0, failed: true })
            }
            Err(other) => Err(other),
        }
    }
}

fn transfer(state: &mut State, from: Address, to: Address, value: U256) -> Result<(), StateError> {
    state.sub_balance(from, value)?;
    state.add_balance(to, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use emerald_db::MemoryStore;
    use emerald_primitives::constants::EMPTY_ROOT_HASH;
    use emerald_state::StateStore;
    use std::sync::Arc;

    fn ctx() -> MessageContext {
        MessageContext { gas_table: GasTable::homestead(), block_number: 1 }
    }

    fn state_with(address: Address, balance: u64) -> State {
        let store = StateStore::new(Arc::new(MemoryStore::new()), 0);
        let mut state = store.state_at(EMPTY_ROOT_HASH).unwrap();
        state.add_balance(address, U256::from(balance)).unwrap();
        state
    }

    #[test]
    fn transfer_moves_value_and_keeps_gas() {
        let caller = Address::repeat_byte(1);
        let to = Address::repeat_byte(2);
        let mut state = state_with(caller, 100);

        let outcome = TransferExecutor
            .execute(
                &mut state,
                &Message {
                    caller,
                    kind: TxKind::Call(to),
                    value: U256::from(30u64),
                    input: Bytes::new(),
                    gas: 50_000,
                    gas_price: U256::from(1u64),
                },
                &ctx(),
            )
            .unwrap();

        assert!(!outcome.failed);
        assert_eq!(outcome.gas_left, 50_000);
        assert_eq!(state.balance(&caller), U256::from(70u64));
        assert_eq!(state.balance(&to), U256::from(30u64));
    }

    #[test]
    fn insufficient_balance_fails_and_reverts() {
        let caller = Address::repeat_byte(1);
        let to = Address::repeat_byte(2);
        let mut state = state_with(caller, 10);

        let outcome = TransferExecutor
            .execute(
                &mut state,
                &Message {
                    caller,
                    kind: TxKind::Call(to),
                    value: U256::from(30u64),
                    input: Bytes::new(),
                    gas: 50_000,
                    gas_price: U256::from(1u64),
                },
                &ctx(),
            )
            .unwrap();

        assert!(outcome.failed);
        assert_eq!(outcome.gas_left, 0);
        assert_eq!(state.balance(&caller), U256::from(10u64));
        assert!(!state.exists(&to));
    }

    #[test]
    fn creation_derives_the_contract_address_from_caller_nonce() {
        let caller = Address::repeat_byte(1);
        let mut state = state_with(caller, 100);
        state.set_nonce(caller, 4);

        let expected = create_address(caller, 4);
        let outcome = TransferExecutor
            .execute(
                &mut state,
                &Message {
                    caller,
                    kind: TxKind::Create,
                    value: U256::from(5u64),
                    input: Bytes::from_static(&[0xde, 0xad]),
                    gas: 60_000,
                    gas_price: U256::from(1u64),
                },
                &ctx(),
            )
            .unwrap();

        assert!(!outcome.failed);
        assert_eq!(state.nonce(&caller), 5);
        assert_eq!(state.balance(&expected), U256::from(5u64));
        assert_eq!(state.code(&expected).unwrap(), Bytes::from_static(&[0xde, 0xad]));
    }

    #[test]
    fn create_addresses_differ_per_nonce() {
        let sender = Address::repeat_byte(7);
        assert_ne!(create_address(sender, 0), create_address(sender, 1));
        assert_ne!(create_address(sender, 0), create_address(Address::repeat_byte(8), 0));
    }
}
