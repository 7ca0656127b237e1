//! Helpers for building chains in tests: a funded test network, a
//! deterministic chain generator that executes transactions to produce
//! consistent roots, and simple transaction factories.

use crate::{BlockChain, BlockChainConfig};
use emerald_chainspec::{ChainSpec, ChainSpecBuilder, GenesisAccount, GenesisDump};
use emerald_consensus::{calc_difficulty, NoopPow};
use emerald_db::{Batch, KeyValueStore, MemoryStore};
use emerald_executor::TransferExecutor;
use emerald_primitives::{
    keccak256, logs_bloom, proofs, sign_transaction, Address, Bytes, Header, Receipt, SealedBlock,
    Transaction, TransactionSigned, TxKind, B256, U256,
};
use secp256k1::{PublicKey, SecretKey, SECP256K1};
use std::{collections::BTreeMap, sync::Arc};

/// Gas price used by generated transactions.
pub const TEST_GAS_PRICE: u64 = 100;

/// The well-known test key.
pub fn test_secret() -> SecretKey {
    SecretKey::from_slice(&[0x42; 32]).expect("static key is valid")
}

/// Address of [`test_secret`].
pub fn test_address() -> Address {
    let public = PublicKey::from_secret_key(SECP256K1, &test_secret());
    let digest = keccak256(&public.serialize_uncompressed()[1..]);
    Address::from_slice(&digest[12..])
}

/// A frontier-rule test network whose genesis funds [`test_address`].
pub fn test_spec() -> Arc<ChainSpec> {
    let mut alloc = BTreeMap::new();
    alloc.insert(
        test_address(),
        GenesisAccount {
            balance: U256::from(1_000_000_000_000_000_000_000u128),
            code: None,
            storage: None,
        },
    );
    let dump = GenesisDump {
        gas_limit: U256::from(4_000_000u64),
        difficulty: U256::from(131_072u64),
        extra_data: Bytes::from_static(b"emerald-test"),
        alloc,
        ..Default::default()
    };
    Arc::new(
        ChainSpecBuilder::new("unittest", 62, dump).with_fork("Frontier", 0, vec![]).build(),
    )
}

/// Opens a fresh in-memory chain over [`test_spec`] with a seeded tiebreak.
pub fn test_chain() -> Arc<BlockChain> {
    test_chain_with(test_spec())
}

/// Opens a fresh in-memory chain over `spec`.
pub fn test_chain_with(spec: Arc<ChainSpec>) -> Arc<BlockChain> {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let config = BlockChainConfig { tiebreak_seed: Some(42), ..Default::default() };
    Arc::new(
        BlockChain::new(store, spec, Arc::new(NoopPow), Arc::new(TransferExecutor), config)
            .expect("test chain opens"),
    )
}

/// Shape of one generated block.
#[derive(Debug, Clone)]
pub struct BlockPlan {
    /// Transactions to include.
    pub txs: Vec<TransactionSigned>,
    /// Seconds past the parent timestamp.
    pub time_offset: u64,
    /// Extra data, handy for forcing distinct hashes on competing branches.
    pub extra: Bytes,
    /// Block beneficiary.
    pub beneficiary: Address,
    /// Uncle headers to include.
    pub ommers: Vec<Header>,
}

impl Default for BlockPlan {
    fn default() -> Self {
        Self {
            txs: Vec::new(),
            time_offset: 13,
            extra: Bytes::new(),
            beneficiary: Address::repeat_byte(0xaa),
            ommers: Vec::new(),
        }
    }
}

/// One generated block with the receipts its execution produced.
#[derive(Debug, Clone)]
pub struct GeneratedBlock {
    /// The sealed block.
    pub block: SealedBlock,
    /// Receipts of its transactions.
    pub receipts: Vec<Receipt>,
}

/// Generates `count` consistent blocks on top of `parent`, executing each
/// plan's transactions so headers carry real roots. The post-state of every
/// generated block is committed to the chain's store so further generation
/// (and later import) can open it.
pub fn generate_chain(
    chain: &BlockChain,
    parent: SealedBlock,
    count: usize,
    mut customize: impl FnMut(usize, &mut BlockPlan),
) -> Vec<GeneratedBlock> {
    let mut generated = Vec::with_capacity(count);
    let mut parent = parent;

    for index in 0..count {
        let mut plan = BlockPlan::default();
        customize(index, &mut plan);

        let number = parent.number + 1;
        let timestamp = parent.timestamp + U256::from(plan.time_offset);
        let difficulty = calc_difficulty(
            chain.spec().difficulty_algorithm(number),
            timestamp,
            parent.header.header(),
        );

        let mut header = Header {
            parent_hash: parent.hash(),
            ommers_hash: proofs::calculate_ommers_hash(&plan.ommers),
            beneficiary: plan.beneficiary,
            transactions_root: proofs::calculate_transaction_root(&plan.txs),
            difficulty,
            number,
            gas_limit: parent.gas_limit,
            timestamp,
            extra_data: plan.extra.clone(),
            ..Default::default()
        };

        let mut state = chain
            .state_store()
            .state_at(parent.state_root)
            .expect("parent state of generated block is available");
        let shell = SealedBlock {
            header: header.clone().seal_slow(),
            body: plan.txs.clone(),
            ommers: plan.ommers.clone(),
        };
        let output =
            chain.processor.process(&shell, &mut state).expect("generated transactions are valid");

        header.gas_used = output.gas_used;
        header.logs_bloom = logs_bloom(output.logs.iter());
        let with_bloom: Vec<_> =
            output.receipts.iter().map(|receipt| receipt.clone().with_bloom()).collect();
        header.receipts_root = proofs::calculate_receipt_root(&with_bloom);
        header.state_root = state.intermediate_root();

        let mut batch = Batch::new();
        state.commit_to(&mut batch).expect("generated state commits");
        chain.store.write_batch(batch).expect("generated state persists");

        let block =
            SealedBlock { header: header.seal_slow(), body: plan.txs, ommers: plan.ommers };
        parent = block.clone();
        generated.push(GeneratedBlock { block, receipts: output.receipts });
    }
    generated
}

/// Unwraps generated blocks into plain sealed blocks.
pub fn blocks_of(generated: &[GeneratedBlock]) -> Vec<SealedBlock> {
    generated.iter().map(|g| g.block.clone()).collect()
}

/// A signed transfer from the test key.
pub fn transfer_tx(nonce: u64, to: Address, value: u64) -> TransactionSigned {
    sign_transaction(
        Transaction {
            nonce,
            gas_price: U256::from(TEST_GAS_PRICE),
            gas_limit: 21_000,
            to: TxKind::Call(to),
            value: U256::from(value),
            input: Bytes::new(),
        },
        &test_secret(),
        None,
    )
}

/// A signed contract creation from the test key.
pub fn create_tx(nonce: u64, init: &'static [u8]) -> TransactionSigned {
    sign_transaction(
        Transaction {
            nonce,
            gas_price: U256::from(TEST_GAS_PRICE),
            gas_limit: 100_000,
            to: TxKind::Create,
            value: U256::ZERO,
            input: Bytes::from_static(init),
        },
        &test_secret(),
        None,
    )
}

/// A transfer signed by an arbitrary key, for multi-sender scenarios.
pub fn transfer_tx_from(
    secret: &SecretKey,
    nonce: u64,
    to: Address,
    value: u64,
) -> TransactionSigned {
    sign_transaction(
        Transaction {
            nonce,
            gas_price: U256::from(TEST_GAS_PRICE),
            gas_limit: 21_000,
            to: TxKind::Call(to),
            value: U256::from(value),
            input: Bytes::new(),
        },
        secret,
        None,
    )
}

/// Address of an arbitrary secret key.
pub fn address_of(secret: &SecretKey) -> Address {
    let public = PublicKey::from_secret_key(SECP256K1, secret);
    let digest = keccak256(&public.serialize_uncompressed()[1..]);
    Address::from_slice(&digest[12..])
}

/// Hash helper for fixtures.
pub fn hash_of(tag: u8) -> B256 {
    B256::repeat_byte(tag)
}
