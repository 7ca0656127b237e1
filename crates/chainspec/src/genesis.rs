use emerald_primitives::{
    constants::{EMPTY_OMMERS_HASH, EMPTY_ROOT_HASH},
    Address, Bytes, Header, B256, B64, U256,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The genesis dump of a chain configuration: the fields of block zero plus
/// the initial account allocation.
///
/// Quantity fields accept both 0x-prefixed hex and decimal strings; alloc
/// balances are decimal strings in the canonical documents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenesisDump {
    /// Proof-of-work nonce of the genesis header.
    #[serde(default)]
    pub nonce: B64,
    /// Genesis timestamp.
    #[serde(default)]
    pub timestamp: U256,
    /// Parent hash, zero on every real chain.
    #[serde(rename = "parentHash", default)]
    pub parent_hash: B256,
    /// Extra data of the genesis header.
    #[serde(rename = "extraData", default)]
    pub extra_data: Bytes,
    /// Gas limit of the genesis header.
    #[serde(rename = "gasLimit", default)]
    pub gas_limit: U256,
    /// Difficulty of the genesis header, which is also its total difficulty.
    #[serde(default)]
    pub difficulty: U256,
    /// Proof-of-work mix digest.
    #[serde(default)]
    pub mixhash: B256,
    /// Beneficiary of the genesis header.
    #[serde(default)]
    pub coinbase: Address,
    /// Initial account allocation.
    #[serde(default)]
    pub alloc: BTreeMap<Address, GenesisAccount>,
}

/// One allocated account in the genesis dump.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenesisAccount {
    /// Initial balance in wei.
    #[serde(default)]
    pub balance: U256,
    /// Contract code, if the account is born as a contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Bytes>,
    /// Pre-set storage slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<BTreeMap<U256, U256>>,
}

impl GenesisDump {
    /// Synthesizes the genesis header. The state root is computed by the
    /// caller from the materialized allocation.
    pub fn header(&self, state_root: B256) -> Header {
        Header {
            parent_hash: self.parent_hash,
            ommers_hash: EMPTY_OMMERS_HASH,
            beneficiary: self.coinbase,
            state_root,
            transactions_root: EMPTY_ROOT_HASH,
            receipts_root: EMPTY_ROOT_HASH,
            logs_bloom: Default::default(),
            difficulty: self.difficulty,
            number: 0,
            gas_limit: self.gas_limit.saturating_to(),
            gas_used: 0,
            timestamp: self.timestamp,
            extra_data: self.extra_data.clone(),
            mix_hash: self.mixhash,
            nonce: self.nonce,
        }
    }
}
