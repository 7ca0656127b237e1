use crate::constants::{EMPTY_ROOT_HASH, KECCAK_EMPTY};
use alloy_primitives::{B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// A world-state account entry as stored under the state root.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
pub struct Account {
    /// Number of transactions sent from this account.
    pub nonce: u64,
    /// Balance in wei.
    pub balance: U256,
    /// Root of the account's storage trie.
    pub storage_root: B256,
    /// Keccak-256 of the account's code.
    pub code_hash: B256,
}

impl Account {
    /// Whether the account is empty: zero nonce, zero balance and no code.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash == KECCAK_EMPTY
    }

    /// Whether the account carries code.
    pub fn has_code(&self) -> bool {
        self.code_hash != KECCAK_EMPTY
    }
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: EMPTY_ROOT_HASH,
            code_hash: KECCAK_EMPTY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_rlp::Decodable;

    #[test]
    fn default_account_is_empty() {
        let account = Account::default();
        assert!(account.is_empty());
        assert!(!account.has_code());
    }

    #[test]
    fn account_rlp_round_trip() {
        let account = Account {
            nonce: 9,
            balance: U256::from(1_000_000u64),
            storage_root: B256::repeat_byte(5),
            code_hash: B256::repeat_byte(6),
        };
        let encoded = alloy_rlp::encode(&account);
        assert_eq!(Account::decode(&mut encoded.as_slice()).unwrap(), account);
    }
}
