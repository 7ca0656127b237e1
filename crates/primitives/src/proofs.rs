//! Deterministic root computations over encoded structures.
//!
//! Roots computed here are part of consensus hashes and must be bit-stable
//! across implementations.

use crate::{Account, Header, ReceiptWithBloom, TransactionSigned};
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_rlp::Encodable;
use alloy_trie::{HashBuilder, Nibbles};

/// Root of an index-keyed trie over the RLP encodings of `items`, the form
/// used for transaction and receipt roots.
pub fn ordered_trie_root<T: Encodable>(items: &[T]) -> B256 {
    alloy_trie::root::ordered_trie_root_with_encoder(items, |item, buf| item.encode(buf))
}

/// The transactions root of a block body.
pub fn calculate_transaction_root(transactions: &[TransactionSigned]) -> B256 {
    ordered_trie_root(transactions)
}

/// The receipts root of a block.
pub fn calculate_receipt_root(receipts: &[ReceiptWithBloom]) -> B256 {
    ordered_trie_root(receipts)
}

/// The ommers hash of a block: keccak-256 of the RLP list of uncle headers.
pub fn calculate_ommers_hash(ommers: &[Header]) -> B256 {
    let mut buf = Vec::new();
    alloy_rlp::encode_list(ommers, &mut buf);
    keccak256(buf)
}

/// Root of a key-value mapping whose keys are already keccak-hashed and
/// sorted ascending.
pub fn hashed_keys_trie_root(entries: impl IntoIterator<Item = (B256, Vec<u8>)>) -> B256 {
    let mut builder = HashBuilder::default();
    for (key, value) in entries {
        builder.add_leaf(Nibbles::unpack(key), &value);
    }
    builder.root()
}

/// The state root over `(address, account)` pairs. Input order is arbitrary;
/// keys are hashed and sorted here.
pub fn state_root(accounts: impl IntoIterator<Item = (Address, Account)>) -> B256 {
    let mut entries: Vec<(B256, Vec<u8>)> = accounts
        .into_iter()
        .map(|(address, account)| (keccak256(address), alloy_rlp::encode(account)))
        .collect();
    entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
    hashed_keys_trie_root(entries)
}

/// The storage root of one account over `(slot, value)` pairs. Zero values
/// must already be absent; input order is arbitrary.
pub fn storage_root(slots: impl IntoIterator<Item = (B256, U256)>) -> B256 {
    let mut entries: Vec<(B256, Vec<u8>)> = slots
        .into_iter()
        .map(|(slot, value)| (keccak256(slot), alloy_rlp::encode(value)))
        .collect();
    entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
    hashed_keys_trie_root(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{EMPTY_OMMERS_HASH, EMPTY_ROOT_HASH};

    #[test]
    fn empty_roots_match_reference_constants() {
        assert_eq!(ordered_trie_root::<TransactionSigned>(&[]), EMPTY_ROOT_HASH);
        assert_eq!(calculate_ommers_hash(&[]), EMPTY_OMMERS_HASH);
        assert_eq!(state_root(std::iter::empty()), EMPTY_ROOT_HASH);
        assert_eq!(storage_root(std::iter::empty()), EMPTY_ROOT_HASH);
    }

    #[test]
    fn state_root_is_insertion_order_independent() {
        let a = (Address::repeat_byte(1), Account { nonce: 1, ..Default::default() });
        let b = (Address::repeat_byte(2), Account { nonce: 2, ..Default::default() });
        assert_eq!(state_root([a, b]), state_root([b, a]));
    }

    #[test]
    fn state_root_reflects_account_contents() {
        let address = Address::repeat_byte(1);
        let one = state_root([(address, Account { nonce: 1, ..Default::default() })]);
        let two = state_root([(address, Account { nonce: 2, ..Default::default() })]);
        assert_ne!(one, two);
    }

    #[test]
    fn ordered_root_depends_on_order() {
        let ommers =
            vec![Header { number: 1, ..Default::default() }, Header { number: 2, ..Default::default() }];
        let reversed: Vec<_> = ommers.iter().rev().cloned().collect();
        assert_ne!(calculate_ommers_hash(&ommers), calculate_ommers_hash(&reversed));
    }

    #[test]
    fn storage_root_changes_with_values() {
        let slot = B256::repeat_byte(3);
        let a = storage_root([(slot, U256::from(1u64))]);
        let b = storage_root([(slot, U256::from(2u64))]);
        assert_ne!(a, b);
    }
}
