//! On-disk key schema.
//!
//! Every persistent entry the chain core writes lives under one of the
//! prefixes below. Numeric key components are little-endian; values use RLP
//! (total difficulty included, via RLP's natural big-endian integer form).
//!
//! | key | value |
//! |---|---|
//! | `h` + num(8) + hash(32) | header RLP |
//! | `H` + hash(32) | num(8) |
//! | `b` + num(8) + hash(32) | body RLP |
//! | `r` + num(8) + hash(32) | receipts RLP |
//! | `t` + hash(32) | total difficulty RLP |
//! | `n` + num(8) | canonical hash |
//! | `x` + hash(32) | transaction lookup entry RLP |
//! | `LastBlock` / `LastHeader` / `LastFast` | head hash |
//! | `atx-` + addr(20) + num(8) + dir(1) + kind(1) + txhash(32) | empty |
//! | `ATXIBookmark` | num(8) |
//! | `mipmap-log-bloom-` + level(8) + idx(8) | bloom bytes |
//! | `st-` + root(32) | state commit diff RLP |
//! | `c-` + codehash(32) | contract code |

use alloy_primitives::{Address, B256};

/// Header prefix.
pub const HEADER_PREFIX: u8 = b'h';
/// Hash-to-number prefix.
pub const NUMBER_PREFIX: u8 = b'H';
/// Body prefix.
pub const BODY_PREFIX: u8 = b'b';
/// Receipts prefix.
pub const RECEIPTS_PREFIX: u8 = b'r';
/// Total-difficulty prefix.
pub const TD_PREFIX: u8 = b't';
/// Canonical number-to-hash prefix.
pub const CANONICAL_PREFIX: u8 = b'n';
/// Transaction lookup prefix.
pub const TX_LOOKUP_PREFIX: u8 = b'x';

/// Head full-block pointer key.
pub const HEAD_BLOCK_KEY: &[u8] = b"LastBlock";
/// Head header pointer key.
pub const HEAD_HEADER_KEY: &[u8] = b"LastHeader";
/// Head fast-block pointer key.
pub const HEAD_FAST_KEY: &[u8] = b"LastFast";

/// Address-transaction index prefix.
pub const ATX_PREFIX: &[u8] = b"atx-";
/// Address-transaction index build bookmark key.
pub const ATX_BOOKMARK_KEY: &[u8] = b"ATXIBookmark";

/// Mipmap log-bloom prefix.
pub const MIPMAP_BLOOM_PREFIX: &[u8] = b"mipmap-log-bloom-";

/// State commit diff prefix.
pub const STATE_DIFF_PREFIX: &[u8] = b"st-";
/// Contract code prefix.
pub const CODE_PREFIX: &[u8] = b"c-";

/// ATXI direction marker: the address is the transaction sender.
pub const ATX_DIR_FROM: u8 = b'f';
/// ATXI direction marker: the address is the transaction recipient.
pub const ATX_DIR_TO: u8 = b't';
/// ATXI kind marker: standard call.
pub const ATX_KIND_STANDARD: u8 = b's';
/// ATXI kind marker: contract creation.
pub const ATX_KIND_CREATE: u8 = b'c';

fn num_hash_key(prefix: u8, number: u64, hash: &B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8 + 32);
    key.push(prefix);
    key.extend_from_slice(&number.to_le_bytes());
    key.extend_from_slice(hash.as_slice());
    key
}

fn hash_key(prefix: u8, hash: &B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 32);
    key.push(prefix);
    key.extend_from_slice(hash.as_slice());
    key
}

/// `h` + num + hash → header.
pub fn header_key(number: u64, hash: &B256) -> Vec<u8> {
    num_hash_key(HEADER_PREFIX, number, hash)
}

/// `H` + hash → number.
pub fn header_number_key(hash: &B256) -> Vec<u8> {
    hash_key(NUMBER_PREFIX, hash)
}

/// `b` + num + hash → body.
pub fn body_key(number: u64, hash: &B256) -> Vec<u8> {
    num_hash_key(BODY_PREFIX, number, hash)
}

/// `r` + num + hash → receipts.
pub fn receipts_key(number: u64, hash: &B256) -> Vec<u8> {
    num_hash_key(RECEIPTS_PREFIX, number, hash)
}

/// `t` + hash → total difficulty.
pub fn td_key(hash: &B256) -> Vec<u8> {
    hash_key(TD_PREFIX, hash)
}

/// `n` + num → canonical hash.
pub fn canonical_key(number: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8);
    key.push(CANONICAL_PREFIX);
    key.extend_from_slice(&number.to_le_bytes());
    key
}

/// `x` + hash → transaction lookup entry.
pub fn tx_lookup_key(hash: &B256) -> Vec<u8> {
    hash_key(TX_LOOKUP_PREFIX, hash)
}

/// Full ATXI key for one (address, transaction) pairing.
pub fn atx_key(address: &Address, number: u64, direction: u8, kind: u8, tx_hash: &B256) -> Vec<u8> {
    let mut key = atx_address_prefix(address);
    key.extend_from_slice(&number.to_le_bytes());
    key.push(direction);
    key.push(kind);
    key.extend_from_slice(tx_hash.as_slice());
    key
}

/// Prefix covering every ATXI entry of one address.
pub fn atx_address_prefix(address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(ATX_PREFIX.len() + 20 + 8 + 1 + 1 + 32);
    key.extend_from_slice(ATX_PREFIX);
    key.extend_from_slice(address.as_slice());
    key
}

/// Splits an ATXI key back into (address, number, direction, kind, tx hash).
pub fn parse_atx_key(key: &[u8]) -> Option<(Address, u64, u8, u8, B256)> {
    let body = key.strip_prefix(ATX_PREFIX)?;
    if body.len() != 20 + 8 + 1 + 1 + 32 {
        return None;
    }
    let address = Address::from_slice(&body[..20]);
    let number = u64::from_le_bytes(body[20..28].try_into().ok()?);
    let direction = body[28];
    let kind = body[29];
    let tx_hash = B256::from_slice(&body[30..]);
    Some((address, number, direction, kind, tx_hash))
}

/// `mipmap-log-bloom-` + level + index → packed bloom.
pub fn mipmap_bloom_key(level: u64, index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(MIPMAP_BLOOM_PREFIX.len() + 16);
    key.extend_from_slice(MIPMAP_BLOOM_PREFIX);
    key.extend_from_slice(&level.to_le_bytes());
    key.extend_from_slice(&index.to_le_bytes());
    key
}

/// `st-` + root → state commit diff.
pub fn state_diff_key(root: &B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(STATE_DIFF_PREFIX.len() + 32);
    key.extend_from_slice(STATE_DIFF_PREFIX);
    key.extend_from_slice(root.as_slice());
    key
}

/// `c-` + codehash → contract code.
pub fn code_key(code_hash: &B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(CODE_PREFIX.len() + 32);
    key.extend_from_slice(CODE_PREFIX);
    key.extend_from_slice(code_hash.as_slice());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    #[test]
    fn atx_key_round_trips() {
        let addr = address!("000000000000000000000000000000000000dead");
        let hash = b256!("00000000000000000000000000000000000000000000000000000000000000aa");
        let key = atx_key(&addr, 42, ATX_DIR_FROM, ATX_KIND_CREATE, &hash);
        assert!(key.starts_with(&atx_address_prefix(&addr)));

        let (a, n, d, k, h) = parse_atx_key(&key).unwrap();
        assert_eq!(a, addr);
        assert_eq!(n, 42);
        assert_eq!(d, ATX_DIR_FROM);
        assert_eq!(k, ATX_KIND_CREATE);
        assert_eq!(h, hash);
    }

    #[test]
    fn parse_rejects_truncated_keys() {
        let addr = address!("000000000000000000000000000000000000dead");
        let mut key = atx_address_prefix(&addr);
        key.extend_from_slice(&7u64.to_le_bytes());
        assert_eq!(parse_atx_key(&key), None);
    }
}
