use crate::{constants::EMPTY_OMMERS_HASH, BlockNumber};
use alloy_primitives::{keccak256, Address, Bloom, Bytes, B256, B64, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Block header.
///
/// The header hash is the keccak-256 of its RLP encoding and is part of
/// consensus; field order below is the encoding order. Timestamps are
/// unbounded integers.
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
pub struct Header {
    /// Hash of the parent block's header.
    pub parent_hash: B256,
    /// Keccak-256 of the RLP list of this block's uncle headers.
    pub ommers_hash: B256,
    /// Address collecting the block reward.
    pub beneficiary: Address,
    /// Root of the world state after executing this block.
    pub state_root: B256,
    /// Root over the block's transactions.
    pub transactions_root: B256,
    /// Root over the block's receipts.
    pub receipts_root: B256,
    /// Union of the bloom filters of all logs in the block.
    pub logs_bloom: Bloom,
    /// Difficulty target this block was mined against.
    pub difficulty: U256,
    /// Height of this block.
    pub number: BlockNumber,
    /// Gas limit for the block.
    pub gas_limit: u64,
    /// Total gas used by the block's transactions.
    pub gas_used: u64,
    /// Proposal time, seconds since the unix epoch.
    pub timestamp: U256,
    /// Arbitrary miner-supplied data, bounded by validation.
    pub extra_data: Bytes,
    /// Proof-of-work mix digest.
    pub mix_hash: B256,
    /// Proof-of-work nonce.
    pub nonce: B64,
}

impl Header {
    /// Computes the header hash. Prefer [`SealedHeader`] when the hash is
    /// needed more than once.
    pub fn hash_slow(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }

    /// Whether this header carries the empty-ommers hash.
    pub fn ommers_empty(&self) -> bool {
        self.ommers_hash == EMPTY_OMMERS_HASH
    }

    /// Seals the header by computing its hash.
    pub fn seal_slow(self) -> SealedHeader {
        let hash = self.hash_slow();
        SealedHeader { header: self, hash }
    }

    /// Seals the header with a known hash.
    ///
    /// WARNING: does not verify that the hash is correct.
    pub fn seal(self, hash: B256) -> SealedHeader {
        SealedHeader { header: self, hash }
    }
}

/// A [`Header`] carrying its hash, sealed so the two cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedHeader {
    header: Header,
    hash: B256,
}

impl SealedHeader {
    /// The hash of the sealed header.
    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Borrows the inner header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Unseals, dropping the hash.
    pub fn unseal(self) -> Header {
        self.header
    }

    /// The `(number, hash)` pair of this header.
    pub fn num_hash(&self) -> (BlockNumber, B256) {
        (self.header.number, self.hash)
    }
}

impl Deref for SealedHeader {
    type Target = Header;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

impl Default for SealedHeader {
    fn default() -> Self {
        Header::default().seal_slow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_rlp::Decodable;

    #[test]
    fn header_rlp_round_trip() {
        let header = Header {
            parent_hash: B256::repeat_byte(1),
            ommers_hash: EMPTY_OMMERS_HASH,
            beneficiary: Address::repeat_byte(2),
            difficulty: U256::from(131_072u64),
            number: 7,
            gas_limit: 5000,
            gas_used: 0,
            timestamp: U256::from(1_438_269_988u64),
            extra_data: Bytes::from_static(b"emerald"),
            nonce: B64::from(0x539u64),
            ..Default::default()
        };

        let encoded = alloy_rlp::encode(&header);
        let decoded = Header::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.hash_slow(), header.hash_slow());
    }

    #[test]
    fn sealing_preserves_the_slow_hash() {
        let header = Header { number: 3, ..Default::default() };
        let expected = header.hash_slow();
        let sealed = header.seal_slow();
        assert_eq!(sealed.hash(), expected);
        assert_eq!(sealed.num_hash(), (3, expected));
    }

    #[test]
    fn distinct_headers_hash_differently() {
        let a = Header::default();
        let mut b = Header::default();
        b.timestamp = U256::from(1u64);
        assert_ne!(a.hash_slow(), b.hash_slow());
    }
}
