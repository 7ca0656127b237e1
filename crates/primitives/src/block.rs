use crate::{Header, SealedHeader, TransactionSigned};
use alloy_primitives::B256;
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// A full block: header, transactions and uncle headers.
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
pub struct Block {
    /// Block header.
    pub header: Header,
    /// Transactions in this block.
    pub body: Vec<TransactionSigned>,
    /// Uncle headers included for reward.
    pub ommers: Vec<Header>,
}

impl Block {
    /// Seals the block by computing the header hash.
    pub fn seal_slow(self) -> SealedBlock {
        SealedBlock { header: self.header.seal_slow(), body: self.body, ommers: self.ommers }
    }

    /// Seals the block with a known hash.
    ///
    /// WARNING: does not verify that the hash is correct.
    pub fn seal(self, hash: B256) -> SealedBlock {
        SealedBlock { header: self.header.seal(hash), body: self.body, ommers: self.ommers }
    }
}

/// A block body as persisted on disk, without its header.
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
pub struct BlockBody {
    /// Transactions in the block.
    pub transactions: Vec<TransactionSigned>,
    /// Uncle headers of the block.
    pub ommers: Vec<Header>,
}

impl BlockBody {
    /// Reassembles the block this body belongs to.
    pub fn into_block(self, header: Header) -> Block {
        Block { header, body: self.transactions, ommers: self.ommers }
    }
}

/// A [`Block`] with a sealed header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlock {
    /// Sealed header.
    pub header: SealedHeader,
    /// Transactions in this block.
    pub body: Vec<TransactionSigned>,
    /// Uncle headers included for reward.
    pub ommers: Vec<Header>,
}

impl SealedBlock {
    /// The block hash.
    pub fn hash(&self) -> B256 {
        self.header.hash()
    }

    /// Splits the block into its persisted body.
    pub fn split_body(self) -> (SealedHeader, BlockBody) {
        (self.header, BlockBody { transactions: self.body, ommers: self.ommers })
    }

    /// Clones out the persisted body shape.
    pub fn to_body(&self) -> BlockBody {
        BlockBody { transactions: self.body.clone(), ommers: self.ommers.clone() }
    }

    /// Unseals the block.
    pub fn unseal(self) -> Block {
        Block { header: self.header.unseal(), body: self.body, ommers: self.ommers }
    }
}

impl Deref for SealedBlock {
    type Target = SealedHeader;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

impl From<SealedBlock> for Block {
    fn from(block: SealedBlock) -> Self {
        block.unseal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use alloy_rlp::Decodable;

    #[test]
    fn block_rlp_round_trip() {
        let block = Block {
            header: Header { number: 5, difficulty: U256::from(1u64), ..Default::default() },
            body: Vec::new(),
            ommers: vec![Header { number: 4, ..Default::default() }],
        };
        let encoded = alloy_rlp::encode(&block);
        let decoded = Block::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn sealed_block_exposes_header_fields() {
        let block =
            Block { header: Header { number: 8, ..Default::default() }, ..Default::default() };
        let sealed = block.clone().seal_slow();
        assert_eq!(sealed.number, 8);
        assert_eq!(sealed.hash(), block.header.hash_slow());

        let (header, body) = sealed.clone().split_body();
        assert_eq!(body.into_block(header.unseal()), block);
    }
}
