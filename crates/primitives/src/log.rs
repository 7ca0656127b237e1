use crate::BlockNumber;
use alloy_primitives::{Address, Bloom, BloomInput, Bytes, B256};
use alloy_rlp::{Decodable, Encodable};
use serde::{Deserialize, Serialize};

/// A log emitted during transaction execution.
///
/// Only `address`, `topics` and `data` are consensus fields and part of the
/// RLP encoding; the remaining fields are derived at receipt assembly and
/// default to zero after decoding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Log {
    /// Address of the emitting contract.
    pub address: Address,
    /// Indexed topics, at most four.
    pub topics: Vec<B256>,
    /// Unindexed payload.
    pub data: Bytes,

    /// Hash of the including block.
    #[serde(default)]
    pub block_hash: B256,
    /// Number of the including block.
    #[serde(default)]
    pub block_number: BlockNumber,
    /// Hash of the emitting transaction.
    #[serde(default)]
    pub transaction_hash: B256,
    /// Position of the emitting transaction in its block.
    #[serde(default)]
    pub transaction_index: u64,
    /// Position of this log in its block.
    #[serde(default)]
    pub log_index: u64,
}

impl Log {
    /// The bloom filter covering this log's address and topics.
    pub fn bloom(&self) -> Bloom {
        let mut bloom = Bloom::ZERO;
        self.accrue_to(&mut bloom);
        bloom
    }

    fn accrue_to(&self, bloom: &mut Bloom) {
        bloom.accrue(BloomInput::Raw(self.address.as_slice()));
        for topic in &self.topics {
            bloom.accrue(BloomInput::Raw(topic.as_slice()));
        }
    }

    fn payload_length(&self) -> usize {
        self.address.length() + self.topics.length() + self.data.length()
    }
}

impl Encodable for Log {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let payload_length = self.payload_length();
        alloy_rlp::Header { list: true, payload_length }.encode(out);
        self.address.encode(out);
        self.topics.encode(out);
        self.data.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for Log {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let started_len = buf.len();

        let address = Address::decode(buf)?;
        let topics = Vec::<B256>::decode(buf)?;
        let data = Bytes::decode(buf)?;

        let consumed = started_len - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            });
        }
        Ok(Self { address, topics, data, ..Default::default() })
    }
}

/// Folds the blooms of `logs` into one filter.
pub fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a Log>) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for log in logs {
        log.accrue_to(&mut bloom);
    }
    bloom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rlp_covers_consensus_fields_only() {
        let log = Log {
            address: Address::repeat_byte(1),
            topics: vec![B256::repeat_byte(2), B256::repeat_byte(3)],
            data: Bytes::from_static(&[4, 5, 6]),
            block_number: 99,
            transaction_index: 7,
            log_index: 13,
            ..Default::default()
        };

        let encoded = alloy_rlp::encode(&log);
        let decoded = Log::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded.address, log.address);
        assert_eq!(decoded.topics, log.topics);
        assert_eq!(decoded.data, log.data);
        // derived fields are not encoded
        assert_eq!(decoded.block_number, 0);
        assert_eq!(decoded.log_index, 0);
    }

    #[test]
    fn bloom_covers_address_and_topics() {
        let log = Log {
            address: Address::repeat_byte(1),
            topics: vec![B256::repeat_byte(2)],
            ..Default::default()
        };
        let bloom = log.bloom();
        assert!(bloom.contains_input(BloomInput::Raw(log.address.as_slice())));
        assert!(bloom.contains_input(BloomInput::Raw(log.topics[0].as_slice())));
        assert_eq!(bloom, logs_bloom([&log]));
    }
}
