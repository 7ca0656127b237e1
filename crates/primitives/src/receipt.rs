use crate::{logs_bloom, Log};
use alloy_primitives::{Bloom, B256};
use alloy_rlp::{Decodable, Encodable};
use serde::{Deserialize, Serialize};

/// First receipt field, whose encoding changed with EIP-658.
///
/// Chains that never schedule the status change keep emitting
/// [`ReceiptOutcome::StateRoot`]; both forms stay decodable so receipts
/// remain portable across rule sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptOutcome {
    /// Intermediate state root recorded after the transaction.
    StateRoot(B256),
    /// Success flag recorded instead of the root.
    Status(bool),
}

impl ReceiptOutcome {
    /// Whether this outcome marks the transaction as failed. State-root
    /// outcomes carry no failure information and report success.
    pub fn is_success(&self) -> bool {
        match self {
            Self::StateRoot(_) => true,
            Self::Status(success) => *success,
        }
    }
}

impl Encodable for ReceiptOutcome {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        match self {
            Self::StateRoot(root) => root.encode(out),
            Self::Status(success) => u8::from(*success).encode(out),
        }
    }

    fn length(&self) -> usize {
        match self {
            Self::StateRoot(root) => root.length(),
            Self::Status(success) => u8::from(*success).length(),
        }
    }
}

impl Decodable for ReceiptOutcome {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        // a 32-byte string is a pre-status root, anything shorter a status byte
        if buf.first() == Some(&0xa0) {
            return Ok(Self::StateRoot(B256::decode(buf)?));
        }
        Ok(Self::Status(u8::decode(buf)? == 1))
    }
}

/// Outcome of executing one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Post-transaction root or status, depending on the rule set.
    pub outcome: ReceiptOutcome,
    /// Gas used by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// Logs emitted by the transaction.
    pub logs: Vec<Log>,
}

impl Receipt {
    /// The bloom filter over this receipt's logs.
    pub fn bloom(&self) -> Bloom {
        logs_bloom(&self.logs)
    }

    /// Pairs the receipt with its computed bloom for encoding.
    pub fn with_bloom(self) -> ReceiptWithBloom {
        let bloom = self.bloom();
        ReceiptWithBloom { receipt: self, bloom }
    }
}

/// A [`Receipt`] with its bloom, the form receipts take on disk and under
/// the receipts root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptWithBloom {
    /// The receipt.
    pub receipt: Receipt,
    /// Bloom over the receipt's logs.
    pub bloom: Bloom,
}

impl ReceiptWithBloom {
    fn payload_length(&self) -> usize {
        self.receipt.outcome.length() +
            self.receipt.cumulative_gas_used.length() +
            self.bloom.length() +
            self.receipt.logs.length()
    }
}

impl Encodable for ReceiptWithBloom {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let payload_length = self.payload_length();
        alloy_rlp::Header { list: true, payload_length }.encode(out);
        self.receipt.outcome.encode(out);
        self.receipt.cumulative_gas_used.encode(out);
        self.bloom.encode(out);
        self.receipt.logs.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for ReceiptWithBloom {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let started_len = buf.len();

        let outcome = ReceiptOutcome::decode(buf)?;
        let cumulative_gas_used = u64::decode(buf)?;
        let bloom = Bloom::decode(buf)?;
        let logs = Vec::<Log>::decode(buf)?;

        let consumed = started_len - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            });
        }
        Ok(Self { receipt: Receipt { outcome, cumulative_gas_used, logs }, bloom })
    }
}
