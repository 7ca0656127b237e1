use crate::BlockNumber;
use alloy_primitives::{keccak256, Address, Bytes, TxKind, B256, U256};
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, SecretKey, SECP256K1,
};
use serde::{Deserialize, Serialize};

/// A legacy transaction before signing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender account nonce.
    pub nonce: u64,
    /// Wei paid per unit of gas.
    pub gas_price: U256,
    /// Gas purchased for the transaction.
    pub gas_limit: u64,
    /// Call target, or create.
    pub to: TxKind,
    /// Wei transferred to the recipient or the created contract.
    pub value: U256,
    /// Call data or contract init code.
    pub input: Bytes,
}

impl Transaction {
    /// Whether this transaction creates a contract.
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_create()
    }

    fn fields_length(&self) -> usize {
        self.nonce.length() +
            self.gas_price.length() +
            self.gas_limit.length() +
            self.to.length() +
            self.value.length() +
            self.input.length()
    }

    fn encode_fields(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.input.encode(out);
    }
}

/// Secp256k1 transaction signature. `v` also encodes the replay-protection
/// chain id when the chain-id-bound scheme signed the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature {
    /// Recovery byte, possibly chain-id bound.
    pub v: u64,
    /// First half of the signature.
    pub r: U256,
    /// Second half of the signature.
    pub s: U256,
}

impl Signature {
    fn payload_length(&self) -> usize {
        self.v.length() + self.r.length() + self.s.length()
    }

    fn encode_fields(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.v.encode(out);
        self.r.encode(out);
        self.s.encode(out);
    }
}

/// A signed transaction with its cached hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSigned {
    /// Keccak-256 of the signed encoding.
    hash: B256,
    /// The signature.
    pub signature: Signature,
    /// The unsigned fields.
    pub transaction: Transaction,
}

impl TransactionSigned {
    /// Builds a signed transaction, computing its hash.
    pub fn new(transaction: Transaction, signature: Signature) -> Self {
        let mut tx = Self { hash: B256::ZERO, signature, transaction };
        tx.hash = keccak256(alloy_rlp::encode(&tx));
        tx
    }

    /// The transaction hash.
    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// The chain id embedded in `v`, if the transaction is replay-protected.
    pub fn chain_id(&self) -> Option<u64> {
        // protected v = chain_id * 2 + 35 or 36
        (self.signature.v >= 35).then(|| (self.signature.v - 35) / 2)
    }

    /// Whether the signature binds a chain id.
    pub fn is_protected(&self) -> bool {
        self.chain_id().is_some()
    }

    /// Whether this transaction creates a contract.
    pub fn is_contract_creation(&self) -> bool {
        self.transaction.is_contract_creation()
    }

    fn payload_length(&self) -> usize {
        self.transaction.fields_length() + self.signature.payload_length()
    }
}

impl Encodable for TransactionSigned {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let payload_length = self.payload_length();
        alloy_rlp::Header { list: true, payload_length }.encode(out);
        self.transaction.encode_fields(out);
        self.signature.encode_fields(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for TransactionSigned {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let started_len = buf.len();

        let transaction = Transaction {
            nonce: u64::decode(buf)?,
            gas_price: U256::decode(buf)?,
            gas_limit: u64::decode(buf)?,
            to: TxKind::decode(buf)?,
            value: U256::decode(buf)?,
            input: Bytes::decode(buf)?,
        };
        let signature =
            Signature { v: u64::decode(buf)?, r: U256::decode(buf)?, s: U256::decode(buf)? };

        let consumed = started_len - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            });
        }
        Ok(Self::new(transaction, signature))
    }
}

/// Signature scheme in force at a given block height.
///
/// The basic scheme hashes the six unsigned fields; the chain-id-bound
/// scheme (EIP-155) appends `(chain_id, 0, 0)` to the signing payload and
/// folds the chain id into `v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signer {
    /// Pre-replay-protection scheme.
    Basic,
    /// Chain-id-bound scheme with the configured id.
    ChainId(u64),
}

impl Signer {
    /// The hash the sender signed under this scheme.
    pub fn signature_hash(&self, tx: &Transaction) -> B256 {
        let chain_id = match self {
            Self::Basic => None,
            Self::ChainId(id) => Some(*id),
        };
        signing_hash(tx, chain_id)
    }

    /// Recovers the sender of `tx` under this scheme.
    ///
    /// The chain-id-bound scheme accepts unprotected transactions by falling
    /// back to the basic scheme, but rejects protected transactions bound to
    /// a different id.
    pub fn recover(&self, tx: &TransactionSigned) -> Result<Address, SignatureError> {
        match (self, tx.chain_id()) {
            (Self::Basic, Some(_)) => Err(SignatureError::UnexpectedProtection),
            (Self::Basic, None) | (Self::ChainId(_), None) => {
                let rec_id = tx
                    .signature
                    .v
                    .checked_sub(27)
                    .filter(|rec| *rec < 2)
                    .ok_or(SignatureError::InvalidV { v: tx.signature.v })?;
                recover_address(&tx.signature, rec_id as u8, signing_hash(&tx.transaction, None))
            }
            (Self::ChainId(expected), Some(embedded)) => {
                if embedded != *expected {
                    return Err(SignatureError::ChainIdMismatch {
                        embedded,
                        configured: *expected,
                    });
                }
                let rec_id = tx.signature.v - 35 - embedded * 2;
                if rec_id >= 2 {
                    return Err(SignatureError::InvalidV { v: tx.signature.v });
                }
                recover_address(
                    &tx.signature,
                    rec_id as u8,
                    signing_hash(&tx.transaction, Some(embedded)),
                )
            }
        }
    }
}

/// Errors from signature recovery.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    /// The `v` byte fits neither signing scheme.
    #[error("invalid signature v value {v}")]
    InvalidV {
        /// The offending value.
        v: u64,
    },

    /// A replay-protected transaction was presented to the basic scheme.
    #[error("replay-protected transaction under the basic signing scheme")]
    UnexpectedProtection,

    /// A protected transaction is bound to a different chain.
    #[error("transaction chain id {embedded} does not match configured id {configured}")]
    ChainIdMismatch {
        /// Chain id embedded in `v`.
        embedded: u64,
        /// Chain id the configuration expects.
        configured: u64,
    },

    /// The curve rejected the signature.
    #[error("unrecoverable signature")]
    Unrecoverable,
}

fn signing_hash(tx: &Transaction, chain_id: Option<u64>) -> B256 {
    let mut payload_length = tx.fields_length();
    if let Some(id) = chain_id {
        payload_length += id.length() + 0u8.length() + 0u8.length();
    }

    let mut buf = Vec::with_capacity(payload_length + alloy_rlp::length_of_length(payload_length));
    alloy_rlp::Header { list: true, payload_length }.encode(&mut buf);
    tx.encode_fields(&mut buf);
    if let Some(id) = chain_id {
        id.encode(&mut buf);
        0u8.encode(&mut buf);
        0u8.encode(&mut buf);
    }
    keccak256(&buf)
}

fn recover_address(
    signature: &Signature,
    rec_id: u8,
    hash: B256,
) -> Result<Address, SignatureError> {
    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&signature.r.to_be_bytes::<32>());
    compact[32..].copy_from_slice(&signature.s.to_be_bytes::<32>());

    let rec_id = RecoveryId::from_i32(rec_id as i32).map_err(|_| SignatureError::Unrecoverable)?;
    let signature = RecoverableSignature::from_compact(&compact, rec_id)
        .map_err(|_| SignatureError::Unrecoverable)?;
    let public = SECP256K1
        .recover_ecdsa(&Message::from_digest(hash.0), &signature)
        .map_err(|_| SignatureError::Unrecoverable)?;

    let digest = keccak256(&public.serialize_uncompressed()[1..]);
    Ok(Address::from_slice(&digest[12..]))
}

/// Signs `transaction` with `secret` under the scheme selected by
/// `chain_id`.
pub fn sign_transaction(
    transaction: Transaction,
    secret: &SecretKey,
    chain_id: Option<u64>,
) -> TransactionSigned {
    let hash = signing_hash(&transaction, chain_id);
    let signature =
        SECP256K1.sign_ecdsa_recoverable(&Message::from_digest(hash.0), secret);
    let (rec_id, data) = signature.serialize_compact();

    let rec_id = rec_id.to_i32() as u64;
    let v = match chain_id {
        Some(id) => id * 2 + 35 + rec_id,
        None => 27 + rec_id,
    };
    let signature = Signature {
        v,
        r: U256::from_be_slice(&data[..32]),
        s: U256::from_be_slice(&data[32..]),
    };
    TransactionSigned::new(transaction, signature)
}

/// Pointer from a transaction hash to its canonical inclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct TxLookupEntry {
    /// Hash of the including block.
    pub block_hash: B256,
    /// Number of the including block.
    pub block_number: BlockNumber,
    /// Position inside the block.
    pub index: u64,
}
