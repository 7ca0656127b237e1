/// Storage layer errors.
///
/// Every operation on a [`crate::KeyValueStore`] may fail with one of these;
/// callers treat them as storage-I/O failures and do not retry blindly.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An underlying read failed.
    #[error("storage read failed: {0}")]
    Read(String),

    /// An underlying write failed. A failed batch write leaves the store
    /// unchanged from the caller's perspective.
    #[error("storage write failed: {0}")]
    Write(String),

    /// A stored value could not be decoded into its expected shape.
    #[error("corrupt entry under key {key}: {reason}")]
    Corrupt {
        /// Hex rendering of the offending key.
        key: String,
        /// What went wrong while decoding.
        reason: String,
    },
}

impl StoreError {
    /// Convenience constructor for decode failures.
    pub fn corrupt(key: &[u8], reason: impl ToString) -> Self {
        Self::Corrupt { key: alloy_primitives::hex::encode(key), reason: reason.to_string() }
    }
}
