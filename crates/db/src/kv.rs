use crate::StoreError;

/// An ordered byte-key to byte-value store.
///
/// Keys iterate in byte-lexicographic order. Writes made through a [`Batch`]
/// are applied atomically: either every operation in the batch is visible or
/// none is.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Returns whether `key` is present.
    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Applies all operations in `batch` atomically.
    fn write_batch(&self, batch: Batch) -> Result<(), StoreError>;

    /// Returns all `(key, value)` pairs whose key starts with `prefix`, in
    /// byte-lexicographic key order.
    fn iter_with_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

/// A single operation recorded in a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Store `value` under `key`.
    Put {
        /// Target key.
        key: Vec<u8>,
        /// Value to store.
        value: Vec<u8>,
    },
    /// Remove `key`.
    Delete {
        /// Target key.
        key: Vec<u8>,
    },
}

/// An ordered set of write operations applied atomically via
/// [`KeyValueStore::write_batch`].
///
/// Within one batch, later operations on a key shadow earlier ones.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put { key: key.into(), value: value.into() });
    }

    /// Records a delete.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consumes the batch, yielding its operations in insertion order.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}
