//! Typed read and write helpers over the on-disk key schema.
//!
//! Reads go against any [`KeyValueStore`]; writes are recorded into the
//! caller's [`Batch`] so each block commits atomically.

use alloy_rlp::Decodable;
use emerald_db::{schema, Batch, KeyValueStore, StoreError};
use emerald_primitives::{
    BlockBody, BlockNumber, Bloom, Header, Receipt, ReceiptWithBloom, SealedBlock, SealedHeader,
    TxLookupEntry, B256, U256,
};

/// Bloom mipmap levels, coarsest first.
pub const MIPMAP_LEVELS: [u64; 5] = [1_000_000, 500_000, 100_000, 50_000, 1_000];

fn decode<T: Decodable>(key: &[u8], raw: &[u8]) -> Result<T, StoreError> {
    T::decode(&mut &raw[..]).map_err(|e| StoreError::corrupt(key, e))
}

fn decode_hash(key: &[u8], raw: &[u8]) -> Result<B256, StoreError> {
    if raw.len() != 32 {
        return Err(StoreError::corrupt(key, format!("expected 32 bytes, found {}", raw.len())));
    }
    Ok(B256::from_slice(raw))
}

fn decode_number(key: &[u8], raw: &[u8]) -> Result<u64, StoreError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| StoreError::corrupt(key, format!("expected 8 bytes, found {}", raw.len())))?;
    Ok(u64::from_le_bytes(bytes))
}

/// Number of the header with the given hash.
pub fn read_header_number(
    store: &dyn KeyValueStore,
    hash: &B256,
) -> Result<Option<BlockNumber>, StoreError> {
    let key = schema::header_number_key(hash);
    store.get(&key)?.map(|raw| decode_number(&key, &raw)).transpose()
}

/// Header with the given hash.
pub fn read_header(
    store: &dyn KeyValueStore,
    hash: &B256,
) -> Result<Option<SealedHeader>, StoreError> {
    let Some(number) = read_header_number(store, hash)? else { return Ok(None) };
    read_header_at(store, number, hash)
}

/// Header at a known `(number, hash)` position.
pub fn read_header_at(
    store: &dyn KeyValueStore,
    number: BlockNumber,
    hash: &B256,
) -> Result<Option<SealedHeader>, StoreError> {
    let key = schema::header_key(number, hash);
    let Some(raw) = store.get(&key)? else { return Ok(None) };
    let header: Header = decode(&key, &raw)?;
    Ok(Some(header.seal(*hash)))
}

/// Records a header under both its `(number, hash)` row and the
/// hash-to-number row.
pub fn write_header(batch: &mut Batch, header: &SealedHeader) {
    let hash = header.hash();
    batch.put(schema::header_key(header.number, &hash), alloy_rlp::encode(header.header()));
    batch.put(schema::header_number_key(&hash), header.number.to_le_bytes());
}

/// Removes a header's rows.
pub fn delete_header(batch: &mut Batch, number: BlockNumber, hash: &B256) {
    batch.delete(schema::header_key(number, hash));
    batch.delete(schema::header_number_key(hash));
}

/// Body stored for `(number, hash)`.
pub fn read_body(
    store: &dyn KeyValueStore,
    number: BlockNumber,
    hash: &B256,
) -> Result<Option<BlockBody>, StoreError> {
    let key = schema::body_key(number, hash);
    store.get(&key)?.map(|raw| decode(&key, &raw)).transpose()
}

/// Records a block body.
pub fn write_body(batch: &mut Batch, number: BlockNumber, hash: &B256, body: &BlockBody) {
    batch.put(schema::body_key(number, hash), alloy_rlp::encode(body));
}

/// Removes a block body.
pub fn delete_body(batch: &mut Batch, number: BlockNumber, hash: &B256) {
    batch.delete(schema::body_key(number, hash));
}

/// Full block by hash, resolved through the hash-to-number row.
pub fn read_block(
    store: &dyn KeyValueStore,
    hash: &B256,
) -> Result<Option<SealedBlock>, StoreError> {
    let Some(header) = read_header(store, hash)? else { return Ok(None) };
    let Some(body) = read_body(store, header.number, hash)? else { return Ok(None) };
    Ok(Some(SealedBlock {
        header,
        body: body.transactions,
        ommers: body.ommers,
    }))
}

/// Receipts stored for `(number, hash)`.
pub fn read_receipts(
    store: &dyn KeyValueStore,
    number: BlockNumber,
    hash: &B256,
) -> Result<Option<Vec<Receipt>>, StoreError> {
    let key = schema::receipts_key(number, hash);
    let Some(raw) = store.get(&key)? else { return Ok(None) };
    let with_bloom: Vec<ReceiptWithBloom> = decode(&key, &raw)?;
    Ok(Some(with_bloom.into_iter().map(|r| r.receipt).collect()))
}

/// Records a block's receipts, bloom included.
pub fn write_receipts(batch: &mut Batch, number: BlockNumber, hash: &B256, receipts: &[Receipt]) {
    let with_bloom: Vec<ReceiptWithBloom> =
        receipts.iter().map(|receipt| receipt.clone().with_bloom()).collect();
    batch.put(schema::receipts_key(number, hash), alloy_rlp::encode(&with_bloom));
}

/// Removes a block's receipts.
pub fn delete_receipts(batch: &mut Batch, number: BlockNumber, hash: &B256) {
    batch.delete(schema::receipts_key(number, hash));
}

/// Total difficulty of the block with the given hash.
pub fn read_td(store: &dyn KeyValueStore, hash: &B256) -> Result<Option<U256>, StoreError> {
    let key = schema::td_key(hash);
    store.get(&key)?.map(|raw| decode(&key, &raw)).transpose()
}

/// Records a block's total difficulty.
pub fn write_td(batch: &mut Batch, hash: &B256, td: U256) {
    batch.put(schema::td_key(hash), alloy_rlp::encode(td));
}

/// Removes a block's total difficulty.
pub fn delete_td(batch: &mut Batch, hash: &B256) {
    batch.delete(schema::td_key(hash));
}

/// Canonical hash at a height.
pub fn read_canonical_hash(
    store: &dyn KeyValueStore,
    number: BlockNumber,
) -> Result<Option<B256>, StoreError> {
    let key = schema::canonical_key(number);
    store.get(&key)?.map(|raw| decode_hash(&key, &raw)).transpose()
}

/// Records the canonical hash for a height.
pub fn write_canonical_hash(batch: &mut Batch, number: BlockNumber, hash: &B256) {
    batch.put(schema::canonical_key(number), hash.as_slice());
}

/// Removes the canonical mapping for a height.
pub fn delete_canonical_hash(batch: &mut Batch, number: BlockNumber) {
    batch.delete(schema::canonical_key(number));
}

fn read_pointer(
    store: &dyn KeyValueStore,
    key: &'static [u8],
) -> Result<Option<B256>, StoreError> {
    store.get(key)?.map(|raw| decode_hash(key, &raw)).transpose()
}

/// Head full-block pointer.
pub fn read_head_block_hash(store: &dyn KeyValueStore) -> Result<Option<B256>, StoreError> {
    read_pointer(store, schema::HEAD_BLOCK_KEY)
}

/// Records the head full-block pointer.
pub fn write_head_block_hash(batch: &mut Batch, hash: &B256) {
    batch.put(schema::HEAD_BLOCK_KEY, hash.as_slice());
}

/// Head header pointer.
pub fn read_head_header_hash(store: &dyn KeyValueStore) -> Result<Option<B256>, StoreError> {
    read_pointer(store, schema::HEAD_HEADER_KEY)
}

/// Records the head header pointer.
pub fn write_head_header_hash(batch: &mut Batch, hash: &B256) {
    batch.put(schema::HEAD_HEADER_KEY, hash.as_slice());
}

/// Head fast-block pointer.
pub fn read_head_fast_hash(store: &dyn KeyValueStore) -> Result<Option<B256>, StoreError> {
    read_pointer(store, schema::HEAD_FAST_KEY)
}

/// Records the head fast-block pointer.
pub fn write_head_fast_hash(batch: &mut Batch, hash: &B256) {
    batch.put(schema::HEAD_FAST_KEY, hash.as_slice());
}

/// Canonical inclusion entry for a transaction hash.
pub fn read_tx_lookup(
    store: &dyn KeyValueStore,
    tx_hash: &B256,
) -> Result<Option<TxLookupEntry>, StoreError> {
    let key = schema::tx_lookup_key(tx_hash);
    store.get(&key)?.map(|raw| decode(&key, &raw)).transpose()
}

/// Records the canonical inclusion of every transaction in `block`.
pub fn write_tx_lookups(batch: &mut Batch, block: &SealedBlock) {
    for (index, tx) in block.body.iter().enumerate() {
        let entry = TxLookupEntry {
            block_hash: block.hash(),
            block_number: block.number,
            index: index as u64,
        };
        batch.put(schema::tx_lookup_key(&tx.hash()), alloy_rlp::encode(entry));
    }
}

/// Removes the inclusion entry of one transaction.
pub fn delete_tx_lookup(batch: &mut Batch, tx_hash: &B256) {
    batch.delete(schema::tx_lookup_key(tx_hash));
}

/// ATXI build bookmark: highest block whose index entries are complete.
pub fn read_atxi_bookmark(store: &dyn KeyValueStore) -> Result<Option<BlockNumber>, StoreError> {
    store
        .get(schema::ATX_BOOKMARK_KEY)?
        .map(|raw| decode_number(schema::ATX_BOOKMARK_KEY, &raw))
        .transpose()
}

/// Records the ATXI build bookmark.
pub fn write_atxi_bookmark(batch: &mut Batch, number: BlockNumber) {
    batch.put(schema::ATX_BOOKMARK_KEY, number.to_le_bytes());
}

/// Folds the logs bloom of `number` into every mipmap level.
pub fn write_mipmap_bloom(
    store: &dyn KeyValueStore,
    batch: &mut Batch,
    number: BlockNumber,
    bloom: Bloom,
) -> Result<(), StoreError> {
    for level in MIPMAP_LEVELS {
        let key = schema::mipmap_bloom_key(level, number / level);
        let mut combined = match store.get(&key)? {
            Some(raw) if raw.len() == 256 => Bloom::from_slice(&raw),
            _ => Bloom::ZERO,
        };
        combined |= bloom;
        batch.put(key, combined.as_slice());
    }
    Ok(())
}

/// Reads one mipmap bloom cell.
pub fn read_mipmap_bloom(
    store: &dyn KeyValueStore,
    level: u64,
    number: BlockNumber,
) -> Result<Bloom, StoreError> {
    let key = schema::mipmap_bloom_key(level, number / level);
    Ok(match store.get(&key)? {
        Some(raw) if raw.len() == 256 => Bloom::from_slice(&raw),
        _ => Bloom::ZERO,
    })
}
