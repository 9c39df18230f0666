use braid_consensus_core::tx::{TransactionOutpoint, UtxoEntry};
use braid_consensus_core::utxo::utxo_collection::UtxoCollection;
use braid_consensus_core::utxo::utxo_diff::ImmutableUtxoDiff;
use braid_consensus_core::utxo::utxo_view::UtxoView;
use braid_database::prelude::{BatchDbWriter, CachedDbAccess, StorePrefix, StoreResult, DB};
use braid_hashes::{Hash, HASH_SIZE};
use rocksdb::WriteBatch;
use std::sync::Arc;

/// Byte encoding of an outpoint: transaction id followed by the big-endian
/// output index, preserving (id, index) iteration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtxoKey([u8; HASH_SIZE + 4]);

impl AsRef<[u8]> for UtxoKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<TransactionOutpoint> for UtxoKey {
    fn from(outpoint: TransactionOutpoint) -> Self {
        let mut bytes = [0u8; HASH_SIZE + 4];
        bytes[..HASH_SIZE].copy_from_slice(outpoint.transaction_id.as_bytes());
        bytes[HASH_SIZE..].copy_from_slice(&outpoint.index.to_be_bytes());
        Self(bytes)
    }
}

impl From<UtxoKey> for TransactionOutpoint {
    fn from(key: UtxoKey) -> Self {
        let mut id = [0u8; HASH_SIZE];
        id.copy_from_slice(&key.0[..HASH_SIZE]);
        let mut index = [0u8; 4];
        index.copy_from_slice(&key.0[HASH_SIZE..]);
        TransactionOutpoint::new(Hash::from_bytes(id), u32::from_be_bytes(index))
    }
}

pub trait UtxoSetStoreReader {
    fn get(&self, outpoint: &TransactionOutpoint) -> StoreResult<UtxoEntry>;
    fn has(&self, outpoint: &TransactionOutpoint) -> StoreResult<bool>;
}

pub trait UtxoSetStore: UtxoSetStoreReader {
    /// Applies a diff: removals first, then additions, within one batch
    fn write_diff_batch(&self, batch: &mut WriteBatch, diff: &impl ImmutableUtxoDiff) -> StoreResult<()>;
}

/// The materialized UTXO set of the virtual block (or, with its own prefix,
/// of the pruning point). Mutated only through diffs committed by the single
/// writer.
#[derive(Clone)]
pub struct DbUtxoSetStore {
    access: Arc<CachedDbAccess<UtxoKey, UtxoEntry>>,
}

impl DbUtxoSetStore {
    pub fn new(db: Arc<DB>, cache_size: u64, prefix: StorePrefix) -> Self {
        Self { access: Arc::new(CachedDbAccess::new(db, cache_size, prefix.into())) }
    }

    /// Iterates the full set in outpoint order; used for snapshots and for
    /// commitment audits
    pub fn iterate_all(&self) -> StoreResult<UtxoCollection> {
        let mut collection = UtxoCollection::new();
        for item in self.access.iterator() {
            let (key_bytes, entry) = item.map_err(|err| braid_database::prelude::StoreError::DataInconsistency(err.to_string()))?;
            let mut key = [0u8; HASH_SIZE + 4];
            key.copy_from_slice(&key_bytes);
            collection.insert(UtxoKey(key).into(), entry);
        }
        Ok(collection)
    }
}

impl UtxoSetStoreReader for DbUtxoSetStore {
    fn get(&self, outpoint: &TransactionOutpoint) -> StoreResult<UtxoEntry> {
        self.access.read(UtxoKey::from(*outpoint))
    }

    fn has(&self, outpoint: &TransactionOutpoint) -> StoreResult<bool> {
        self.access.has(UtxoKey::from(*outpoint))
    }
}

impl UtxoSetStore for DbUtxoSetStore {
    fn write_diff_batch(&self, batch: &mut WriteBatch, diff: &impl ImmutableUtxoDiff) -> StoreResult<()> {
        for outpoint in diff.removed().keys() {
            self.access.delete(BatchDbWriter::new(batch), UtxoKey::from(*outpoint))?;
        }
        for (outpoint, entry) in diff.added().iter() {
            self.access.write(BatchDbWriter::new(batch), UtxoKey::from(*outpoint), entry.clone())?;
        }
        Ok(())
    }
}

/// A `UtxoView` adaptor over the materialized store
impl UtxoView for DbUtxoSetStore {
    fn get(&self, outpoint: &TransactionOutpoint) -> Option<UtxoEntry> {
        UtxoSetStoreReader::get(self, outpoint).ok()
    }
}
