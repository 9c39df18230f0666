use crate::processes::ghostdag::ordering::SortableBlock;
use braid_consensus_core::{BlockHashMap, BlockHashes, BlueWorkType, KType};
use braid_database::prelude::{BatchDbWriter, CachedDbAccess, DbKey, StorePrefix, StoreError, StoreResult, DB};
use braid_hashes::Hash;
use itertools::EitherOrBoth::{Both, Left, Right};
use itertools::Itertools;
use parking_lot::RwLock;
use rocksdb::WriteBatch;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type HashKTypeMap = Arc<BlockHashMap<KType>>;

/// The GHOSTDAG metadata of a block: its ordering position and the blue/red
/// partition of its merge set.
#[derive(Clone, Serialize, Deserialize)]
pub struct GhostdagData {
    pub blue_score: u64,
    pub blue_work: BlueWorkType,
    pub selected_parent: Hash,
    /// Ascending consensus order; the first element is the selected parent
    pub mergeset_blues: BlockHashes,
    /// Ascending consensus order
    pub mergeset_reds: BlockHashes,
    pub blues_anticone_sizes: HashKTypeMap,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct CompactGhostdagData {
    pub blue_score: u64,
    pub blue_work: BlueWorkType,
    pub selected_parent: Hash,
}

impl GhostdagData {
    pub fn new(
        blue_score: u64,
        blue_work: BlueWorkType,
        selected_parent: Hash,
        mergeset_blues: BlockHashes,
        mergeset_reds: BlockHashes,
        blues_anticone_sizes: HashKTypeMap,
    ) -> Self {
        Self { blue_score, blue_work, selected_parent, mergeset_blues, mergeset_reds, blues_anticone_sizes }
    }

    /// The fixed data of the genesis block: zero score and work, no selected
    /// parent, empty merge set
    pub fn genesis() -> Self {
        Self::new(0, 0, braid_consensus_core::blockhash::NONE, Default::default(), Default::default(), Default::default())
    }

    /// Initial data for a block whose merge set holds (so far) only its
    /// selected parent
    pub fn new_with_selected_parent(selected_parent: Hash, k: KType) -> Self {
        let mut mergeset_blues: Vec<Hash> = Vec::with_capacity(k as usize + 1);
        let mut blues_anticone_sizes: BlockHashMap<KType> = BlockHashMap::with_capacity(k as usize);
        mergeset_blues.push(selected_parent);
        blues_anticone_sizes.insert(selected_parent, 0);

        Self {
            blue_score: Default::default(),
            blue_work: Default::default(),
            selected_parent,
            mergeset_blues: BlockHashes::new(mergeset_blues),
            mergeset_reds: Default::default(),
            blues_anticone_sizes: HashKTypeMap::new(blues_anticone_sizes),
        }
    }

    pub fn mergeset_size(&self) -> usize {
        self.mergeset_blues.len() + self.mergeset_reds.len()
    }

    /// Adds a blue block to the merge set, registering its blue anticone size
    /// and bumping the counters of the blues it is in the anticone of
    pub fn add_blue(&mut self, block: Hash, blue_anticone_size: KType, block_blues_anticone_sizes: &BlockHashMap<KType>) {
        BlockHashes::make_mut(&mut self.mergeset_blues).push(block);
        let blues_anticone_sizes = HashKTypeMap::make_mut(&mut self.blues_anticone_sizes);
        blues_anticone_sizes.insert(block, blue_anticone_size);
        for (blue, size) in block_blues_anticone_sizes {
            blues_anticone_sizes.insert(*blue, size + 1);
        }
    }

    pub fn add_red(&mut self, block: Hash) {
        BlockHashes::make_mut(&mut self.mergeset_reds).push(block);
    }

    pub fn finalize_score_and_work(&mut self, blue_score: u64, blue_work: BlueWorkType) {
        self.blue_score = blue_score;
        self.blue_work = blue_work;
    }

    /// The merge set in ascending consensus order (blues and reds interleaved
    /// by blue work), excluding the selected parent
    pub fn ascending_mergeset_without_selected_parent<'a>(
        &'a self,
        store: &'a (impl GhostdagStoreReader + ?Sized),
    ) -> impl Iterator<Item = SortableBlock> + 'a {
        self.mergeset_blues
            .iter()
            .skip(1)
            .cloned()
            .map(|h| SortableBlock::new(h, store.get_blue_work(h).unwrap()))
            .merge_join_by(
                self.mergeset_reds.iter().cloned().map(|h| SortableBlock::new(h, store.get_blue_work(h).unwrap())),
                |a, b| a.cmp(b),
            )
            .map(|r| match r {
                Left(b) | Right(b) => b,
                Both(_, _) => panic!("distinct blocks are never equal"),
            })
    }

    /// The merge set with no specified order, selected parent excluded
    pub fn unordered_mergeset_without_selected_parent(&self) -> impl Iterator<Item = Hash> + '_ {
        self.mergeset_blues.iter().skip(1).cloned().chain(self.mergeset_reds.iter().cloned())
    }

    pub fn to_compact(&self) -> CompactGhostdagData {
        CompactGhostdagData { blue_score: self.blue_score, blue_work: self.blue_work, selected_parent: self.selected_parent }
    }
}

pub trait GhostdagStoreReader {
    fn get_blue_score(&self, hash: Hash) -> StoreResult<u64>;
    fn get_blue_work(&self, hash: Hash) -> StoreResult<BlueWorkType>;
    fn get_selected_parent(&self, hash: Hash) -> StoreResult<Hash>;
    fn get_data(&self, hash: Hash) -> StoreResult<Arc<GhostdagData>>;
    fn get_compact_data(&self, hash: Hash) -> StoreResult<CompactGhostdagData>;
    fn has(&self, hash: Hash) -> StoreResult<bool>;
}

pub trait GhostdagStore: GhostdagStoreReader {
    /// Insert GHOSTDAG data of a new block. Data is append-only.
    fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, data: Arc<GhostdagData>) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct DbGhostdagStore {
    access: Arc<CachedDbAccess<Hash, Arc<GhostdagData>>>,
    compact_access: Arc<CachedDbAccess<Hash, CompactGhostdagData>>,
}

impl DbGhostdagStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self {
            access: Arc::new(CachedDbAccess::new(Arc::clone(&db), cache_size, StorePrefix::Ghostdag.into())),
            compact_access: Arc::new(CachedDbAccess::new(db, cache_size, StorePrefix::GhostdagCompact.into())),
        }
    }
}

impl GhostdagStoreReader for DbGhostdagStore {
    fn get_blue_score(&self, hash: Hash) -> StoreResult<u64> {
        Ok(self.compact_access.read(hash)?.blue_score)
    }

    fn get_blue_work(&self, hash: Hash) -> StoreResult<BlueWorkType> {
        Ok(self.compact_access.read(hash)?.blue_work)
    }

    fn get_selected_parent(&self, hash: Hash) -> StoreResult<Hash> {
        Ok(self.compact_access.read(hash)?.selected_parent)
    }

    fn get_data(&self, hash: Hash) -> StoreResult<Arc<GhostdagData>> {
        self.access.read(hash)
    }

    fn get_compact_data(&self, hash: Hash) -> StoreResult<CompactGhostdagData> {
        self.compact_access.read(hash)
    }

    fn has(&self, hash: Hash) -> StoreResult<bool> {
        self.compact_access.has(hash)
    }
}

impl GhostdagStore for DbGhostdagStore {
    fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, data: Arc<GhostdagData>) -> StoreResult<()> {
        if self.access.has(hash)? {
            return Err(StoreError::KeyAlreadyExists(hash.to_string()));
        }
        self.access.write(BatchDbWriter::new(batch), hash, Arc::clone(&data))?;
        self.compact_access.write(BatchDbWriter::new(batch), hash, data.to_compact())?;
        Ok(())
    }
}

/// An in-memory implementation used by process-level unit tests
#[derive(Default)]
pub struct MemoryGhostdagStore {
    map: RwLock<BlockHashMap<Arc<GhostdagData>>>,
}

impl MemoryGhostdagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, hash: Hash, data: Arc<GhostdagData>) {
        self.map.write().insert(hash, data);
    }

    fn read(&self, hash: Hash) -> StoreResult<Arc<GhostdagData>> {
        match self.map.read().get(&hash) {
            Some(data) => Ok(Arc::clone(data)),
            None => Err(StoreError::KeyNotFound(DbKey::new(StorePrefix::Ghostdag.as_ref(), hash))),
        }
    }
}

impl GhostdagStoreReader for MemoryGhostdagStore {
    fn get_blue_score(&self, hash: Hash) -> StoreResult<u64> {
        Ok(self.read(hash)?.blue_score)
    }

    fn get_blue_work(&self, hash: Hash) -> StoreResult<BlueWorkType> {
        Ok(self.read(hash)?.blue_work)
    }

    fn get_selected_parent(&self, hash: Hash) -> StoreResult<Hash> {
        Ok(self.read(hash)?.selected_parent)
    }

    fn get_data(&self, hash: Hash) -> StoreResult<Arc<GhostdagData>> {
        self.read(hash)
    }

    fn get_compact_data(&self, hash: Hash) -> StoreResult<CompactGhostdagData> {
        Ok(self.read(hash)?.to_compact())
    }

    fn has(&self, hash: Hash) -> StoreResult<bool> {
        Ok(self.map.read().contains_key(&hash))
    }
}
