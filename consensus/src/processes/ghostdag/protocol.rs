use super::ordering::SortableBlock;
use crate::model::services::reachability::ReachabilityService;
use crate::model::stores::ghostdag::{GhostdagData, GhostdagStoreReader};
use crate::model::stores::headers::HeaderStoreReader;
use crate::model::stores::relations::RelationsStoreReader;
use crate::processes::reachability::{ReachabilityError, Result};
use braid_consensus_core::difficulty::calc_work;
use braid_consensus_core::{blockhash, BlockHashMap, BlueWorkType, KType};
use braid_hashes::Hash;
use std::sync::Arc;

/// Implements the GHOSTDAG ordering protocol: given the parent set of a new
/// block it computes the selected parent, the blue/red partition of the merge
/// set under the k-cluster rule, and the accumulated blue score and work.
/// The output depends only on the DAG shape, never on delivery order.
#[derive(Clone)]
pub struct GhostdagManager<T: GhostdagStoreReader, S: RelationsStoreReader, U: ReachabilityService, V: HeaderStoreReader> {
    genesis_hash: Hash,
    pub(super) k: KType,
    pub(super) ghostdag_store: Arc<T>,
    pub(super) relations_store: S,
    pub(super) headers_store: Arc<V>,
    pub(super) reachability_service: U,
}

/// Whether `candidate` is preferred over `current` as a selected parent:
/// higher blue work, ties broken by lower hash
pub fn prefer_as_selected_parent(candidate: &SortableBlock, current: &SortableBlock) -> bool {
    candidate.blue_work > current.blue_work || (candidate.blue_work == current.blue_work && candidate.hash < current.hash)
}

/// The result of the k-cluster check for a single merge-set candidate
enum ColoringOutput {
    /// The candidate is blue, with its blue anticone size and the updated
    /// sizes of affected existing blues
    Blue(KType, BlockHashMap<KType>),
    Red,
}

impl<T: GhostdagStoreReader, S: RelationsStoreReader, U: ReachabilityService, V: HeaderStoreReader> GhostdagManager<T, S, U, V> {
    pub fn new(
        genesis_hash: Hash,
        k: KType,
        ghostdag_store: Arc<T>,
        relations_store: S,
        headers_store: Arc<V>,
        reachability_service: U,
    ) -> Self {
        Self { genesis_hash, k, ghostdag_store, relations_store, headers_store, reachability_service }
    }

    pub fn genesis_ghostdag_data(&self) -> GhostdagData {
        GhostdagData::genesis()
    }

    /// The selected parent is the parent with the highest blue work; ties are
    /// broken by the lowest hash
    pub fn find_selected_parent(&self, parents: &[Hash]) -> Result<Hash> {
        let mut best: Option<SortableBlock> = None;
        for parent in parents.iter().copied() {
            let sortable = SortableBlock::new(parent, self.ghostdag_store.get_blue_work(parent)?);
            if best.as_ref().is_none_or(|current| prefer_as_selected_parent(&sortable, current)) {
                best = Some(sortable);
            }
        }
        Ok(best.expect("parents must not be empty").hash)
    }

    pub fn sort_blocks(&self, blocks: impl Iterator<Item = Hash>) -> Result<Vec<Hash>> {
        let mut sortable: Vec<SortableBlock> = blocks
            .map(|hash| Ok(SortableBlock::new(hash, self.ghostdag_store.get_blue_work(hash)?)))
            .collect::<Result<_>>()?;
        sortable.sort();
        Ok(sortable.into_iter().map(|block| block.hash).collect())
    }

    /// Runs the GHOSTDAG protocol for a block with the given parents. All
    /// parents must already carry GHOSTDAG data.
    pub fn ghostdag(&self, parents: &[Hash]) -> Result<GhostdagData> {
        assert!(!parents.is_empty(), "genesis data is created via genesis_ghostdag_data");
        let selected_parent = self.find_selected_parent(parents)?;
        let mut new_block_data = GhostdagData::new_with_selected_parent(selected_parent, self.k);
        let ordered_mergeset = self.ordered_mergeset_without_selected_parent(selected_parent, parents)?;

        for blue_candidate in ordered_mergeset.iter().copied() {
            match self.check_blue_candidate(&new_block_data, blue_candidate)? {
                ColoringOutput::Blue(candidate_blue_anticone_size, candidate_blues_anticone_sizes) => {
                    new_block_data.add_blue(blue_candidate, candidate_blue_anticone_size, &candidate_blues_anticone_sizes);
                }
                ColoringOutput::Red => new_block_data.add_red(blue_candidate),
            }
        }

        let blue_score = self.ghostdag_store.get_blue_score(selected_parent)? + new_block_data.mergeset_blues.len() as u64;
        let added_blue_work: BlueWorkType = new_block_data
            .mergeset_blues
            .iter()
            .map(|blue| Ok(calc_work(self.headers_store.get_bits(*blue)?)))
            .sum::<Result<BlueWorkType>>()?;
        let blue_work = self.ghostdag_store.get_blue_work(selected_parent)? + added_blue_work;
        new_block_data.finalize_score_and_work(blue_score, blue_work);

        Ok(new_block_data)
    }

    /// Decides whether `blue_candidate` can join the blue set of the new
    /// block without breaking the k-cluster property: the candidate's blue
    /// anticone must not exceed k, and no existing blue may end up with a
    /// blue anticone above k.
    fn check_blue_candidate(&self, new_block_data: &GhostdagData, blue_candidate: Hash) -> Result<ColoringOutput> {
        // The maximum length of the blues of a k-cluster is k+1 (a chain
        // block plus k blues in its anticone)
        if new_block_data.mergeset_blues.len() as u64 == self.k as u64 + 1 {
            return Ok(ColoringOutput::Red);
        }

        let mut candidate_blues_anticone_sizes: BlockHashMap<KType> = BlockHashMap::with_capacity(self.k as usize);
        let mut candidate_blue_anticone_size: KType = 0;

        // Walk down the selected-parent chain of the new block, inspecting
        // the blues merged at each chain level
        let mut chain_hash: Option<Hash> = None;
        let mut chain_data: Option<Arc<GhostdagData>> = None;
        loop {
            // Once a chain block is an ancestor of the candidate, all deeper
            // blues are in the candidate's past and cannot be in its anticone
            if let Some(hash) = chain_hash {
                if hash == self.genesis_hash || self.reachability_service.is_dag_ancestor_of(hash, blue_candidate)? {
                    break;
                }
            }

            let data: &GhostdagData = chain_data.as_deref().unwrap_or(new_block_data);
            for block in data.mergeset_blues.iter().copied() {
                if self.reachability_service.is_dag_ancestor_of(block, blue_candidate)? {
                    // In the candidate's past, not in its anticone
                    continue;
                }

                candidate_blue_anticone_size += 1;
                if candidate_blue_anticone_size > self.k {
                    return Ok(ColoringOutput::Red);
                }

                let block_anticone_size = self.blue_anticone_size(block, new_block_data)?;
                candidate_blues_anticone_sizes.insert(block, block_anticone_size);
                if block_anticone_size == self.k {
                    // Adding the candidate would push `block` over k
                    return Ok(ColoringOutput::Red);
                }
                if block_anticone_size > self.k {
                    return Err(ReachabilityError::DataInconsistency("blue anticone size exceeds k"));
                }
            }

            let next_hash = data.selected_parent;
            if next_hash == blockhash::NONE {
                break;
            }
            chain_hash = Some(next_hash);
            chain_data = Some(self.ghostdag_store.get_data(next_hash)?);
        }

        Ok(ColoringOutput::Blue(candidate_blue_anticone_size, candidate_blues_anticone_sizes))
    }

    /// The size of the blue anticone of `block` from the point of view of
    /// the (in-construction) new block context: found on the chain level
    /// where `block` was merged
    fn blue_anticone_size(&self, block: Hash, context: &GhostdagData) -> Result<KType> {
        let mut current: Option<Arc<GhostdagData>> = None;
        loop {
            let data: &GhostdagData = current.as_deref().unwrap_or(context);
            if let Some(size) = data.blues_anticone_sizes.get(&block) {
                return Ok(*size);
            }
            if data.selected_parent == blockhash::NONE {
                return Err(ReachabilityError::DataInconsistency("block is expected to be in the blue set of its merging chain"));
            }
            current = Some(self.ghostdag_store.get_data(data.selected_parent)?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::services::reachability::MTReachabilityService;
    use crate::model::stores::ghostdag::MemoryGhostdagStore;
    use crate::model::stores::headers::MemoryHeadersStore;
    use crate::model::stores::reachability::MemoryReachabilityStore;
    use crate::model::stores::relations::MemoryRelationsStore;
    use crate::processes::reachability::inquirer;
    use braid_consensus_core::blockhash::ORIGIN;
    use braid_consensus_core::header::Header;
    use braid_consensus_core::BlockHashes;
    use parking_lot::RwLock;

    const GENESIS: u64 = 1;
    const TEST_BITS: u32 = 0x10ffffff;

    type TestManager = GhostdagManager<
        MemoryGhostdagStore,
        Arc<MemoryRelationsStore>,
        MTReachabilityService<MemoryReachabilityStore>,
        MemoryHeadersStore,
    >;

    struct TestDag {
        ghostdag_store: Arc<MemoryGhostdagStore>,
        relations_store: Arc<MemoryRelationsStore>,
        reachability: Arc<RwLock<MemoryReachabilityStore>>,
        headers_store: Arc<MemoryHeadersStore>,
        manager: TestManager,
    }

    impl TestDag {
        fn new(k: KType) -> Self {
            let ghostdag_store = Arc::new(MemoryGhostdagStore::new());
            let relations_store = Arc::new(MemoryRelationsStore::new());
            let reachability = Arc::new(RwLock::new(MemoryReachabilityStore::new()));
            let headers_store = Arc::new(MemoryHeadersStore::new());
            let manager = GhostdagManager::new(
                GENESIS.into(),
                k,
                Arc::clone(&ghostdag_store),
                Arc::clone(&relations_store),
                Arc::clone(&headers_store),
                MTReachabilityService::new(Arc::clone(&reachability)),
            );
            let dag = Self { ghostdag_store, relations_store, reachability, headers_store, manager };

            dag.headers_store.insert(Arc::new(dag.build_header(GENESIS.into(), vec![])));
            dag.relations_store.insert(GENESIS.into(), BlockHashes::new(vec![]));
            {
                let mut guard = dag.reachability.write();
                inquirer::init(&mut *guard, ORIGIN).unwrap();
                inquirer::add_block(&mut *guard, GENESIS.into(), ORIGIN, &[]).unwrap();
            }
            dag.ghostdag_store.insert(GENESIS.into(), Arc::new(dag.manager.genesis_ghostdag_data()));
            dag
        }

        fn build_header(&self, hash: Hash, parents: Vec<Hash>) -> Header {
            let mut header = Header::new(1, parents, Hash::ZERO, Hash::ZERO, 0, TEST_BITS, 0, 0, 0, Hash::ZERO);
            header.hash = hash;
            header
        }

        fn add_block(&self, hash: Hash, parents: &[Hash]) -> Arc<GhostdagData> {
            let data = Arc::new(self.manager.ghostdag(parents).unwrap());
            self.headers_store.insert(Arc::new(self.build_header(hash, parents.to_vec())));
            self.relations_store.insert(hash, BlockHashes::new(parents.to_vec()));
            {
                let mut guard = self.reachability.write();
                let mergeset: Vec<Hash> = data.unordered_mergeset_without_selected_parent().collect();
                inquirer::add_block(&mut *guard, hash, data.selected_parent, &mergeset).unwrap();
            }
            self.ghostdag_store.insert(hash, Arc::clone(&data));
            data
        }
    }

    #[test]
    fn test_sibling_merge_blue_scores() {
        let dag = TestDag::new(4);
        let a = dag.add_block(10.into(), &[GENESIS.into()]);
        let b = dag.add_block(11.into(), &[GENESIS.into()]);

        // Both siblings sit directly on genesis
        assert_eq!(a.blue_score, 1);
        assert_eq!(b.blue_score, 1);

        let c = dag.add_block(12.into(), &[10.into(), 11.into()]);
        // Equal blue work: the tie-break selects the lower hash
        assert_eq!(c.selected_parent, Hash::from(10u64));
        assert_eq!(&*c.mergeset_blues, &[10.into(), 11.into()]);
        assert!(c.mergeset_reds.is_empty());
        assert_eq!(c.blue_score, 3);
        assert!(c.blue_work > b.blue_work);
    }

    #[test]
    fn test_k_zero_rejects_any_anticone() {
        let dag = TestDag::new(0);
        dag.add_block(10.into(), &[GENESIS.into()]);
        dag.add_block(11.into(), &[GENESIS.into()]);
        let c = dag.add_block(12.into(), &[10.into(), 11.into()]);

        assert_eq!(c.selected_parent, Hash::from(10u64));
        assert_eq!(&*c.mergeset_blues, &[10.into()]);
        assert_eq!(&*c.mergeset_reds, &[11.into()]);
        assert_eq!(c.blue_score, 2);
    }

    #[test]
    fn test_k_cluster_saturation() {
        // Three parallel blocks merged under k = 1: only one of them can
        // join the blues beside the selected parent
        let dag = TestDag::new(1);
        dag.add_block(10.into(), &[GENESIS.into()]);
        dag.add_block(11.into(), &[GENESIS.into()]);
        dag.add_block(12.into(), &[GENESIS.into()]);
        let e = dag.add_block(13.into(), &[10.into(), 11.into(), 12.into()]);

        assert_eq!(e.selected_parent, Hash::from(10u64));
        assert_eq!(&*e.mergeset_blues, &[10.into(), 11.into()]);
        assert_eq!(&*e.mergeset_reds, &[12.into()]);
        assert_eq!(e.blue_score, 3);
        assert_eq!(e.blues_anticone_sizes[&10.into()], 1);
        assert_eq!(e.blues_anticone_sizes[&11.into()], 1);
    }

    #[test]
    fn test_delivery_order_independence() {
        let build = |order: &[(u64, Vec<u64>)]| {
            let dag = TestDag::new(2);
            for (hash, parents) in order.iter() {
                let parent_hashes: Vec<Hash> = parents.iter().map(|p| Hash::from(*p)).collect();
                dag.add_block((*hash).into(), &parent_hashes);
            }
            dag
        };

        // The same DAG shape delivered in two different topological orders
        let first = build(&[(10, vec![GENESIS]), (11, vec![GENESIS]), (12, vec![10, 11]), (13, vec![11]), (14, vec![12, 13])]);
        let second = build(&[(11, vec![GENESIS]), (13, vec![11]), (10, vec![GENESIS]), (12, vec![10, 11]), (14, vec![12, 13])]);

        for hash in [10u64, 11, 12, 13, 14] {
            let a = first.ghostdag_store.get_data(hash.into()).unwrap();
            let b = second.ghostdag_store.get_data(hash.into()).unwrap();
            assert_eq!(a.blue_score, b.blue_score, "blue score mismatch for {hash}");
            assert_eq!(a.blue_work, b.blue_work, "blue work mismatch for {hash}");
            assert_eq!(a.selected_parent, b.selected_parent, "selected parent mismatch for {hash}");
            assert_eq!(a.mergeset_blues, b.mergeset_blues, "blues mismatch for {hash}");
            assert_eq!(a.mergeset_reds, b.mergeset_reds, "reds mismatch for {hash}");
        }
    }
}
