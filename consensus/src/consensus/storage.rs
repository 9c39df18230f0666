use crate::constants::DEFAULT_CACHE_SIZE;
use crate::model::stores::block_transactions::DbBlockTransactionsStore;
use crate::model::stores::ghostdag::DbGhostdagStore;
use crate::model::stores::headers::DbHeadersStore;
use crate::model::stores::pruning::{DbPastPruningPointsStore, DbPruningStore};
use crate::model::stores::reachability::DbReachabilityStore;
use crate::model::stores::relations::DbRelationsStore;
use crate::model::stores::statuses::DbStatusesStore;
use crate::model::stores::tips::DbTipsStore;
use crate::model::stores::utxo_diffs::DbUtxoDiffsStore;
use crate::model::stores::utxo_set::DbUtxoSetStore;
use crate::model::stores::virtual_state::DbVirtualStateStore;
use braid_database::prelude::{StorePrefix, DB};
use parking_lot::RwLock;
use std::sync::Arc;

/// Owns all consensus stores over the shared DB instance. The arena of block
/// data: every cross-reference between blocks is a hash looked up here,
/// never an owning pointer.
pub struct ConsensusStorage {
    pub db: Arc<DB>,

    pub statuses_store: Arc<RwLock<DbStatusesStore>>,
    pub relations_store: Arc<DbRelationsStore>,
    pub reachability_store: Arc<RwLock<DbReachabilityStore>>,
    pub ghostdag_store: Arc<DbGhostdagStore>,
    pub headers_store: Arc<DbHeadersStore>,
    pub block_transactions_store: Arc<DbBlockTransactionsStore>,
    pub tips_store: Arc<RwLock<DbTipsStore>>,
    pub utxo_diffs_store: Arc<DbUtxoDiffsStore>,
    pub virtual_utxo_store: Arc<DbUtxoSetStore>,
    pub virtual_state_store: Arc<DbVirtualStateStore>,
    pub pruning_store: Arc<RwLock<DbPruningStore>>,
    pub past_pruning_points_store: Arc<DbPastPruningPointsStore>,
}

impl ConsensusStorage {
    pub fn new(db: Arc<DB>) -> Arc<Self> {
        let cache_size = DEFAULT_CACHE_SIZE;
        Arc::new(Self {
            statuses_store: Arc::new(RwLock::new(DbStatusesStore::new(Arc::clone(&db), cache_size))),
            relations_store: Arc::new(DbRelationsStore::new(Arc::clone(&db), cache_size)),
            reachability_store: Arc::new(RwLock::new(DbReachabilityStore::new(Arc::clone(&db), cache_size))),
            ghostdag_store: Arc::new(DbGhostdagStore::new(Arc::clone(&db), cache_size)),
            headers_store: Arc::new(DbHeadersStore::new(Arc::clone(&db), cache_size)),
            block_transactions_store: Arc::new(DbBlockTransactionsStore::new(Arc::clone(&db), cache_size)),
            tips_store: Arc::new(RwLock::new(DbTipsStore::new(Arc::clone(&db)))),
            utxo_diffs_store: Arc::new(DbUtxoDiffsStore::new(Arc::clone(&db), cache_size)),
            virtual_utxo_store: Arc::new(DbUtxoSetStore::new(Arc::clone(&db), cache_size, StorePrefix::VirtualUtxoSet)),
            virtual_state_store: Arc::new(DbVirtualStateStore::new(Arc::clone(&db))),
            pruning_store: Arc::new(RwLock::new(DbPruningStore::new(Arc::clone(&db)))),
            past_pruning_points_store: Arc::new(DbPastPruningPointsStore::new(Arc::clone(&db), cache_size)),
            db,
        })
    }
}
