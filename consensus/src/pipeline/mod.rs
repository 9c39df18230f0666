pub mod body_processor;
pub mod header_processor;
pub mod pruning_processor;
pub mod virtual_processor;

use crate::model::services::reachability::MTReachabilityService;
use crate::model::stores::ghostdag::DbGhostdagStore;
use crate::model::stores::headers::DbHeadersStore;
use crate::model::stores::reachability::DbReachabilityStore;
use crate::model::stores::relations::DbRelationsStore;
use crate::processes::ghostdag::protocol::GhostdagManager;
use crate::processes::pruning::PruningManager;
use std::sync::Arc;

pub type DbReachabilityService = MTReachabilityService<DbReachabilityStore>;
pub type DbGhostdagManager = GhostdagManager<DbGhostdagStore, Arc<DbRelationsStore>, DbReachabilityService, DbHeadersStore>;
pub type DbPruningManager = PruningManager<DbGhostdagStore, DbReachabilityService>;
