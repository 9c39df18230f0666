use crate::model::stores::ghostdag::{GhostdagData, GhostdagStoreReader};
use braid_consensus_core::blockhash;
use braid_database::prelude::StoreResult;
use braid_hashes::Hash;
use std::sync::Arc;

/// Builds the blue window of a block: up to `size` blue blocks from its
/// past, gathered by walking its selected-parent chain downwards and taking
/// the blues merged at each chain level. Input for difficulty retargeting
/// and past-median-time.
#[derive(Clone)]
pub struct WindowManager<T: GhostdagStoreReader> {
    ghostdag_store: Arc<T>,
}

impl<T: GhostdagStoreReader> WindowManager<T> {
    pub fn new(ghostdag_store: Arc<T>) -> Self {
        Self { ghostdag_store }
    }

    /// The window of the block owning `high_data`, most recent blues first.
    /// Shorter than `size` when the past is shallow (near genesis).
    pub fn blue_window(&self, high_data: &GhostdagData, size: usize) -> StoreResult<Vec<Hash>> {
        let mut window = Vec::with_capacity(size);
        let mut current: Option<Arc<GhostdagData>> = None;
        loop {
            let data: &GhostdagData = current.as_deref().unwrap_or(high_data);
            for blue in data.mergeset_blues.iter().copied() {
                window.push(blue);
                if window.len() == size {
                    return Ok(window);
                }
            }
            if data.selected_parent == blockhash::NONE {
                // Genesis reached
                return Ok(window);
            }
            current = Some(self.ghostdag_store.get_data(data.selected_parent)?);
        }
    }
}
