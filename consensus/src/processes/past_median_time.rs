use crate::model::stores::headers::HeaderStoreReader;
use braid_database::prelude::StoreResult;
use braid_hashes::Hash;
use std::sync::Arc;

#[derive(Clone)]
pub struct PastMedianTimeManager<V: HeaderStoreReader> {
    headers_store: Arc<V>,
    genesis_timestamp: u64,
}

impl<V: HeaderStoreReader> PastMedianTimeManager<V> {
    pub fn new(headers_store: Arc<V>, genesis_timestamp: u64) -> Self {
        Self { headers_store, genesis_timestamp }
    }

    /// The median timestamp of the given blue window. An empty window (the
    /// genesis position) yields the genesis timestamp.
    pub fn calc_past_median_time(&self, window: &[Hash]) -> StoreResult<u64> {
        if window.is_empty() {
            return Ok(self.genesis_timestamp);
        }
        let mut window_timestamps: Vec<u64> =
            window.iter().map(|hash| self.headers_store.get_timestamp(*hash)).collect::<StoreResult<_>>()?;
        window_timestamps.sort_unstable();
        Ok(window_timestamps[window_timestamps.len() / 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stores::headers::MemoryHeadersStore;
    use braid_consensus_core::header::Header;

    #[test]
    fn test_median_selection() {
        let store = Arc::new(MemoryHeadersStore::new());
        let timestamps = [500u64, 100, 300, 200, 400];
        let window: Vec<Hash> = (0..timestamps.len() as u64).map(|i| Hash::from(i + 1)).collect();
        for (hash, timestamp) in window.iter().zip(timestamps) {
            let mut header = Header::new(1, vec![], Hash::ZERO, Hash::ZERO, timestamp, 0, 0, 0, 0, Hash::ZERO);
            header.hash = *hash;
            store.insert(Arc::new(header));
        }
        let manager = PastMedianTimeManager::new(store, 42);
        assert_eq!(manager.calc_past_median_time(&[]).unwrap(), 42);
        assert_eq!(manager.calc_past_median_time(&window).unwrap(), 300);
    }
}
