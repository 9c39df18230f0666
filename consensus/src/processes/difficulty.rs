use crate::model::stores::headers::HeaderStoreReader;
use braid_consensus_core::difficulty::{compact_to_target, target_to_compact, MAX_TARGET};
use braid_database::prelude::StoreResult;
use braid_hashes::Hash;
use std::sync::Arc;

/// Computes the expected difficulty of a block position from the average
/// target of its blue window, scaled by the ratio between the observed and
/// the expected window duration (unsampled legacy retargeting).
#[derive(Clone)]
pub struct DifficultyManager<V: HeaderStoreReader> {
    headers_store: Arc<V>,
    genesis_bits: u32,
    min_window_size: usize,
    target_time_per_block_ms: u64,
}

impl<V: HeaderStoreReader> DifficultyManager<V> {
    pub fn new(headers_store: Arc<V>, genesis_bits: u32, min_window_size: usize, target_time_per_block_ms: u64) -> Self {
        Self { headers_store, genesis_bits, min_window_size, target_time_per_block_ms }
    }

    pub fn expected_difficulty_bits(&self, window: &[Hash]) -> StoreResult<u32> {
        if window.len() < self.min_window_size {
            return Ok(self.genesis_bits);
        }

        let mut min_timestamp = u64::MAX;
        let mut max_timestamp = 0u64;
        let mut average_target = 0u128;
        let mut target_remainders = 0u128;
        let window_len = window.len() as u128;
        for block in window.iter().copied() {
            let header = self.headers_store.get_header(block)?;
            min_timestamp = min_timestamp.min(header.timestamp);
            max_timestamp = max_timestamp.max(header.timestamp);
            // Per-element division keeps the sum within the 128-bit space
            let target = compact_to_target(header.bits).unwrap_or(MAX_TARGET);
            average_target += target / window_len;
            target_remainders += target % window_len;
        }
        average_target += target_remainders / window_len;

        let actual_duration = (max_timestamp - min_timestamp).max(1) as u128;
        let expected_duration = (self.target_time_per_block_ms as u128) * (window_len - 1).max(1);

        // average_target * actual / expected, without a 256-bit intermediate
        let quotient = average_target / expected_duration;
        let remainder = average_target % expected_duration;
        let new_target = quotient
            .checked_mul(actual_duration)
            .and_then(|scaled| scaled.checked_add(remainder * actual_duration / expected_duration))
            .unwrap_or(MAX_TARGET)
            .min(MAX_TARGET);

        Ok(target_to_compact(new_target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stores::headers::MemoryHeadersStore;
    use braid_consensus_core::header::Header;

    fn setup(timestamps: &[u64], bits: u32) -> (DifficultyManager<MemoryHeadersStore>, Vec<Hash>) {
        let store = Arc::new(MemoryHeadersStore::new());
        let window: Vec<Hash> = (0..timestamps.len() as u64).map(|i| Hash::from(i + 1)).collect();
        for (hash, timestamp) in window.iter().zip(timestamps) {
            let mut header = Header::new(1, vec![], Hash::ZERO, Hash::ZERO, *timestamp, bits, 0, 0, 0, Hash::ZERO);
            header.hash = *hash;
            store.insert(Arc::new(header));
        }
        (DifficultyManager::new(store, target_to_compact(MAX_TARGET >> 16), 4, 1000), window)
    }

    #[test]
    fn test_short_window_keeps_genesis_bits() {
        let (manager, window) = setup(&[0, 1000], 0x0cffffff);
        assert_eq!(manager.expected_difficulty_bits(&window).unwrap(), target_to_compact(MAX_TARGET >> 16));
    }

    #[test]
    fn test_on_schedule_keeps_target() {
        let bits = target_to_compact(MAX_TARGET >> 16);
        // Nine blocks spaced exactly at the 1000ms target pace
        let timestamps: Vec<u64> = (0..9u64).map(|i| i * 1000).collect();
        let (manager, window) = setup(&timestamps, bits);
        assert_eq!(manager.expected_difficulty_bits(&window).unwrap(), bits);
    }

    #[test]
    fn test_fast_blocks_tighten_target() {
        let bits = target_to_compact(MAX_TARGET >> 16);
        // Blocks coming twice as fast as the target pace
        let timestamps: Vec<u64> = (0..9u64).map(|i| i * 500).collect();
        let (manager, window) = setup(&timestamps, bits);
        let new_bits = manager.expected_difficulty_bits(&window).unwrap();
        assert!(compact_to_target(new_bits).unwrap() < compact_to_target(bits).unwrap());
    }

    #[test]
    fn test_slow_blocks_loosen_target() {
        let bits = target_to_compact(MAX_TARGET >> 16);
        let timestamps: Vec<u64> = (0..9u64).map(|i| i * 4000).collect();
        let (manager, window) = setup(&timestamps, bits);
        let new_bits = manager.expected_difficulty_bits(&window).unwrap();
        assert!(compact_to_target(new_bits).unwrap() > compact_to_target(bits).unwrap());
    }
}
