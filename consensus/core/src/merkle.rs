use braid_hashes::{Hash, MerkleBranchHasher};

/// Computes the merkle root over the given hashes. An empty sequence yields
/// the zero hash; odd levels are padded with the zero hash.
pub fn calc_merkle_root(hashes: impl Iterator<Item = Hash>) -> Hash {
    let mut level: Vec<Hash> = hashes.collect();
    if level.is_empty() {
        return Hash::ZERO;
    }
    while level.len() > 1 {
        if level.len() % 2 != 0 {
            level.push(Hash::ZERO);
        }
        level = level.chunks_exact(2).map(|pair| merkle_hash(pair[0], pair[1])).collect();
    }
    level[0]
}

fn merkle_hash(left: Hash, right: Hash) -> Hash {
    let mut hasher = MerkleBranchHasher::new();
    hasher.write_hash(left).write_hash(right);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merkle_root_basics() {
        assert_eq!(calc_merkle_root(std::iter::empty()), Hash::ZERO);

        let single = calc_merkle_root([7.into()].into_iter());
        assert_eq!(single, Hash::from(7u64));

        let pair = calc_merkle_root([1.into(), 2.into()].into_iter());
        let pair_swapped = calc_merkle_root([2.into(), 1.into()].into_iter());
        assert_ne!(pair, pair_swapped);

        // Odd count: the third leaf is paired with the zero hash
        let odd = calc_merkle_root([1.into(), 2.into(), 3.into()].into_iter());
        let padded = calc_merkle_root([1.into(), 2.into(), 3.into(), Hash::ZERO].into_iter());
        assert_eq!(odd, padded);
    }
}
