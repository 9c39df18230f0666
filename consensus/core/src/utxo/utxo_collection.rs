use crate::tx::{TransactionOutpoint, UtxoEntry};
use std::collections::HashMap;

pub type UtxoCollection = HashMap<TransactionOutpoint, UtxoEntry>;

pub trait UtxoCollectionExtensions {
    /// Checks if `outpoint` exists with an entry equal to `entry`
    fn contains_exact(&self, outpoint: &TransactionOutpoint, entry: &UtxoEntry) -> bool;

    /// Adds all entries from `other` to `self`, overriding on key collision
    fn add_many(&mut self, other: &Self);

    /// Removes all keys of `other` from `self` (`self - other` over keys)
    fn remove_many(&mut self, other: &Self);

    /// Whether the key intersection of the two collections is non-empty
    fn intersects(&self, other: &Self) -> bool;
}

impl UtxoCollectionExtensions for UtxoCollection {
    fn contains_exact(&self, outpoint: &TransactionOutpoint, entry: &UtxoEntry) -> bool {
        self.get(outpoint).is_some_and(|existing| existing == entry)
    }

    fn add_many(&mut self, other: &Self) {
        for (outpoint, entry) in other.iter() {
            self.insert(*outpoint, entry.clone());
        }
    }

    fn remove_many(&mut self, other: &Self) {
        for outpoint in other.keys() {
            self.remove(outpoint);
        }
    }

    fn intersects(&self, other: &Self) -> bool {
        // Iterate over the smaller collection
        let (keys, other) = if self.len() <= other.len() { (self.keys(), other) } else { (other.keys(), self) };
        keys.into_iter().any(|k| other.contains_key(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::ScriptPublicKey;

    fn entry(amount: u64) -> UtxoEntry {
        UtxoEntry::new(amount, ScriptPublicKey::hash_lock(b"k"), 0, false)
    }

    #[test]
    fn test_collection_algebra() {
        let op = |id: u64, index| TransactionOutpoint::new(id.into(), index);

        let mut a = UtxoCollection::from_iter([(op(1, 0), entry(1)), (op(2, 0), entry(2))]);
        let b = UtxoCollection::from_iter([(op(2, 0), entry(20)), (op(3, 0), entry(3))]);

        assert!(a.intersects(&b));
        a.add_many(&b);
        assert_eq!(a.len(), 3);
        assert!(a.contains_exact(&op(2, 0), &entry(20)));

        a.remove_many(&b);
        assert_eq!(a.len(), 1);
        assert!(a.contains_key(&op(1, 0)));
        assert!(!a.intersects(&b));
    }
}
