use super::utxo_collection::UtxoCollection;
use super::utxo_diff::ImmutableUtxoDiff;
use crate::tx::{TransactionOutpoint, UtxoEntry};

/// A read-only view over some UTXO state
pub trait UtxoView {
    fn get(&self, outpoint: &TransactionOutpoint) -> Option<UtxoEntry>;

    /// Layers a diff over this view, yielding the state after the diff
    fn compose<D: ImmutableUtxoDiff>(&self, diff: D) -> ComposedUtxoView<'_, Self, D>
    where
        Self: Sized,
    {
        ComposedUtxoView { base: self, diff }
    }
}

impl UtxoView for UtxoCollection {
    fn get(&self, outpoint: &TransactionOutpoint) -> Option<UtxoEntry> {
        std::collections::HashMap::get(self, outpoint).cloned()
    }
}

/// A base view with a diff layered on top: removed outpoints disappear,
/// added outpoints take precedence
pub struct ComposedUtxoView<'a, V: UtxoView, D: ImmutableUtxoDiff> {
    base: &'a V,
    diff: D,
}

impl<V: UtxoView, D: ImmutableUtxoDiff> UtxoView for ComposedUtxoView<'_, V, D> {
    fn get(&self, outpoint: &TransactionOutpoint) -> Option<UtxoEntry> {
        if let Some(entry) = self.diff.added().get(outpoint) {
            return Some(entry.clone());
        }
        if self.diff.removed().contains_key(outpoint) {
            return None;
        }
        self.base.get(outpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::ScriptPublicKey;
    use crate::utxo::utxo_diff::UtxoDiff;

    fn entry(amount: u64) -> UtxoEntry {
        UtxoEntry::new(amount, ScriptPublicKey::hash_lock(b"k"), 0, false)
    }

    #[test]
    fn test_composed_lookup() {
        let op = |id: u64| TransactionOutpoint::new(id.into(), 0);
        let base = UtxoCollection::from_iter([(op(1), entry(1)), (op(2), entry(2))]);
        let diff = UtxoDiff::new(
            UtxoCollection::from_iter([(op(3), entry(3))]),
            UtxoCollection::from_iter([(op(1), entry(1))]),
        );
        let view = base.compose(&diff);
        assert!(view.get(&op(1)).is_none());
        assert_eq!(view.get(&op(2)).unwrap().amount, 2);
        assert_eq!(view.get(&op(3)).unwrap().amount, 3);
    }
}
