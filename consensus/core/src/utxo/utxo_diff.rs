use super::utxo_collection::{UtxoCollection, UtxoCollectionExtensions};
use super::utxo_error::{UtxoAlgebraError, UtxoResult};
use crate::tx::{TransactionOutpoint, UtxoEntry, ValidatedTransaction};
use serde::{Deserialize, Serialize};

pub trait ImmutableUtxoDiff {
    fn added(&self) -> &UtxoCollection;
    fn removed(&self) -> &UtxoCollection;
}

/// The delta between two UTXO sets: entries created and entries consumed.
/// Diffs compose associatively (`with_diff`) and reverse losslessly, which is
/// what reorg unwinding relies on.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoDiff {
    pub add: UtxoCollection,
    pub remove: UtxoCollection,
}

impl ImmutableUtxoDiff for UtxoDiff {
    fn added(&self) -> &UtxoCollection {
        &self.add
    }

    fn removed(&self) -> &UtxoCollection {
        &self.remove
    }
}

impl<T: ImmutableUtxoDiff> ImmutableUtxoDiff for &T {
    fn added(&self) -> &UtxoCollection {
        (*self).added()
    }
    fn removed(&self) -> &UtxoCollection {
        (*self).removed()
    }
}

/// A borrowed diff with add/remove swapped
pub struct ReversedUtxoDiff<'a> {
    inner: &'a UtxoDiff,
}

impl ImmutableUtxoDiff for ReversedUtxoDiff<'_> {
    fn added(&self) -> &UtxoCollection {
        &self.inner.remove
    }

    fn removed(&self) -> &UtxoCollection {
        &self.inner.add
    }
}

impl UtxoDiff {
    pub fn new(add: UtxoCollection, remove: UtxoCollection) -> Self {
        Self { add, remove }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    pub fn as_reversed(&self) -> ReversedUtxoDiff<'_> {
        ReversedUtxoDiff { inner: self }
    }

    pub fn to_reversed(self) -> Self {
        Self::new(self.remove, self.add)
    }

    pub fn with_diff(&self, other: &impl ImmutableUtxoDiff) -> UtxoResult<UtxoDiff> {
        let mut clone = self.clone();
        clone.with_diff_in_place(other)?;
        Ok(clone)
    }

    /// Applies `other` on top of this diff in-place, so that the result equals
    /// applying this diff and then `other` to the same base UTXO set.
    /// On error this diff is left partially composed and must be discarded.
    pub fn with_diff_in_place(&mut self, other: &impl ImmutableUtxoDiff) -> UtxoResult<()> {
        for (outpoint, entry) in other.removed().iter() {
            self.remove_entry(outpoint, entry)?;
        }
        for (outpoint, entry) in other.added().iter() {
            self.add_entry(*outpoint, entry.clone())?;
        }
        Ok(())
    }

    /// Adds the effect of a validated transaction: inputs move to the remove
    /// set, outputs to the add set, keyed with the creating block blue score
    pub fn add_transaction(&mut self, tx: &ValidatedTransaction, block_blue_score: u64) -> UtxoResult<()> {
        for (input, entry) in tx.tx.inputs.iter().zip(tx.entries.iter()) {
            self.remove_entry(&input.previous_outpoint, entry)?;
        }
        let is_coinbase = tx.tx.is_coinbase();
        for (index, output) in tx.tx.outputs.iter().enumerate() {
            let outpoint = TransactionOutpoint::new(tx.id(), index as u32);
            let entry = UtxoEntry::new(output.value, output.script_public_key.clone(), block_blue_score, is_coinbase);
            self.add_entry(outpoint, entry)?;
        }
        Ok(())
    }

    fn add_entry(&mut self, outpoint: TransactionOutpoint, entry: UtxoEntry) -> UtxoResult<()> {
        if self.remove.contains_exact(&outpoint, &entry) {
            self.remove.remove(&outpoint);
        } else if self.add.insert(outpoint, entry).is_some() {
            return Err(UtxoAlgebraError::DuplicateAddPoint(outpoint));
        }
        Ok(())
    }

    fn remove_entry(&mut self, outpoint: &TransactionOutpoint, entry: &UtxoEntry) -> UtxoResult<()> {
        if self.add.contains_exact(outpoint, entry) {
            self.add.remove(outpoint);
        } else if self.remove.insert(*outpoint, entry.clone()).is_some() {
            return Err(UtxoAlgebraError::DuplicateRemovePoint(*outpoint));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::ScriptPublicKey;

    fn entry(amount: u64) -> UtxoEntry {
        UtxoEntry::new(amount, ScriptPublicKey::hash_lock(b"k"), 0, false)
    }

    fn op(id: u64) -> TransactionOutpoint {
        TransactionOutpoint::new(id.into(), 0)
    }

    #[test]
    fn test_composition_cancels_roundtrip() {
        let diff = UtxoDiff::new(
            UtxoCollection::from_iter([(op(1), entry(1))]),
            UtxoCollection::from_iter([(op(2), entry(2))]),
        );
        let composed = diff.with_diff(&diff.as_reversed()).unwrap();
        assert!(composed.is_empty());
    }

    #[test]
    fn test_composition_chains() {
        // a creates x; b consumes x and creates y
        let a = UtxoDiff::new(UtxoCollection::from_iter([(op(1), entry(1))]), UtxoCollection::new());
        let b = UtxoDiff::new(
            UtxoCollection::from_iter([(op(2), entry(2))]),
            UtxoCollection::from_iter([(op(1), entry(1))]),
        );
        let composed = a.with_diff(&b).unwrap();
        assert_eq!(composed.add.len(), 1);
        assert!(composed.add.contains_key(&op(2)));
        assert!(composed.remove.is_empty());
    }

    #[test]
    fn test_double_remove_rejected() {
        let a = UtxoDiff::new(UtxoCollection::new(), UtxoCollection::from_iter([(op(1), entry(1))]));
        assert_eq!(a.with_diff(&a).unwrap_err(), UtxoAlgebraError::DuplicateRemovePoint(op(1)));
    }
}
