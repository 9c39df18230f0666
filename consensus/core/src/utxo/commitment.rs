use super::utxo_diff::ImmutableUtxoDiff;
use crate::hashing;
use crate::tx::{TransactionOutpoint, UtxoEntry};
use braid_hashes::{Hash, HASH_SIZE};
use serde::{Deserialize, Serialize};

/// An order-independent digest of a UTXO multiset: the XOR-fold of the
/// per-entry digests. Adding and removing an entry are the same involution,
/// so the commitment can be advanced incrementally by diffs in any order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoCommitment([u8; HASH_SIZE]);

impl UtxoCommitment {
    pub const EMPTY: UtxoCommitment = UtxoCommitment([0u8; HASH_SIZE]);

    pub fn add_entry(&mut self, outpoint: &TransactionOutpoint, entry: &UtxoEntry) {
        self.toggle(hashing::utxo_entry_digest(outpoint, entry));
    }

    pub fn remove_entry(&mut self, outpoint: &TransactionOutpoint, entry: &UtxoEntry) {
        self.toggle(hashing::utxo_entry_digest(outpoint, entry));
    }

    pub fn apply_diff(&mut self, diff: &impl ImmutableUtxoDiff) {
        for (outpoint, entry) in diff.removed().iter() {
            self.remove_entry(outpoint, entry);
        }
        for (outpoint, entry) in diff.added().iter() {
            self.add_entry(outpoint, entry);
        }
    }

    pub fn finalize(&self) -> Hash {
        Hash::from_bytes(self.0)
    }

    fn toggle(&mut self, digest: Hash) {
        for (state_byte, digest_byte) in self.0.iter_mut().zip(digest.as_bytes()) {
            *state_byte ^= digest_byte;
        }
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
    fn test_order_independence() {
        let mut a = UtxoCommitment::EMPTY;
        a.add_entry(&op(1), &entry(1));
        a.add_entry(&op(2), &entry(2));

        let mut b = UtxoCommitment::EMPTY;
        b.add_entry(&op(2), &entry(2));
        b.add_entry(&op(1), &entry(1));

        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_add_remove_cancels() {
        let mut commitment = UtxoCommitment::EMPTY;
        commitment.add_entry(&op(1), &entry(1));
        commitment.remove_entry(&op(1), &entry(1));
        assert_eq!(commitment, UtxoCommitment::EMPTY);
    }
}
