//! Canonical serialization of consensus objects into their hash domains.

use crate::header::Header;
use crate::tx::{Transaction, TransactionId, TransactionOutpoint, UtxoEntry};
use braid_hashes::{Hash, HeaderHasher, ScriptLockHasher, TransactionHasher, UtxoEntryHasher};

/// Hashes a header over all consensus fields (the nonce included)
pub fn header_hash(header: &Header) -> Hash {
    let mut hasher = HeaderHasher::new();
    hasher.update(header.version.to_le_bytes()).update((header.parents.len() as u64).to_le_bytes());
    for parent in header.parents.iter() {
        hasher.write_hash(*parent);
    }
    hasher
        .write_hash(header.hash_merkle_root)
        .write_hash(header.utxo_commitment)
        .update(header.timestamp.to_le_bytes())
        .update(header.bits.to_le_bytes())
        .update(header.nonce.to_le_bytes())
        .update(header.blue_score.to_le_bytes())
        .update(header.blue_work.to_le_bytes())
        .write_hash(header.pruning_point);
    hasher.finalize()
}

pub fn tx_id(tx: &Transaction) -> TransactionId {
    let mut hasher = TransactionHasher::new();
    hasher.update((tx.inputs.len() as u64).to_le_bytes());
    for input in tx.inputs.iter() {
        hasher
            .write_hash(input.previous_outpoint.transaction_id)
            .update(input.previous_outpoint.index.to_le_bytes())
            .update((input.signature_script.len() as u64).to_le_bytes())
            .update(&input.signature_script);
    }
    hasher.update((tx.outputs.len() as u64).to_le_bytes());
    for output in tx.outputs.iter() {
        hasher
            .update(output.value.to_le_bytes())
            .update(output.script_public_key.version.to_le_bytes())
            .update((output.script_public_key.script.len() as u64).to_le_bytes())
            .update(&output.script_public_key.script);
    }
    hasher.update(tx.lock_time.to_le_bytes()).update((tx.payload.len() as u64).to_le_bytes()).update(&tx.payload);
    hasher.finalize()
}

/// The digest a signature script must preimage in order to satisfy a
/// hash-locked script public key
pub fn script_lock_digest(unlock_data: &[u8]) -> Hash {
    let mut hasher = ScriptLockHasher::new();
    hasher.update(unlock_data);
    hasher.finalize()
}

/// Hashes a single (outpoint, entry) pair of the UTXO set
pub fn utxo_entry_digest(outpoint: &TransactionOutpoint, entry: &UtxoEntry) -> Hash {
    let mut hasher = UtxoEntryHasher::new();
    hasher
        .write_hash(outpoint.transaction_id)
        .update(outpoint.index.to_le_bytes())
        .update(entry.amount.to_le_bytes())
        .update(entry.script_public_key.version.to_le_bytes())
        .update((entry.script_public_key.script.len() as u64).to_le_bytes())
        .update(&entry.script_public_key.script)
        .update(entry.block_blue_score.to_le_bytes())
        .update([entry.is_coinbase as u8]);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::{ScriptPublicKey, TransactionOutput};

    #[test]
    fn test_tx_id_sensitivity() {
        let base = Transaction::new(vec![], vec![TransactionOutput::new(1, ScriptPublicKey::hash_lock(b"k"))], 0, vec![]);
        let mut other = base.clone();
        other.payload = vec![1];
        other.finalize();
        assert_ne!(base.id(), other.id());
    }

    #[test]
    fn test_utxo_entry_digest_is_keyed_by_outpoint() {
        let entry = UtxoEntry::new(5, ScriptPublicKey::hash_lock(b"k"), 1, false);
        let a = utxo_entry_digest(&TransactionOutpoint::new(1.into(), 0), &entry);
        let b = utxo_entry_digest(&TransactionOutpoint::new(1.into(), 1), &entry);
        assert_ne!(a, b);
    }
}
