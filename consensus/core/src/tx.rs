use crate::hashing;
use braid_hashes::Hash;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::{Display, Formatter};

pub type TransactionId = Hash;

/// Holds the script bytes locking an output. Script matching is by the
/// hash-lock rule: spending requires a signature script whose script-lock
/// digest equals these bytes.
pub type ScriptVec = SmallVec<[u8; 36]>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct ScriptPublicKey {
    pub version: u16,
    pub script: ScriptVec,
}

impl ScriptPublicKey {
    pub fn new(version: u16, script: ScriptVec) -> Self {
        Self { version, script }
    }

    /// Builds the script locking an output to the holder of `unlock_preimage`
    pub fn hash_lock(unlock_preimage: &[u8]) -> Self {
        Self { version: 0, script: SmallVec::from_slice(hashing::script_lock_digest(unlock_preimage).as_bytes()) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionOutpoint {
    pub transaction_id: TransactionId,
    pub index: u32,
}

impl TransactionOutpoint {
    pub fn new(transaction_id: TransactionId, index: u32) -> Self {
        Self { transaction_id, index }
    }
}

impl Display for TransactionOutpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.transaction_id, self.index)
    }
}

/// A UTXO set entry: everything needed to validate a spend of the outpoint
/// it is keyed by.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub amount: u64,
    pub script_public_key: ScriptPublicKey,
    /// Blue score of the block creating this output, used for maturity rules
    pub block_blue_score: u64,
    pub is_coinbase: bool,
}

impl UtxoEntry {
    pub fn new(amount: u64, script_public_key: ScriptPublicKey, block_blue_score: u64, is_coinbase: bool) -> Self {
        Self { amount, script_public_key, block_blue_score, is_coinbase }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub previous_outpoint: TransactionOutpoint,
    pub signature_script: Vec<u8>,
}

impl TransactionInput {
    pub fn new(previous_outpoint: TransactionOutpoint, signature_script: Vec<u8>) -> Self {
        Self { previous_outpoint, signature_script }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: u64,
    pub script_public_key: ScriptPublicKey,
}

impl TransactionOutput {
    pub fn new(value: u64, script_public_key: ScriptPublicKey) -> Self {
        Self { value, script_public_key }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u64,
    /// Arbitrary data; coinbase transactions carry miner data here
    pub payload: Vec<u8>,

    id: TransactionId,
}

impl Transaction {
    pub fn new(inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>, lock_time: u64, payload: Vec<u8>) -> Self {
        let mut tx = Self { inputs, outputs, lock_time, payload, id: Hash::ZERO };
        tx.finalize();
        tx
    }

    /// Recomputes the cached transaction id. Must be called if fields are
    /// mutated after construction.
    pub fn finalize(&mut self) {
        self.id = hashing::tx_id(self);
    }

    #[inline]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// A coinbase transaction mints new coins and has no inputs
    #[inline]
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// A transaction alongside the UTXO entries resolved for its inputs
pub struct PopulatedTransaction<'a> {
    pub tx: &'a Transaction,
    pub entries: Vec<UtxoEntry>,
}

impl<'a> PopulatedTransaction<'a> {
    pub fn new(tx: &'a Transaction, entries: Vec<UtxoEntry>) -> Self {
        debug_assert_eq!(tx.inputs.len(), entries.len());
        Self { tx, entries }
    }

    pub fn populated_inputs(&self) -> impl Iterator<Item = (&TransactionInput, &UtxoEntry)> {
        self.tx.inputs.iter().zip(self.entries.iter())
    }

    pub fn id(&self) -> TransactionId {
        self.tx.id()
    }

    pub fn total_input_value(&self) -> u64 {
        self.entries.iter().map(|entry| entry.amount).sum()
    }

    pub fn total_output_value(&self) -> u64 {
        self.tx.outputs.iter().map(|output| output.value).sum()
    }
}

/// A populated transaction which passed full contextual validation, carrying
/// its calculated fee
pub struct ValidatedTransaction<'a> {
    pub tx: &'a Transaction,
    pub entries: Vec<UtxoEntry>,
    pub calculated_fee: u64,
}

impl<'a> ValidatedTransaction<'a> {
    pub fn new(populated_tx: PopulatedTransaction<'a>, calculated_fee: u64) -> Self {
        Self { tx: populated_tx.tx, entries: populated_tx.entries, calculated_fee }
    }

    /// Wraps a coinbase transaction, which needs no input population
    pub fn new_coinbase(tx: &'a Transaction) -> Self {
        debug_assert!(tx.is_coinbase());
        Self { tx, entries: Vec::new(), calculated_fee: 0 }
    }

    pub fn id(&self) -> TransactionId {
        self.tx.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_id_changes_with_content() {
        let out = TransactionOutput::new(10, ScriptPublicKey::hash_lock(b"alice"));
        let tx1 = Transaction::new(vec![], vec![out.clone()], 0, vec![]);
        let tx2 = Transaction::new(vec![], vec![out], 1, vec![]);
        assert_ne!(tx1.id(), tx2.id());
        assert!(tx1.is_coinbase());
    }

    #[test]
    fn test_populated_values() {
        let spk = ScriptPublicKey::hash_lock(b"bob");
        let input = TransactionInput::new(TransactionOutpoint::new(1.into(), 0), b"bob".to_vec());
        let tx = Transaction::new(vec![input], vec![TransactionOutput::new(7, spk.clone())], 0, vec![]);
        let populated = PopulatedTransaction::new(&tx, vec![UtxoEntry::new(10, spk, 0, false)]);
        assert_eq!(populated.total_input_value(), 10);
        assert_eq!(populated.total_output_value(), 7);
    }
}
