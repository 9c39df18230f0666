use crate::constants::{MASS_PER_INPUT, MASS_PER_OUTPUT, MASS_PER_SCRIPT_BYTE, MASS_PER_TX};
use crate::errors::{BlockProcessResult, RuleError};
use braid_consensus_core::hashing;
use braid_consensus_core::tx::{PopulatedTransaction, Transaction};

/// Stateless and UTXO-contextual transaction checks. Script verification is
/// the hash-lock rule: the signature script must preimage the script public
/// key (the full script VM belongs to an external collaborator).
#[derive(Clone)]
pub struct TransactionValidator {
    coinbase_maturity: u64,
}

impl TransactionValidator {
    pub fn new(coinbase_maturity: u64) -> Self {
        Self { coinbase_maturity }
    }

    /// Structural checks requiring no UTXO context. The coinbase positional
    /// rules are checked at the block level.
    pub fn validate_tx_in_isolation(&self, tx: &Transaction) -> BlockProcessResult<()> {
        if !tx.is_coinbase() && tx.inputs.is_empty() {
            return Err(RuleError::NoTxInputs(tx.id()));
        }
        for output in tx.outputs.iter() {
            if output.value == 0 {
                return Err(RuleError::ZeroValueOutput(tx.id()));
            }
        }
        let mut seen = std::collections::HashSet::with_capacity(tx.inputs.len());
        for input in tx.inputs.iter() {
            if !seen.insert(input.previous_outpoint) {
                return Err(RuleError::DoubleSpendInBlock(tx.id(), input.previous_outpoint));
            }
        }
        Ok(())
    }

    /// Full contextual validation of a populated transaction against the
    /// UTXO view it was populated from. Returns the transaction fee.
    pub fn validate_populated_transaction_and_get_fee(
        &self,
        tx: &PopulatedTransaction,
        pov_blue_score: u64,
    ) -> BlockProcessResult<u64> {
        let total_in = tx.total_input_value();
        let total_out = tx.total_output_value();
        if total_out > total_in {
            return Err(RuleError::SpendsMoreThanInputs(tx.id(), total_out, total_in));
        }

        for (index, (input, entry)) in tx.populated_inputs().enumerate() {
            if entry.is_coinbase {
                let depth = pov_blue_score.saturating_sub(entry.block_blue_score);
                if depth <= self.coinbase_maturity {
                    return Err(RuleError::ImmatureCoinbaseSpend(
                        tx.id(),
                        input.previous_outpoint,
                        depth,
                        self.coinbase_maturity,
                    ));
                }
            }
            let lock_digest = hashing::script_lock_digest(&input.signature_script);
            if lock_digest.as_bytes()[..] != entry.script_public_key.script[..] {
                return Err(RuleError::ScriptVerifyFailed(tx.id(), index));
            }
        }

        Ok(total_in - total_out)
    }
}

/// Mass approximates the serialized weight of a transaction
pub fn transaction_mass(tx: &Transaction) -> u64 {
    let script_bytes: u64 = tx
        .inputs
        .iter()
        .map(|input| input.signature_script.len() as u64)
        .chain(tx.outputs.iter().map(|output| output.script_public_key.script.len() as u64))
        .sum::<u64>()
        + tx.payload.len() as u64;
    MASS_PER_TX + MASS_PER_INPUT * tx.inputs.len() as u64 + MASS_PER_OUTPUT * tx.outputs.len() as u64 + MASS_PER_SCRIPT_BYTE * script_bytes
}

pub fn block_mass(txs: &[Transaction]) -> u64 {
    txs.iter().map(transaction_mass).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_consensus_core::tx::{ScriptPublicKey, TransactionInput, TransactionOutpoint, TransactionOutput, UtxoEntry};

    fn spendable_input(id: u64, unlock: &[u8]) -> (TransactionInput, UtxoEntry) {
        let outpoint = TransactionOutpoint::new(id.into(), 0);
        let input = TransactionInput::new(outpoint, unlock.to_vec());
        let entry = UtxoEntry::new(100, ScriptPublicKey::hash_lock(unlock), 0, false);
        (input, entry)
    }

    #[test]
    fn test_fee_and_script_check() {
        let validator = TransactionValidator::new(10);
        let (input, entry) = spendable_input(1, b"alice");
        let tx = Transaction::new(vec![input], vec![TransactionOutput::new(70, ScriptPublicKey::hash_lock(b"bob"))], 0, vec![]);
        let populated = PopulatedTransaction::new(&tx, vec![entry.clone()]);
        assert_eq!(validator.validate_populated_transaction_and_get_fee(&populated, 100).unwrap(), 30);

        // Wrong unlock data fails the script check
        let (bad_input, _) = spendable_input(1, b"mallory");
        let bad_tx =
            Transaction::new(vec![bad_input], vec![TransactionOutput::new(70, ScriptPublicKey::hash_lock(b"bob"))], 0, vec![]);
        let bad_populated = PopulatedTransaction::new(&bad_tx, vec![entry]);
        assert!(matches!(
            validator.validate_populated_transaction_and_get_fee(&bad_populated, 100),
            Err(RuleError::ScriptVerifyFailed(_, 0))
        ));
    }

    #[test]
    fn test_overspend_rejected() {
        let validator = TransactionValidator::new(10);
        let (input, entry) = spendable_input(1, b"alice");
        let tx = Transaction::new(vec![input], vec![TransactionOutput::new(101, ScriptPublicKey::hash_lock(b"bob"))], 0, vec![]);
        let populated = PopulatedTransaction::new(&tx, vec![entry]);
        assert!(matches!(
            validator.validate_populated_transaction_and_get_fee(&populated, 100),
            Err(RuleError::SpendsMoreThanInputs(_, 101, 100))
        ));
    }

    #[test]
    fn test_coinbase_maturity_window() {
        let validator = TransactionValidator::new(10);
        let outpoint = TransactionOutpoint::new(1.into(), 0);
        let input = TransactionInput::new(outpoint, b"miner".to_vec());
        let entry = UtxoEntry::new(100, ScriptPublicKey::hash_lock(b"miner"), 90, true);
        let tx = Transaction::new(vec![input], vec![TransactionOutput::new(100, ScriptPublicKey::hash_lock(b"bob"))], 0, vec![]);
        let populated = PopulatedTransaction::new(&tx, vec![entry]);

        // Depth of exactly the maturity window is still immature
        assert!(matches!(
            validator.validate_populated_transaction_and_get_fee(&populated, 100),
            Err(RuleError::ImmatureCoinbaseSpend(_, _, 10, 10))
        ));
        // One deeper clears the window
        assert!(validator.validate_populated_transaction_and_get_fee(&populated, 101).is_ok());
    }

    #[test]
    fn test_in_isolation_rules() {
        let validator = TransactionValidator::new(10);
        let (input, _) = spendable_input(1, b"alice");
        let duplicate_spend = Transaction::new(
            vec![input.clone(), input.clone()],
            vec![TransactionOutput::new(5, ScriptPublicKey::hash_lock(b"bob"))],
            0,
            vec![],
        );
        assert!(matches!(validator.validate_tx_in_isolation(&duplicate_spend), Err(RuleError::DoubleSpendInBlock(_, _))));

        let no_inputs = Transaction::new(vec![], vec![TransactionOutput::new(5, ScriptPublicKey::hash_lock(b"bob"))], 0, vec![]);
        // No inputs means coinbase, which is legal in isolation
        assert!(validator.validate_tx_in_isolation(&no_inputs).is_ok());

        let zero_output = Transaction::new(vec![input], vec![TransactionOutput::new(0, ScriptPublicKey::hash_lock(b"bob"))], 0, vec![]);
        assert!(matches!(validator.validate_tx_in_isolation(&zero_output), Err(RuleError::ZeroValueOutput(_))));
    }
}
