use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Debug)]
pub enum BlockStatus {
    /// The block failed validation and is permanently rejected
    Invalid,

    /// Only the header is known and validated; the body was not received yet
    /// (or was pruned)
    HeaderOnly,

    /// Header and body are valid, but the block was never verified against
    /// its past UTXO set since it has not been a selected-chain block yet
    UtxoPendingVerification,

    /// Fully valid, including verification against its own past UTXO set
    UtxoValid,

    /// Header and body are valid but the block fails UTXO verification, so it
    /// may never be a selected parent (its DAG data is still used)
    DisqualifiedFromChain,
}

impl BlockStatus {
    pub fn has_block_header(self) -> bool {
        matches!(self, Self::HeaderOnly | Self::UtxoValid | Self::UtxoPendingVerification | Self::DisqualifiedFromChain)
    }

    pub fn is_header_only(self) -> bool {
        self == Self::HeaderOnly
    }

    pub fn has_block_body(self) -> bool {
        matches!(self, Self::UtxoValid | Self::UtxoPendingVerification | Self::DisqualifiedFromChain)
    }

    pub fn is_utxo_valid_or_pending(self) -> bool {
        matches!(self, Self::UtxoValid | Self::UtxoPendingVerification)
    }

    pub fn is_valid(self) -> bool {
        self != Self::Invalid
    }

    pub fn is_invalid(self) -> bool {
        self == Self::Invalid
    }
}
