use crate::constants;
use braid_consensus_core::tx::{TransactionId, TransactionOutpoint};
use braid_consensus_core::BlueWorkType;
use braid_database::prelude::StoreError;
use braid_hashes::Hash;
use thiserror::Error;

/// Violations of consensus rules. A block failing with a `RuleError` is
/// permanently invalid (or chain-disqualified for UTXO-context variants) and
/// is never revalidated from the same bytes.
#[derive(Error, Debug, Clone)]
pub enum RuleError {
    #[error("wrong block version: got {0} but expected {}", constants::BLOCK_VERSION)]
    WrongBlockVersion(u16),

    #[error("the block timestamp is too far into the future: block timestamp is {0} but maximum timestamp allowed is {1}")]
    TimeTooFarIntoTheFuture(u64, u64),

    #[error("block timestamp of {0} is not after its past median time {1}")]
    TimeTooOld(u64, u64),

    #[error("block has no parents")]
    NoParents,

    #[error("block has too many parents: got {0} when the limit is {1}")]
    TooManyParents(usize, usize),

    #[error("block parent {0} is known to be invalid")]
    KnownInvalidParent(Hash),

    #[error("block difficulty bits {0:#x} do not decode to a valid target")]
    InvalidDifficultyBits(u32),

    #[error("block proof-of-work hash does not meet its declared target")]
    InvalidPoW,

    #[error("block difficulty bits are {got:#x} but the expected value for this position is {expected:#x}")]
    UnexpectedDifficulty { got: u32, expected: u32 },

    #[error("declared blue score {got} does not match the computed blue score {expected}")]
    UnexpectedBlueScore { got: u64, expected: u64 },

    #[error("declared blue work {got} does not match the computed blue work {expected}")]
    UnexpectedBlueWork { got: BlueWorkType, expected: BlueWorkType },

    #[error("declared pruning point {0} is not a valid pruning point for this block")]
    WrongHeaderPruningPoint(Hash),

    #[error("no block parent is in the future of the pruning point {0}")]
    PruningViolation(Hash),

    #[error("merge set of size {0} exceeds the limit {1}")]
    MergeSetTooBig(u64, u64),

    #[error("merged block {0} is {1} blue scores deep, exceeding the merge depth bound {2}")]
    ViolatingBoundedMergeDepth(Hash, u64, u64),

    #[error("block merkle root {got} does not match the merkle root of its transactions {expected}")]
    BadMerkleRoot { got: Hash, expected: Hash },

    #[error("block has no transactions")]
    NoTransactions,

    #[error("first block transaction is not a coinbase")]
    FirstTxNotCoinbase,

    #[error("block has a coinbase transaction at position {0}")]
    MultipleCoinbases(usize),

    #[error("transaction {0} appears more than once in the block")]
    DuplicateTransactions(TransactionId),

    #[error("transaction {0} has no inputs and is not a coinbase")]
    NoTxInputs(TransactionId),

    #[error("transaction {0} has an output of zero value")]
    ZeroValueOutput(TransactionId),

    #[error("outpoint {1} is spent more than once within the block by transaction {0}")]
    DoubleSpendInBlock(TransactionId, TransactionOutpoint),

    #[error("block mass {0} exceeds the limit {1}")]
    ExceedsMassLimit(u64, u64),

    #[error("transaction {0} input outpoint {1} is missing or already spent in this context")]
    MissingTxOutpoint(TransactionId, TransactionOutpoint),

    #[error("transaction {0} spends coinbase outpoint {1} at blue depth {2} before maturity {3}")]
    ImmatureCoinbaseSpend(TransactionId, TransactionOutpoint, u64, u64),

    #[error("transaction {0} failed script verification on input {1}")]
    ScriptVerifyFailed(TransactionId, usize),

    #[error("transaction {0} spends {1} which is more than its input value {2}")]
    SpendsMoreThanInputs(TransactionId, u64, u64),

    #[error("coinbase pays {got} which exceeds the allowed subsidy plus fees {allowed}")]
    BadCoinbasePayout { got: u64, allowed: u64 },

    #[error("declared UTXO commitment {got} does not match the computed commitment {expected}")]
    BadUtxoCommitment { got: Hash, expected: Hash },
}

pub type BlockProcessResult<T> = std::result::Result<T, RuleError>;

/// Top-level consensus error taxonomy. `Rule` marks blocks invalid;
/// `MissingParents` defers processing; the rest describe engine conditions.
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("block rule violation: {0}")]
    Rule(#[from] RuleError),

    #[error("block parents are missing: {0:?}")]
    MissingParents(Vec<Hash>),

    #[error("block {0} was already processed")]
    DuplicateBlock(Hash),

    #[error("block {0} not found")]
    BlockNotFound(Hash),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("internal invariant violation: {0}")]
    InvariantViolation(String),

    #[error("consensus is poisoned by a previous invariant violation; writes are disabled")]
    Poisoned,
}

pub type ConsensusResult<T> = std::result::Result<T, ConsensusError>;

impl From<crate::processes::reachability::ReachabilityError> for ConsensusError {
    fn from(err: crate::processes::reachability::ReachabilityError) -> Self {
        use crate::processes::reachability::ReachabilityError;
        match err {
            ReachabilityError::StoreError(store_err) => ConsensusError::Store(store_err),
            other => ConsensusError::InvariantViolation(other.to_string()),
        }
    }
}
