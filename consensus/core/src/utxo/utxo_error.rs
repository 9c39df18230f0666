use crate::tx::TransactionOutpoint;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UtxoAlgebraError {
    #[error("outpoint {0} is removed by both diffs")]
    DuplicateRemovePoint(TransactionOutpoint),

    #[error("outpoint {0} is added by both diffs")]
    DuplicateAddPoint(TransactionOutpoint),
}

pub type UtxoResult<T> = std::result::Result<T, UtxoAlgebraError>;
