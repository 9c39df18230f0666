pub mod inquirer;
pub mod interval;
mod reindex;
#[cfg(test)]
pub(crate) mod tests;
mod tree;

use braid_database::prelude::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReachabilityError {
    #[error("data store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("interval allocation exhausted the tree root capacity")]
    DataOverflow,

    #[error("reachability data is inconsistent: {0}")]
    DataInconsistency(&'static str),

    #[error("query is inconsistent with the reachability tree")]
    BadQuery,
}

pub type Result<T> = std::result::Result<T, ReachabilityError>;
