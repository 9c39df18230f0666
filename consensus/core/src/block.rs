use crate::header::Header;
use crate::tx::Transaction;
use braid_hashes::Hash;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A block with its body. Bodies may be absent for header-only blocks, in
/// which case the block is represented by the bare `Header`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Arc<Vec<Transaction>>,
}

impl Block {
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Self {
        Self { header, transactions: Arc::new(transactions) }
    }

    pub fn from_header(header: Header) -> Self {
        Self { header, transactions: Arc::new(Vec::new()) }
    }

    #[inline]
    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    pub fn is_header_only(&self) -> bool {
        self.transactions.is_empty()
    }
}
