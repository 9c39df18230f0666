use std::fmt::{Display, Formatter};

/// A database key composed of a store prefix byte sequence followed by the
/// serialized key bytes. The prefix buckets every store into its own ordered
/// region of the shared key space.
#[derive(Debug, Clone)]
pub struct DbKey {
    path: Vec<u8>,
    prefix_len: usize,
}

impl DbKey {
    pub fn new<TKey: AsRef<[u8]>>(prefix: &[u8], key: TKey) -> Self {
        Self {
            path: prefix.iter().chain(key.as_ref().iter()).copied().collect(),
            prefix_len: prefix.len(),
        }
    }

    /// A key composed of the prefix only, used for range iteration over a store
    pub fn prefix_only(prefix: &[u8]) -> Self {
        Self::new(prefix, b"")
    }

    pub fn prefix(&self) -> &[u8] {
        &self.path[..self.prefix_len]
    }
}

impl AsRef<[u8]> for DbKey {
    fn as_ref(&self) -> &[u8] {
        &self.path
    }
}

impl Display for DbKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut hex = vec![0u8; (self.path.len() - self.prefix_len) * 2];
        match (std::str::from_utf8(self.prefix()), faster_hex::hex_encode(&self.path[self.prefix_len..], &mut hex)) {
            (Ok(prefix), Ok(_)) => write!(f, "{}/{}", prefix, std::str::from_utf8(&hex).unwrap()),
            _ => write!(f, "{:?}", self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_composition() {
        let key = DbKey::new(b"headers", [0xabu8, 0xcd]);
        assert_eq!(key.prefix(), b"headers");
        assert_eq!(key.as_ref(), b"headers\xab\xcd");
        assert_eq!(key.to_string(), "headers/abcd");
    }
}
