use crate::{Hash, HASH_SIZE};

/// A domain-separated blake2b-256 hasher. Each consensus object kind hashes
/// under its own key so digests from different domains can never collide.
#[derive(Clone)]
pub struct DomainHasher {
    state: blake2b_simd::State,
}

impl DomainHasher {
    pub fn new(domain: &[u8]) -> Self {
        let state = blake2b_simd::Params::new().hash_length(HASH_SIZE).key(domain).to_state();
        Self { state }
    }

    #[inline]
    pub fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self {
        self.state.update(data.as_ref());
        self
    }

    #[inline]
    pub fn write_hash(&mut self, hash: Hash) -> &mut Self {
        self.update(hash)
    }

    pub fn finalize(&self) -> Hash {
        let digest = self.state.finalize();
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(digest.as_bytes());
        Hash::from_bytes(bytes)
    }
}

macro_rules! domain_hasher {
    ($name:ident, $domain:literal) => {
        #[derive(Clone)]
        pub struct $name(DomainHasher);

        impl $name {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(DomainHasher::new($domain))
            }

            #[inline]
            pub fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self {
                self.0.update(data);
                self
            }

            #[inline]
            pub fn write_hash(&mut self, hash: Hash) -> &mut Self {
                self.0.write_hash(hash);
                self
            }

            pub fn finalize(&self) -> Hash {
                self.0.finalize()
            }
        }
    };
}

domain_hasher!(HeaderHasher, b"BraidBlockHeader");
domain_hasher!(TransactionHasher, b"BraidTransaction");
domain_hasher!(MerkleBranchHasher, b"BraidMerkleNode\x00");
domain_hasher!(UtxoEntryHasher, b"BraidUtxoEntry\x00\x00");
domain_hasher!(ScriptLockHasher, b"BraidScriptLock\x00");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_separation() {
        let mut a = HeaderHasher::new();
        let mut b = TransactionHasher::new();
        a.update(b"payload");
        b.update(b"payload");
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_determinism() {
        let digest = |data: &[u8]| {
            let mut hasher = MerkleBranchHasher::new();
            hasher.update(data);
            hasher.finalize()
        };
        assert_eq!(digest(b"x"), digest(b"x"));
        assert_ne!(digest(b"x"), digest(b"y"));
    }
}
