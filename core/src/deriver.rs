//! Address derivation seam (spec §4.4).
//!
//! Wallet materialization needs to turn an xpub and an index range into
//! candidate addresses, but actually deriving a BIP-32 child key is outside
//! this crate's scope — `wallet-indexer` supplies the real implementation.
//! This trait is the boundary so [`crate::gap::GapScanner`]'s driver can be
//! exercised in tests without a real curve library in the dependency tree.

/// Derives addresses from an extended public key at consecutive indices.
pub trait AddressDeriver: Send + Sync {
    /// Derive `count` addresses starting at `start_index`, in order.
    /// Returns one `(address, index)` pair per derived key.
    fn derive(&self, xpub: &str, start_index: u32, count: u32) -> Vec<(String, u32)>;
}

/// A deterministic stand-in deriver: hashes `xpub || index` instead of
/// walking the BIP-32 tree. Useful for tests and for exercising the gap
/// scanner end to end without pulling in a secp256k1 dependency.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashDeriver;

impl AddressDeriver for HashDeriver {
    fn derive(&self, xpub: &str, start_index: u32, count: u32) -> Vec<(String, u32)> {
        (start_index..start_index + count)
            .map(|index| {
                use sha3::{Digest, Sha3_256};
                let mut hasher = Sha3_256::new();
                hasher.update(xpub.as_bytes());
                hasher.update(index.to_be_bytes());
                let digest = hasher.finalize();
                (hex::encode(&digest[..20]), index)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_deriver_is_deterministic_and_ordered() {
        let deriver = HashDeriver;
        let a = deriver.derive("xpub123", 0, 3);
        let b = deriver.derive("xpub123", 0, 3);
        assert_eq!(a, b);
        assert_eq!(a.iter().map(|(_, i)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn different_xpubs_derive_different_addresses() {
        let deriver = HashDeriver;
        let a = deriver.derive("xpub123", 0, 1);
        let b = deriver.derive("xpub456", 0, 1);
        assert_ne!(a[0].0, b[0].0);
    }
}
