/// Hashes serialized keys into the 32-bit space the index slices for
/// directory and bucket placement. Hashes end up baked into the on-disk
/// structure, so implementations must be deterministic across runs.
pub trait HashFunction: Send + Sync {
    fn hash(&self, key: &[u8]) -> u32;
}

/// FNV-1a over the key bytes, the default.
pub struct Fnv1aHash;

impl HashFunction for Fnv1aHash {
    fn hash(&self, key: &[u8]) -> u32 {
        let mut hash: u32 = 0x811c_9dc5;
        for &byte in key {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(0x0100_0193);
        }
        hash
    }
}

/// Uses the first four key bytes as the hash, unchanged. Lets tests steer
/// keys to chosen directory and bucket slots.
pub struct IdentityHash;

impl HashFunction for IdentityHash {
    fn hash(&self, key: &[u8]) -> u32 {
        let mut bytes = [0u8; 4];
        let n = key.len().min(4);
        bytes[..n].copy_from_slice(&key[..n]);
        u32::from_le_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_deterministic() {
        let h = Fnv1aHash;
        assert_eq!(h.hash(b"key"), h.hash(b"key"));
        assert_ne!(h.hash(b"key"), h.hash(b"ley"));
    }

    #[test]
    fn test_identity_hash() {
        let h = IdentityHash;
        assert_eq!(h.hash(&7u32.to_le_bytes()), 7);
        assert_eq!(h.hash(&0xDEAD_BEEFu32.to_le_bytes()), 0xDEAD_BEEF);
    }
}
