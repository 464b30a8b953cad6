use odb_types::{HashAlgorithm, ObjectId, ObjectType, MAX_HASH_LEN};
use sha1::{Digest, Sha1};
use sha2::Sha256;

/// Canonical object header: `"<type> <size>\0"`.
pub fn object_header(object_type: ObjectType, size: u64) -> Vec<u8> {
    format!("{} {}\0", object_type.name(), size).into_bytes()
}

/// Type-prefixed content hasher.
///
/// Every hash covers the [`object_header`] before the content. This prevents
/// cross-type identity collisions: a blob and a tree with identical bytes
/// produce different ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectHasher {
    algorithm: HashAlgorithm,
}

impl ObjectHasher {
    /// Hasher producing SHA-1 identities.
    pub const SHA1: Self = Self {
        algorithm: HashAlgorithm::Sha1,
    };
    /// Hasher producing SHA-256 identities.
    pub const SHA256: Self = Self {
        algorithm: HashAlgorithm::Sha256,
    };

    pub const fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Compute the identity of `content` stored as `object_type`.
    pub fn hash(&self, object_type: ObjectType, content: &[u8]) -> ObjectId {
        let header = object_header(object_type, content.len() as u64);
        let mut raw = [0u8; MAX_HASH_LEN];
        match self.algorithm {
            HashAlgorithm::Sha1 => {
                let digest = Sha1::new().chain_update(&header).chain_update(content).finalize();
                raw[..digest.len()].copy_from_slice(&digest);
            }
            HashAlgorithm::Sha256 => {
                let digest = Sha256::new().chain_update(&header).chain_update(content).finalize();
                raw[..digest.len()].copy_from_slice(&digest);
            }
        }
        ObjectId::from_raw(self.algorithm, raw)
    }
}

impl Default for ObjectHasher {
    fn default() -> Self {
        Self::SHA1
    }
}
