use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Size of the hash buffer carried by every [`ObjectId`].
pub const MAX_HASH_LEN: usize = 32;

/// Hash function that produced an [`ObjectId`].
///
/// The discriminants are the tags carried on the wire.
#[repr(i32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// 160-bit SHA-1, occupying the low 20 bytes of the buffer.
    #[default]
    Sha1 = 1,
    /// 256-bit SHA-256, occupying the full buffer.
    Sha256 = 2,
}

impl HashAlgorithm {
    /// Number of meaningful bytes in the hash buffer.
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Length of the hex rendering.
    pub const fn hex_len(self) -> usize {
        self.digest_len() * 2
    }

    /// The wire tag.
    pub const fn tag(self) -> i32 {
        self as i32
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: i32) -> Result<Self, TypeError> {
        match tag {
            1 => Ok(Self::Sha1),
            2 => Ok(Self::Sha256),
            other => Err(TypeError::UnknownAlgorithm(other)),
        }
    }

    /// Infer the algorithm from the length of a hex string.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha1 => write!(f, "sha1"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            _ => Err(TypeError::UnknownAlgorithmName(s.to_string())),
        }
    }
}

/// Content-addressed identifier for a stored object.
///
/// An `ObjectId` is a fixed 32-byte hash buffer plus the [`HashAlgorithm`]
/// that filled it. Only the first [`HashAlgorithm::digest_len`] bytes are
/// meaningful; the rest are always zero. Equality, ordering, hashing and hex
/// rendering all look at the meaningful range only.
#[derive(Clone, Copy)]
pub struct ObjectId {
    hash: [u8; MAX_HASH_LEN],
    algorithm: HashAlgorithm,
}

impl ObjectId {
    /// Create an `ObjectId` from a digest of exactly `algorithm.digest_len()` bytes.
    pub fn from_hash(algorithm: HashAlgorithm, digest: &[u8]) -> Result<Self, TypeError> {
        if digest.len() != algorithm.digest_len() {
            return Err(TypeError::InvalidLength {
                expected: algorithm.digest_len(),
                actual: digest.len(),
            });
        }
        let mut hash = [0u8; MAX_HASH_LEN];
        hash[..digest.len()].copy_from_slice(digest);
        Ok(Self { hash, algorithm })
    }

    /// Create an `ObjectId` from a full 32-byte buffer, as carried on the wire.
    ///
    /// Bytes past the algorithm's meaningful range are discarded.
    pub fn from_raw(algorithm: HashAlgorithm, raw: [u8; MAX_HASH_LEN]) -> Self {
        let mut hash = [0u8; MAX_HASH_LEN];
        let len = algorithm.digest_len();
        hash[..len].copy_from_slice(&raw[..len]);
        Self { hash, algorithm }
    }

    /// The null object ID (all zeros). Represents "no object".
    pub const fn null(algorithm: HashAlgorithm) -> Self {
        Self {
            hash: [0u8; MAX_HASH_LEN],
            algorithm,
        }
    }

    /// Returns `true` if this is the null object ID.
    pub fn is_null(&self) -> bool {
        self.as_bytes().iter().all(|b| *b == 0)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The meaningful digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.hash[..self.algorithm.digest_len()]
    }

    /// The full zero-padded 32-byte buffer.
    pub fn raw(&self) -> &[u8; MAX_HASH_LEN] {
        &self.hash
    }

    /// Hex-encoded string representation of the meaningful range.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.hash[..4])
    }

    /// Parse from a hex string produced by the given algorithm.
    pub fn from_hex(algorithm: HashAlgorithm, s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_hash(algorithm, &bytes)
    }
}

impl PartialEq for ObjectId {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ObjectId {}

impl Hash for ObjectId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.algorithm.hash(state);
        self.as_bytes().hash(state);
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.algorithm
            .cmp(&other.algorithm)
            .then_with(|| self.as_bytes().cmp(other.as_bytes()))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}:{})", self.algorithm, self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Parses a full-length hex id, inferring the algorithm from its length.
impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let algorithm = HashAlgorithm::from_hex_len(s.len()).ok_or(TypeError::InvalidLength {
            expected: HashAlgorithm::Sha1.hex_len(),
            actual: s.len(),
        })?;
        Self::from_hex(algorithm, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const HELLO_SHA1: &str = "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0";

    fn sha1_id(fill: u8) -> ObjectId {
        ObjectId::from_hash(HashAlgorithm::Sha1, &[fill; 20]).unwrap()
    }

    #[test]
    fn hex_covers_only_meaningful_range() {
        let id = ObjectId::from_hex(HashAlgorithm::Sha1, HELLO_SHA1).unwrap();
        assert_eq!(id.to_hex(), HELLO_SHA1);
        assert_eq!(id.to_hex().len(), 40);

        let id = ObjectId::from_hash(HashAlgorithm::Sha256, &[0xab; 32]).unwrap();
        assert_eq!(id.to_hex().len(), 64);
    }

    #[test]
    fn raw_buffer_is_zero_padded() {
        let id = sha1_id(0xff);
        assert_eq!(&id.raw()[..20], &[0xff; 20]);
        assert_eq!(&id.raw()[20..], &[0u8; 12]);
    }

    #[test]
    fn from_raw_ignores_trailing_garbage() {
        let mut raw = [0x11u8; 32];
        let clean = ObjectId::from_raw(HashAlgorithm::Sha1, raw);
        raw[25] = 0x99;
        let dirty = ObjectId::from_raw(HashAlgorithm::Sha1, raw);
        assert_eq!(clean, dirty);
        assert_eq!(dirty.raw()[25], 0);

        let mut set = HashSet::new();
        set.insert(clean);
        assert!(set.contains(&dirty));
    }

    #[test]
    fn algorithm_participates_in_equality() {
        let a = ObjectId::null(HashAlgorithm::Sha1);
        let b = ObjectId::null(HashAlgorithm::Sha256);
        assert!(a.is_null() && b.is_null());
        assert_ne!(a, b);
    }

    #[test]
    fn from_hash_rejects_wrong_length() {
        let err = ObjectId::from_hash(HashAlgorithm::Sha1, &[0u8; 32]).unwrap_err();
        assert_eq!(err, TypeError::InvalidLength { expected: 20, actual: 32 });
    }

    #[test]
    fn from_hex_rejects_bad_hex() {
        let err = ObjectId::from_hex(HashAlgorithm::Sha1, "zz").unwrap_err();
        assert!(matches!(err, TypeError::InvalidHex(_)));
    }

    #[test]
    fn from_str_infers_algorithm() {
        let id: ObjectId = HELLO_SHA1.parse().unwrap();
        assert_eq!(id.algorithm(), HashAlgorithm::Sha1);

        let long = "8aec4e4876f854f688d0ebfc8f37598f38e5fd6903cccc850ca36591175aeb60";
        let id: ObjectId = long.parse().unwrap();
        assert_eq!(id.algorithm(), HashAlgorithm::Sha256);

        assert!("abcd".parse::<ObjectId>().is_err());
    }

    #[test]
    fn algorithm_tags() {
        assert_eq!(HashAlgorithm::from_tag(1).unwrap(), HashAlgorithm::Sha1);
        assert_eq!(HashAlgorithm::from_tag(2).unwrap(), HashAlgorithm::Sha256);
        assert_eq!(HashAlgorithm::from_tag(0), Err(TypeError::UnknownAlgorithm(0)));
        assert_eq!(HashAlgorithm::Sha256.tag(), 2);
        assert_eq!("SHA256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn algorithm_serde_is_lowercase() {
        let json = serde_json::to_string(&HashAlgorithm::Sha256).unwrap();
        assert_eq!(json, "\"sha256\"");
        let parsed: HashAlgorithm = serde_json::from_str("\"sha1\"").unwrap();
        assert_eq!(parsed, HashAlgorithm::Sha1);
    }

    #[test]
    fn ordering_is_consistent() {
        assert!(sha1_id(0) < sha1_id(1));
    }

    #[test]
    fn debug_and_display() {
        let id = sha1_id(0xab);
        assert_eq!(format!("{id:?}"), "ObjectId(sha1:abababab)");
        assert_eq!(format!("{id}"), "ab".repeat(20));
    }

    proptest::proptest! {
        #[test]
        fn hex_roundtrip(bytes in proptest::array::uniform20(proptest::num::u8::ANY)) {
            let id = ObjectId::from_hash(HashAlgorithm::Sha1, &bytes).unwrap();
            let parsed: ObjectId = id.to_hex().parse().unwrap();
            proptest::prop_assert_eq!(id, parsed);
        }
    }
}
