use odb_types::{HashAlgorithm, ObjectId};

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found (or did not match the type filter).
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// The backend does not support this operation.
    #[error("operation not implemented by this backend: {0}")]
    Unimplemented(&'static str),

    /// The id carried by a record disagrees with the id of its content.
    #[error("hash mismatch: record claims {claimed}, content hashes to {computed}")]
    HashMismatch { claimed: ObjectId, computed: ObjectId },

    /// Declared size and readable content length disagree.
    #[error("size mismatch for {id}: declared {declared}, read {actual}")]
    SizeMismatch { id: ObjectId, declared: u64, actual: u64 },

    /// The object data is malformed or cannot be decoded.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    /// Attempted to write a null object ID.
    #[error("cannot store object with null ID")]
    NullObjectId,

    /// The record's id uses a different hash algorithm than the backend.
    #[error("hash algorithm mismatch: store uses {store}, object uses {object}")]
    AlgorithmMismatch {
        store: HashAlgorithm,
        object: HashAlgorithm,
    },

    /// The backend cannot serve ids of this hash algorithm.
    #[error("{backend} backend does not support {algorithm} object ids")]
    UnsupportedAlgorithm {
        backend: &'static str,
        algorithm: HashAlgorithm,
    },

    /// The backend has been closed.
    #[error("store is closed")]
    Closed,

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the SQLite backend.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Error from the repository object database.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
