//! Content-addressed object storage for the object database daemon.
//!
//! Every backend implements the [`ObjectStore`] trait: typed get, put, has,
//! size, lazy iteration, and close. Identities are computed from the object's
//! type and content (see [`odb_crypto::ObjectHasher`]), so a backend never
//! trusts a caller-supplied id.
//!
//! # Storage Backends
//!
//! - [`FilesystemObjectStore`] -- the repository's own object database,
//!   loose objects and packs, through libgit2
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`SqliteObjectStore`] -- single-table key-value store in SQLite
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Each backend synchronizes internally; callers share it behind an `Arc`.
//! 3. A missing capability is [`StoreError::Unimplemented`], never an empty
//!    or zero value.
//! 4. Declared size and readable content always agree, or the read fails.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod backend;
pub mod error;
pub mod filesystem;
pub mod memory;
pub mod object;
pub mod sqlite;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use backend::{open_backend, BackendKind};
pub use error::{StoreError, StoreResult};
pub use filesystem::FilesystemObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{DeferredContent, EncodedObject, ObjectContent};
pub use sqlite::SqliteObjectStore;
pub use traits::{ObjectIter, ObjectStore};
