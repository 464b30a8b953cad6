//! Foundation types for the object database daemon.
//!
//! This crate provides the identity and classification types shared by the
//! storage backends, the wire protocol, and the daemon. Every other crate in
//! the workspace depends on `odb-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content-addressed identifier (hash buffer + algorithm tag)
//! - [`HashAlgorithm`] -- Which hash function produced an [`ObjectId`]
//! - [`ObjectType`] -- commit, tree, blob, or tag
//! - [`TypeFilter`] -- `Any` or one exact [`ObjectType`], used for lookups
//! - [`Whence`] -- Where a backend found an object

pub mod error;
pub mod kind;
pub mod object;

pub use error::TypeError;
pub use kind::{ObjectType, TypeFilter, Whence};
pub use object::{HashAlgorithm, ObjectId, MAX_HASH_LEN};
