//! Object identity hashing for the object database daemon.
//!
//! An object's identity is the hash of its canonical encoding: a
//! `"<type> <size>\0"` header followed by the raw content. This is the same
//! encoding the native repository format hashes, so identities computed here
//! match identities of real repository data.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod hasher;

pub use hasher::{object_header, ObjectHasher};
