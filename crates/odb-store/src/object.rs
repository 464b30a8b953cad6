use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use odb_crypto::ObjectHasher;
use odb_types::{HashAlgorithm, ObjectId, ObjectType, Whence};

use crate::error::{StoreError, StoreResult};

/// Where an object's content comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectContent {
    /// Content held in memory.
    Inline(Bytes),
    /// Content loaded from the backend on each read.
    Deferred(DeferredContent),
}

type LoadFn = dyn Fn() -> StoreResult<Bytes> + Send + Sync;

/// A re-runnable content loader. Lets a backend answer metadata lookups
/// without inflating the object.
#[derive(Clone)]
pub struct DeferredContent(Arc<LoadFn>);

impl DeferredContent {
    pub fn new(load: impl Fn() -> StoreResult<Bytes> + Send + Sync + 'static) -> Self {
        Self(Arc::new(load))
    }

    fn load(&self) -> StoreResult<Bytes> {
        (self.0)()
    }
}

impl PartialEq for DeferredContent {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for DeferredContent {}

impl fmt::Debug for DeferredContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeferredContent(..)")
    }
}

/// A typed object record: identity, type, declared size, and a content
/// source.
///
/// The declared `size` must equal the number of bytes readable from the
/// content. [`EncodedObject::read_content`] enforces this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedObject {
    id: ObjectId,
    object_type: ObjectType,
    size: u64,
    content: ObjectContent,
    whence: Whence,
    disk_size: u64,
}

impl EncodedObject {
    /// Build a new in-memory object, computing its identity.
    pub fn from_bytes(
        algorithm: HashAlgorithm,
        object_type: ObjectType,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        let id = ObjectHasher::new(algorithm).hash(object_type, &data);
        Self {
            id,
            object_type,
            size: data.len() as u64,
            content: ObjectContent::Inline(data),
            whence: Whence::Cached,
            disk_size: 0,
        }
    }

    /// Assemble a record from parts a backend already knows.
    pub fn new(id: ObjectId, object_type: ObjectType, size: u64, content: ObjectContent) -> Self {
        Self {
            id,
            object_type,
            size,
            content,
            whence: Whence::Cached,
            disk_size: 0,
        }
    }

    /// Attach storage location details.
    pub fn with_location(mut self, whence: Whence, disk_size: u64) -> Self {
        self.whence = whence;
        self.disk_size = disk_size;
        self
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Declared content size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content(&self) -> &ObjectContent {
        &self.content
    }

    pub fn whence(&self) -> Whence {
        self.whence
    }

    /// Bytes the object occupies in the backend (0 when not applicable).
    pub fn disk_size(&self) -> u64 {
        self.disk_size
    }

    /// Read exactly `size` bytes of content.
    ///
    /// Fails with [`StoreError::SizeMismatch`] if the content is shorter or
    /// longer than declared.
    pub fn read_content(&self) -> StoreResult<Bytes> {
        let data = match &self.content {
            ObjectContent::Inline(data) => data.clone(),
            ObjectContent::Deferred(content) => content.load()?,
        };
        if data.len() as u64 != self.size {
            return Err(StoreError::SizeMismatch {
                id: self.id,
                declared: self.size,
                actual: data.len() as u64,
            });
        }
        Ok(data)
    }

    /// Recompute the identity from type and content.
    pub fn compute_id(&self) -> StoreResult<ObjectId> {
        let data = self.read_content()?;
        Ok(ObjectHasher::new(self.id.algorithm()).hash(self.object_type, &data))
    }

    /// Validate a record before a backend stores it.
    ///
    /// Returns the verified id and content. Rejects records whose algorithm
    /// differs from the store's, whose carried id disagrees with their
    /// content, or whose id is null.
    pub(crate) fn verify_for_put(&self, algorithm: HashAlgorithm) -> StoreResult<(ObjectId, Bytes)> {
        if self.id.algorithm() != algorithm {
            return Err(StoreError::AlgorithmMismatch {
                store: algorithm,
                object: self.id.algorithm(),
            });
        }
        let data = self.read_content()?;
        let computed = ObjectHasher::new(algorithm).hash(self.object_type, &data);
        if computed != self.id {
            return Err(StoreError::HashMismatch {
                claimed: self.id,
                computed,
            });
        }
        if computed.is_null() {
            return Err(StoreError::NullObjectId);
        }
        Ok((computed, data))
    }
}
