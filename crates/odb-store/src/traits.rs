use odb_types::{HashAlgorithm, ObjectId, TypeFilter};

use crate::error::StoreResult;
use crate::object::EncodedObject;

/// Lazy, finite, single-pass sequence of objects.
pub type ObjectIter<'a> = Box<dyn Iterator<Item = StoreResult<EncodedObject>> + Send + 'a>;

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. Content-addressing guarantees this:
///   the same type and content always produce the same ID.
/// - `put` recomputes the id from the record; a record carrying a different
///   id is rejected.
/// - A type filter that does not match the stored object is `NotFound`, not a
///   type error.
/// - An operation the backend cannot perform fails with
///   [`StoreError::Unimplemented`](crate::StoreError::Unimplemented).
/// - The store is shared across connection workers; implementations provide
///   their own synchronization.
pub trait ObjectStore: Send + Sync {
    /// The hash algorithm this store's ids use.
    fn hash_algorithm(&self) -> HashAlgorithm;

    /// Read an object by id.
    ///
    /// Returns `Err(NotFound)` if the object does not exist or does not
    /// match `filter`.
    fn get(&self, id: &ObjectId, filter: TypeFilter) -> StoreResult<EncodedObject>;

    /// Write an object and return its content-addressed ID.
    ///
    /// If the object already exists, this is a no-op (idempotent).
    fn put(&self, object: &EncodedObject) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    fn has(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Declared size of an object.
    ///
    /// Default implementation goes through `get()`. Backends may override
    /// when the size is cheaper to obtain on its own.
    fn size(&self, id: &ObjectId) -> StoreResult<u64> {
        Ok(self.get(id, TypeFilter::Any)?.size())
    }

    /// Iterate every object matching `filter`, in backend-defined order.
    fn iter(&self, filter: TypeFilter) -> StoreResult<ObjectIter<'_>>;

    /// Release backend resources. Safe to call more than once.
    fn close(&self) -> StoreResult<()>;
}
