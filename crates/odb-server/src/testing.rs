//! Test-only backends.

use odb_store::{EncodedObject, ObjectIter, ObjectStore, StoreError, StoreResult};
use odb_types::{HashAlgorithm, ObjectId, TypeFilter};

/// A backend that supports nothing.
pub(crate) struct UnimplementedStore;

impl ObjectStore for UnimplementedStore {
    fn hash_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha1
    }

    fn get(&self, _id: &ObjectId, _filter: TypeFilter) -> StoreResult<EncodedObject> {
        Err(StoreError::Unimplemented("get"))
    }

    fn put(&self, _object: &EncodedObject) -> StoreResult<ObjectId> {
        Err(StoreError::Unimplemented("put"))
    }

    fn has(&self, _id: &ObjectId) -> StoreResult<bool> {
        Err(StoreError::Unimplemented("has"))
    }

    fn iter(&self, _filter: TypeFilter) -> StoreResult<ObjectIter<'_>> {
        Err(StoreError::Unimplemented("iter"))
    }

    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
