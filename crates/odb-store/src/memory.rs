use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use odb_types::{HashAlgorithm, ObjectId, ObjectType, TypeFilter, Whence};

use crate::error::{StoreError, StoreResult};
use crate::object::{EncodedObject, ObjectContent};
use crate::traits::{ObjectIter, ObjectStore};

#[derive(Clone)]
struct Entry {
    object_type: ObjectType,
    data: Bytes,
}

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. All objects are held in memory behind a
/// `RwLock` for safe concurrent access. Content is reference-counted, so
/// reads do not copy object data.
pub struct InMemoryObjectStore {
    algorithm: HashAlgorithm,
    objects: RwLock<HashMap<ObjectId, Entry>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    fn to_object(id: ObjectId, entry: &Entry) -> EncodedObject {
        EncodedObject::new(
            id,
            entry.object_type,
            entry.data.len() as u64,
            ObjectContent::Inline(entry.data.clone()),
        )
        .with_location(Whence::Cached, 0)
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn hash_algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn get(&self, id: &ObjectId, filter: TypeFilter) -> StoreResult<EncodedObject> {
        let map = self.objects.read().expect("lock poisoned");
        match map.get(id) {
            Some(entry) if filter.matches(entry.object_type) => Ok(Self::to_object(*id, entry)),
            _ => Err(StoreError::NotFound(*id)),
        }
    }

    fn put(&self, object: &EncodedObject) -> StoreResult<ObjectId> {
        let (id, data) = object.verify_for_put(self.algorithm)?;
        let mut map = self.objects.write().expect("lock poisoned");
        map.entry(id).or_insert_with(|| Entry {
            object_type: object.object_type(),
            data,
        });
        Ok(id)
    }

    fn has(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }

    fn size(&self, id: &ObjectId) -> StoreResult<u64> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(id)
            .map(|entry| entry.data.len() as u64)
            .ok_or(StoreError::NotFound(*id))
    }

    fn iter(&self, filter: TypeFilter) -> StoreResult<ObjectIter<'_>> {
        // Snapshot so the lock is not held while the caller iterates.
        let map = self.objects.read().expect("lock poisoned");
        let snapshot: Vec<EncodedObject> = map
            .iter()
            .filter(|(_, entry)| filter.matches(entry.object_type))
            .map(|(id, entry)| Self::to_object(*id, entry))
            .collect();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryObjectStore")
            .field("algorithm", &self.algorithm)
            .field("object_count", &count)
            .finish()
    }
}
