use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use git2::{ErrorCode, Odb, Oid, Repository};
use odb_types::{HashAlgorithm, ObjectId, ObjectType, TypeFilter, Whence};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{DeferredContent, EncodedObject, ObjectContent};
use crate::traits::{ObjectIter, ObjectStore};

type SharedRepo = Arc<Mutex<Option<Repository>>>;

/// The repository's own object database: loose objects and packs.
///
/// Lookups go through libgit2's object database, which searches loose files,
/// every pack under `objects/pack/`, and configured alternates, with its own
/// object cache in front. Writes land as loose objects. Only SHA-1
/// repositories are supported.
///
/// `whence` is `Loose` when `objects/xx/yyyy` exists (with `disk_size` the
/// compressed file length) and `Packed` otherwise, where `disk_size` is 0.
pub struct FilesystemObjectStore {
    objects_dir: PathBuf,
    repo: SharedRepo,
}

impl FilesystemObjectStore {
    /// Open the repository at `repo_dir` (bare, or a work tree with `.git`).
    pub fn open(repo_dir: &Path, algorithm: HashAlgorithm) -> StoreResult<Self> {
        if algorithm != HashAlgorithm::Sha1 {
            return Err(StoreError::UnsupportedAlgorithm {
                backend: "filesystem",
                algorithm,
            });
        }
        let repo = Repository::open(repo_dir)?;
        let objects_dir = repo.path().join("objects");
        debug!(path = %objects_dir.display(), "opened repository object database");
        Ok(Self {
            objects_dir,
            repo: Arc::new(Mutex::new(Some(repo))),
        })
    }

    fn loose_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    fn location(&self, id: &ObjectId) -> (Whence, u64) {
        match fs::metadata(self.loose_path(id)) {
            Ok(meta) if meta.is_file() => (Whence::Loose, meta.len()),
            _ => (Whence::Packed, 0),
        }
    }

    fn with_odb<T>(&self, f: impl FnOnce(&Odb<'_>) -> StoreResult<T>) -> StoreResult<T> {
        with_odb(&self.repo, f)
    }
}

fn with_odb<T>(
    repo: &Mutex<Option<Repository>>,
    f: impl FnOnce(&Odb<'_>) -> StoreResult<T>,
) -> StoreResult<T> {
    let guard = repo.lock().expect("lock poisoned");
    let repo = guard.as_ref().ok_or(StoreError::Closed)?;
    let odb = repo.odb()?;
    f(&odb)
}

fn to_oid(id: &ObjectId) -> StoreResult<Oid> {
    Ok(Oid::from_bytes(id.as_bytes())?)
}

/// Map a lookup failure, turning libgit2's not-found into ours.
fn lookup_error(id: ObjectId) -> impl FnOnce(git2::Error) -> StoreError {
    move |e| {
        if e.code() == ErrorCode::NotFound {
            StoreError::NotFound(id)
        } else {
            StoreError::Git(e)
        }
    }
}

fn from_git_kind(kind: git2::ObjectType) -> Option<ObjectType> {
    match kind {
        git2::ObjectType::Commit => Some(ObjectType::Commit),
        git2::ObjectType::Tree => Some(ObjectType::Tree),
        git2::ObjectType::Blob => Some(ObjectType::Blob),
        git2::ObjectType::Tag => Some(ObjectType::Tag),
        git2::ObjectType::Any => None,
    }
}

fn to_git_kind(object_type: ObjectType) -> git2::ObjectType {
    match object_type {
        ObjectType::Commit => git2::ObjectType::Commit,
        ObjectType::Tree => git2::ObjectType::Tree,
        ObjectType::Blob => git2::ObjectType::Blob,
        ObjectType::Tag => git2::ObjectType::Tag,
    }
}

impl ObjectStore for FilesystemObjectStore {
    fn hash_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha1
    }

    fn get(&self, id: &ObjectId, filter: TypeFilter) -> StoreResult<EncodedObject> {
        if id.algorithm() != HashAlgorithm::Sha1 {
            return Err(StoreError::NotFound(*id));
        }
        let oid = to_oid(id)?;
        let (size, kind) = self.with_odb(|odb| odb.read_header(oid).map_err(lookup_error(*id)))?;
        let object_type = from_git_kind(kind).ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: format!("unexpected object kind {}", kind.str()),
        })?;
        if !filter.matches(object_type) {
            return Err(StoreError::NotFound(*id));
        }

        let (whence, disk_size) = self.location(id);
        let repo = Arc::clone(&self.repo);
        let id = *id;
        let content = DeferredContent::new(move || {
            with_odb(&repo, |odb| {
                let object = odb.read(oid).map_err(lookup_error(id))?;
                Ok(Bytes::copy_from_slice(object.data()))
            })
        });
        Ok(
            EncodedObject::new(id, object_type, size as u64, ObjectContent::Deferred(content))
                .with_location(whence, disk_size),
        )
    }

    fn put(&self, object: &EncodedObject) -> StoreResult<ObjectId> {
        let (id, data) = object.verify_for_put(HashAlgorithm::Sha1)?;
        let kind = to_git_kind(object.object_type());
        let written = self.with_odb(|odb| Ok(odb.write(kind, &data)?))?;
        if written.as_bytes() != id.as_bytes() {
            let computed = ObjectId::from_hash(HashAlgorithm::Sha1, written.as_bytes())
                .unwrap_or(ObjectId::null(HashAlgorithm::Sha1));
            return Err(StoreError::HashMismatch {
                claimed: id,
                computed,
            });
        }
        debug!(%id, size = data.len(), "wrote object");
        Ok(id)
    }

    fn has(&self, id: &ObjectId) -> StoreResult<bool> {
        if id.algorithm() != HashAlgorithm::Sha1 {
            return Ok(false);
        }
        let oid = to_oid(id)?;
        self.with_odb(|odb| Ok(odb.exists(oid)))
    }

    fn size(&self, id: &ObjectId) -> StoreResult<u64> {
        if id.algorithm() != HashAlgorithm::Sha1 {
            return Err(StoreError::NotFound(*id));
        }
        let oid = to_oid(id)?;
        let (size, _) = self.with_odb(|odb| odb.read_header(oid).map_err(lookup_error(*id)))?;
        Ok(size as u64)
    }

    fn iter(&self, filter: TypeFilter) -> StoreResult<ObjectIter<'_>> {
        // foreach reports an object once per location holding it.
        let oids = self.with_odb(|odb| {
            let mut oids = BTreeSet::new();
            odb.foreach(|oid| {
                oids.insert(*oid);
                true
            })?;
            Ok(oids)
        })?;
        debug!(count = oids.len(), "listed repository objects");

        let iter = oids.into_iter().filter_map(move |oid| {
            let id = ObjectId::from_hash(HashAlgorithm::Sha1, oid.as_bytes()).ok()?;
            match self.get(&id, filter) {
                Ok(object) => Some(Ok(object)),
                // Filtered out, or pruned since the listing.
                Err(StoreError::NotFound(_)) => None,
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::new(iter))
    }

    fn close(&self) -> StoreResult<()> {
        if self.repo.lock().expect("lock poisoned").take().is_some() {
            debug!(path = %self.objects_dir.display(), "closed repository object database");
        }
        Ok(())
    }
}

impl std::fmt::Debug for FilesystemObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemObjectStore")
            .field("objects_dir", &self.objects_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn repo() -> (tempfile::TempDir, FilesystemObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        Repository::init_bare(dir.path()).unwrap();
        let store = FilesystemObjectStore::open(dir.path(), HashAlgorithm::Sha1).unwrap();
        (dir, store)
    }

    fn blob(data: &[u8]) -> EncodedObject {
        EncodedObject::from_bytes(HashAlgorithm::Sha1, ObjectType::Blob, data.to_vec())
    }

    /// Move `ids` into a new pack and delete their loose files, as
    /// `git repack -a -d && git prune-packed` would.
    fn pack_and_prune(repo_dir: &Path, ids: &[ObjectId]) {
        let repo = Repository::open(repo_dir).unwrap();
        let mut builder = repo.packbuilder().unwrap();
        for id in ids {
            builder.insert_object(to_oid(id).unwrap(), None).unwrap();
        }
        let mut pack = git2::Buf::new();
        builder.write_buf(&mut pack).unwrap();

        let odb = repo.odb().unwrap();
        let mut writer = odb.packwriter().unwrap();
        writer.write_all(&pack).unwrap();
        writer.commit().unwrap();

        for id in ids {
            let hex = id.to_hex();
            fs::remove_file(repo_dir.join("objects").join(&hex[..2]).join(&hex[2..])).unwrap();
        }
    }

    #[test]
    fn put_and_get_loose() {
        let (_dir, store) = repo();
        let id = store.put(&blob(b"hello world")).unwrap();
        assert_eq!(id.to_hex(), "95d09f2b10159347eece71399a7e2e907ea3df4f");
        assert!(store.loose_path(&id).is_file());

        let obj = store.get(&id, TypeFilter::Any).unwrap();
        assert_eq!(obj.object_type(), ObjectType::Blob);
        assert_eq!(obj.size(), 11);
        assert_eq!(obj.whence(), Whence::Loose);
        assert!(obj.disk_size() > 0);
        assert_eq!(obj.read_content().unwrap().as_ref(), b"hello world");
        assert_eq!(store.size(&id).unwrap(), 11);
    }

    #[test]
    fn reads_packed_objects() {
        let (dir, store) = repo();
        let id = store.put(&blob(b"hello world")).unwrap();
        let tree = store
            .put(&EncodedObject::from_bytes(HashAlgorithm::Sha1, ObjectType::Tree, &b""[..]))
            .unwrap();
        pack_and_prune(dir.path(), &[id, tree]);
        assert!(!store.loose_path(&id).exists());

        let store = FilesystemObjectStore::open(dir.path(), HashAlgorithm::Sha1).unwrap();
        assert!(store.has(&id).unwrap());
        assert_eq!(store.size(&id).unwrap(), 11);
        let obj = store.get(&id, TypeFilter::Any).unwrap();
        assert_eq!(obj.whence(), Whence::Packed);
        assert_eq!(obj.disk_size(), 0);
        assert_eq!(obj.read_content().unwrap().as_ref(), b"hello world");
        assert_eq!(obj.compute_id().unwrap(), id);

        let trees: Vec<_> = store
            .iter(ObjectType::Tree.into())
            .unwrap()
            .collect::<StoreResult<_>>()
            .unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].id(), tree);
    }

    #[test]
    fn reads_objects_written_by_libgit2() {
        let (dir, store) = repo();
        let oid = Repository::open(dir.path()).unwrap().blob(b"hello").unwrap();
        let id = ObjectId::from_hash(HashAlgorithm::Sha1, oid.as_bytes()).unwrap();
        assert_eq!(id.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
        let obj = store.get(&id, ObjectType::Blob.into()).unwrap();
        assert_eq!(obj.read_content().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn type_filter_mismatch_is_not_found() {
        let (_dir, store) = repo();
        let id = store.put(&blob(b"filtered")).unwrap();
        assert!(matches!(
            store.get(&id, ObjectType::Commit.into()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn missing_object() {
        let (_dir, store) = repo();
        let id = blob(b"never written").id();
        assert!(!store.has(&id).unwrap());
        assert!(matches!(store.get(&id, TypeFilter::Any), Err(StoreError::NotFound(_))));
        assert!(matches!(store.size(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn put_is_idempotent_and_iter_deduplicates() {
        let (dir, store) = repo();
        let obj = blob(b"twice");
        assert_eq!(store.put(&obj).unwrap(), store.put(&obj).unwrap());
        store.put(&blob(b"other")).unwrap();
        assert_eq!(store.iter(TypeFilter::Any).unwrap().count(), 2);

        // Packed without pruning: present loose and in a pack.
        let repo = Repository::open(dir.path()).unwrap();
        let mut builder = repo.packbuilder().unwrap();
        builder.insert_object(to_oid(&obj.id()).unwrap(), None).unwrap();
        let mut pack = git2::Buf::new();
        builder.write_buf(&mut pack).unwrap();
        let odb = repo.odb().unwrap();
        let mut writer = odb.packwriter().unwrap();
        writer.write_all(&pack).unwrap();
        writer.commit().unwrap();

        let store = FilesystemObjectStore::open(dir.path(), HashAlgorithm::Sha1).unwrap();
        assert_eq!(store.iter(TypeFilter::Any).unwrap().count(), 2);
    }

    #[test]
    fn other_algorithm_ids_are_absent() {
        let (_dir, store) = repo();
        let id = EncodedObject::from_bytes(HashAlgorithm::Sha256, ObjectType::Blob, &b"x"[..]).id();
        assert!(!store.has(&id).unwrap());
        assert!(matches!(store.get(&id, TypeFilter::Any), Err(StoreError::NotFound(_))));
        let err = store
            .put(&EncodedObject::from_bytes(HashAlgorithm::Sha256, ObjectType::Blob, &b"x"[..]))
            .unwrap_err();
        assert!(matches!(err, StoreError::AlgorithmMismatch { .. }));
    }

    #[test]
    fn sha256_and_non_repositories_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FilesystemObjectStore::open(dir.path(), HashAlgorithm::Sha1),
            Err(StoreError::Git(_))
        ));
        Repository::init_bare(dir.path()).unwrap();
        assert!(matches!(
            FilesystemObjectStore::open(dir.path(), HashAlgorithm::Sha256),
            Err(StoreError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let (_dir, store) = repo();
        let id = store.put(&blob(b"before close")).unwrap();
        let obj = store.get(&id, TypeFilter::Any).unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(matches!(store.has(&id), Err(StoreError::Closed)));
        assert!(matches!(obj.read_content(), Err(StoreError::Closed)));
    }
}
