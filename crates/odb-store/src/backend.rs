use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use odb_types::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::filesystem::FilesystemObjectStore;
use crate::memory::InMemoryObjectStore;
use crate::sqlite::SqliteObjectStore;
use crate::traits::ObjectStore;

/// Which storage backend a daemon serves from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The repository's object database, loose and packed.
    #[default]
    #[serde(alias = "loose")]
    Filesystem,
    /// Process memory; nothing survives a restart.
    Memory,
    /// A SQLite database file.
    Sqlite,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Filesystem, Self::Memory, Self::Sqlite];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("loose") {
            return Ok(Self::Filesystem);
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown backend '{s}' (expected filesystem, memory or sqlite)"))
    }
}

/// Open the backend `kind` for the repository at `repo_dir`.
///
/// `sqlite_path` only applies to [`BackendKind::Sqlite`]; when absent the
/// database lives at `<repo_dir>/objects/odb.sqlite3`.
pub fn open_backend(
    kind: BackendKind,
    repo_dir: &Path,
    sqlite_path: Option<&Path>,
    algorithm: HashAlgorithm,
) -> StoreResult<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match kind {
        BackendKind::Filesystem => Arc::new(FilesystemObjectStore::open(repo_dir, algorithm)?),
        BackendKind::Memory => Arc::new(InMemoryObjectStore::new(algorithm)),
        BackendKind::Sqlite => {
            let default_path = repo_dir.join("objects").join("odb.sqlite3");
            let path = sqlite_path.unwrap_or(&default_path);
            Arc::new(SqliteObjectStore::open(path, algorithm)?)
        }
    };
    tracing::info!(backend = %kind, repo = %repo_dir.display(), %algorithm, "opened object store");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use odb_types::{ObjectType, TypeFilter};

    use crate::object::EncodedObject;

    #[test]
    fn parse_backend_kind() {
        assert_eq!("filesystem".parse::<BackendKind>().unwrap(), BackendKind::Filesystem);
        assert_eq!("loose".parse::<BackendKind>().unwrap(), BackendKind::Filesystem);
        assert_eq!("SQLite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert!("packed".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::default(), BackendKind::Filesystem);
    }

    #[test]
    fn every_backend_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        git2::Repository::init_bare(dir.path()).unwrap();
        for kind in BackendKind::ALL {
            let store = open_backend(kind, dir.path(), None, HashAlgorithm::Sha1).unwrap();
            let obj = EncodedObject::from_bytes(HashAlgorithm::Sha1, ObjectType::Blob, &b"hello"[..]);
            let id = store.put(&obj).unwrap();
            assert_eq!(id.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0", "{kind}");
            let read = store.get(&id, TypeFilter::Any).unwrap();
            assert_eq!(read.read_content().unwrap().as_ref(), b"hello", "{kind}");
            store.close().unwrap();
        }
        assert!(dir.path().join("objects").join("odb.sqlite3").exists());
    }

    #[test]
    fn explicit_sqlite_path() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("elsewhere").join("db.sqlite3");
        let store =
            open_backend(BackendKind::Sqlite, dir.path(), Some(&db), HashAlgorithm::Sha256).unwrap();
        assert_eq!(store.hash_algorithm(), HashAlgorithm::Sha256);
        assert!(db.exists());
    }
}
