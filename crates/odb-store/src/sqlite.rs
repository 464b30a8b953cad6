use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use odb_types::{HashAlgorithm, ObjectId, ObjectType, TypeFilter, Whence};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{EncodedObject, ObjectContent};
use crate::traits::{ObjectIter, ObjectStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS objects (
    oid  BLOB PRIMARY KEY,
    type INTEGER NOT NULL,
    size INTEGER NOT NULL,
    data BLOB NOT NULL
) WITHOUT ROWID;
";

/// Key-value object store backed by a single SQLite table.
///
/// Rows are keyed by the meaningful digest bytes of the id. The connection
/// lives behind a `Mutex`, so calls from concurrent workers are serialized.
/// After [`close`](ObjectStore::close) every operation fails with
/// [`StoreError::Closed`].
pub struct SqliteObjectStore {
    path: PathBuf,
    algorithm: HashAlgorithm,
    conn: Mutex<Option<Connection>>,
}

impl SqliteObjectStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path, algorithm: HashAlgorithm) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), %algorithm, "opened sqlite object store");
        Ok(Self {
            path: path.to_path_buf(),
            algorithm,
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self.conn.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StoreError::Closed),
        }
    }

    fn decode_type(id: &ObjectId, code: i64) -> StoreResult<ObjectType> {
        i32::try_from(code)
            .ok()
            .and_then(|code| ObjectType::from_code(code).ok())
            .ok_or_else(|| StoreError::CorruptObject {
                id: *id,
                reason: format!("invalid type code {code}"),
            })
    }
}

impl ObjectStore for SqliteObjectStore {
    fn hash_algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn get(&self, id: &ObjectId, filter: TypeFilter) -> StoreResult<EncodedObject> {
        if id.algorithm() != self.algorithm {
            return Err(StoreError::NotFound(*id));
        }
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT type, size, data FROM objects WHERE oid = ?1",
                    params![id.as_bytes()],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, Vec<u8>>(2)?)),
                )
                .optional()?)
        })?;
        let (code, size, data) = row.ok_or(StoreError::NotFound(*id))?;
        let object_type = Self::decode_type(id, code)?;
        if !filter.matches(object_type) {
            return Err(StoreError::NotFound(*id));
        }
        let disk_size = data.len() as u64;
        let size = u64::try_from(size).map_err(|_| StoreError::CorruptObject {
            id: *id,
            reason: format!("negative size {size}"),
        })?;
        Ok(
            EncodedObject::new(*id, object_type, size, ObjectContent::Inline(Bytes::from(data)))
                .with_location(Whence::DbCached, disk_size),
        )
    }

    fn put(&self, object: &EncodedObject) -> StoreResult<ObjectId> {
        let (id, data) = object.verify_for_put(self.algorithm)?;
        let inserted = self.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT OR IGNORE INTO objects (oid, type, size, data) VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.as_bytes(),
                    object.object_type().code(),
                    data.len() as i64,
                    data.as_ref()
                ],
            )?)
        })?;
        debug!(%id, inserted = inserted > 0, "sqlite put");
        Ok(id)
    }

    fn has(&self, id: &ObjectId) -> StoreResult<bool> {
        if id.algorithm() != self.algorithm {
            return Ok(false);
        }
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM objects WHERE oid = ?1",
                    params![id.as_bytes()],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }

    fn size(&self, id: &ObjectId) -> StoreResult<u64> {
        if id.algorithm() != self.algorithm {
            return Err(StoreError::NotFound(*id));
        }
        let size = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT size FROM objects WHERE oid = ?1",
                    params![id.as_bytes()],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?)
        })?;
        let size = size.ok_or(StoreError::NotFound(*id))?;
        u64::try_from(size).map_err(|_| StoreError::CorruptObject {
            id: *id,
            reason: format!("negative size {size}"),
        })
    }

    /// Keys are listed up front; records are loaded one at a time as the
    /// iterator advances.
    fn iter(&self, filter: TypeFilter) -> StoreResult<ObjectIter<'_>> {
        let keys: Vec<Vec<u8>> = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT oid FROM objects WHERE ?1 = ?2 OR type = ?1 ORDER BY oid")?;
            let rows = stmt.query_map(params![filter.code(), TypeFilter::ANY_CODE], |row| {
                row.get::<_, Vec<u8>>(0)
            })?;
            Ok(rows.collect::<Result<_, _>>()?)
        })?;

        let algorithm = self.algorithm;
        let iter = keys.into_iter().filter_map(move |key| {
            let id = match ObjectId::from_hash(algorithm, &key) {
                Ok(id) => id,
                Err(e) => {
                    return Some(Err(StoreError::CorruptObject {
                        id: ObjectId::null(algorithm),
                        reason: e.to_string(),
                    }))
                }
            };
            match self.get(&id, filter) {
                Ok(object) => Some(Ok(object)),
                Err(StoreError::NotFound(_)) => None,
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::new(iter))
    }

    fn close(&self) -> StoreResult<()> {
        let conn = self.conn.lock().expect("lock poisoned").take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            debug!(path = %self.path.display(), "closed sqlite object store");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqliteObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteObjectStore")
            .field("path", &self.path)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}
