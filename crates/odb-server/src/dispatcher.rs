use std::sync::Arc;

use bytes::Bytes;
use odb_crypto::ObjectHasher;
use odb_protocol::{ObjectInfo, ProtocolError, Request, Response, HASH_OBJECT_WRITE};
use odb_store::{EncodedObject, ObjectContent, ObjectStore, StoreError, StoreResult};
use odb_types::{ObjectId, ObjectType, TypeFilter};
use tracing::debug;

use crate::error::{ServerError, ServerResult};

/// What the connection should do after a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Keep reading requests, writing the response first if there is one.
    Continue(Option<Response>),
    /// Close the connection cleanly.
    Close,
}

/// Maps decoded requests onto storage calls.
///
/// Storage work runs on the blocking pool so a slow backend only stalls the
/// connection that asked.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn ObjectStore>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn dispatch(&self, request: Request) -> ServerResult<Action> {
        match request {
            Request::Flush => Ok(Action::Continue(None)),
            Request::StreamEnd => Ok(Action::Close),
            Request::GetObject {
                id, want_content, ..
            } => {
                let response = self.get_object(id, want_content != 0).await?;
                Ok(Action::Continue(Some(response)))
            }
            Request::HashObject {
                object_type,
                flags,
                size,
                content,
            } => {
                let response = self.hash_object(object_type, flags, size, content).await?;
                Ok(Action::Continue(Some(response)))
            }
        }
    }

    async fn get_object(&self, id: ObjectId, want_content: bool) -> ServerResult<Response> {
        let store = Arc::clone(&self.store);
        let delta_base = ObjectId::null(store.hash_algorithm());
        let (object, content) = self
            .blocking(move || {
                let object = store.get(&id, TypeFilter::Any)?;
                let content = if want_content {
                    object.read_content()?
                } else {
                    Bytes::new()
                };
                Ok((object, content))
            })
            .await
            .map_err(|e| match e {
                ServerError::Store(StoreError::SizeMismatch {
                    declared, actual, ..
                }) => ProtocolError::SizeMismatch { declared, actual }.into(),
                other => other,
            })?;

        let size = u32::try_from(object.size()).map_err(|_| {
            ProtocolError::InvalidPayload(format!(
                "object {} is {} bytes, too large to describe",
                object.id(),
                object.size()
            ))
        })?;
        debug!(%id, size, whence = ?object.whence(), with_content = want_content, "object found");

        Ok(Response::ObjectInfo {
            info: ObjectInfo {
                id: object.id(),
                delta_base,
                disk_size: i64::try_from(object.disk_size()).unwrap_or(i64::MAX),
                size,
                whence: object.whence(),
                object_type: object.object_type(),
            },
            content,
        })
    }

    async fn hash_object(
        &self,
        object_type: i32,
        flags: u32,
        size: u64,
        content: Bytes,
    ) -> ServerResult<Response> {
        let object_type = ObjectType::from_code(object_type)
            .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
        if content.len() as u64 != size {
            return Err(ProtocolError::SizeMismatch {
                declared: size,
                actual: content.len() as u64,
            }
            .into());
        }

        let id = ObjectHasher::new(self.store.hash_algorithm()).hash(object_type, &content);
        if flags & HASH_OBJECT_WRITE == 0 {
            debug!(%id, %object_type, "hashed object");
            return Ok(Response::HashResult { id });
        }

        let store = Arc::clone(&self.store);
        let object = EncodedObject::new(id, object_type, size, ObjectContent::Inline(content));
        let stored = self.blocking(move || store.put(&object)).await?;
        if stored.is_null() {
            return Err(StoreError::NullObjectId.into());
        }
        if stored != id {
            return Err(StoreError::HashMismatch {
                claimed: id,
                computed: stored,
            }
            .into());
        }
        debug!(%id, %object_type, "stored object");
        Ok(Response::HashResult { id })
    }

    async fn blocking<T, F>(&self, f: F) -> ServerResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> StoreResult<T> + Send + 'static,
    {
        let result = tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| ServerError::Internal(format!("storage task failed: {e}")))?;
        Ok(result?)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("algorithm", &self.store.hash_algorithm())
            .finish()
    }
}
