use odb_protocol::{OdbCodec, ProtocolError, Response};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::dispatcher::{Action, Dispatcher};
use crate::error::ServerError;

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client ended the stream between requests.
    Clean,
    /// A request failed; the error sentinel was sent if possible.
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingRequest,
    Dispatching,
    Closed(CloseReason),
}

/// One client connection: reads requests, dispatches them, writes
/// responses, strictly one at a time.
pub struct Connection<S> {
    id: u64,
    stream: BufStream<S>,
    dispatcher: Dispatcher,
    state: ConnectionState,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(id: u64, stream: S, dispatcher: Dispatcher) -> Self {
        Self {
            id,
            stream: BufStream::new(stream),
            dispatcher,
            state: ConnectionState::AwaitingRequest,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Serve requests until the connection closes.
    pub async fn run(mut self) -> CloseReason {
        let span = info_span!("conn", id = self.id);
        async move {
            info!("connection opened");
            let reason = loop {
                if let ConnectionState::Closed(reason) = self.step().await {
                    break reason;
                }
            };
            if let Err(e) = self.stream.shutdown().await {
                debug!(error = %e, "shutdown failed");
            }
            info!(?reason, "connection closed");
            reason
        }
        .instrument(span)
        .await
    }

    /// Handle one request. A closed connection stays closed.
    pub async fn step(&mut self) -> ConnectionState {
        if let ConnectionState::Closed(_) = self.state {
            return self.state;
        }
        self.state = self.process().await;
        self.state
    }

    async fn process(&mut self) -> ConnectionState {
        let request = match OdbCodec::read_request(&mut self.stream).await {
            Ok(request) => request,
            Err(e) => return self.fail(e.into()).await,
        };
        debug!(request = request.name(), "request");

        self.state = ConnectionState::Dispatching;
        match self.dispatcher.dispatch(request).await {
            Ok(Action::Continue(None)) => ConnectionState::AwaitingRequest,
            Ok(Action::Continue(Some(response))) => {
                match OdbCodec::write_response(&mut self.stream, &response).await {
                    Ok(()) => ConnectionState::AwaitingRequest,
                    // Nothing reached the stream yet, so the sentinel can still go out.
                    Err(e @ ProtocolError::FrameTooLarge { .. }) => self.fail(e.into()).await,
                    Err(e) => {
                        warn!(error = %e, response = response.name(), "failed to write response");
                        ConnectionState::Closed(CloseReason::Error)
                    }
                }
            }
            Ok(Action::Close) => ConnectionState::Closed(CloseReason::Clean),
            Err(e) => self.fail(e).await,
        }
    }

    async fn fail(&mut self, error: ServerError) -> ConnectionState {
        warn!(%error, "request failed");
        if let Err(e) = OdbCodec::write_response(&mut self.stream, &Response::Error).await {
            debug!(error = %e, "could not send error sentinel");
        }
        ConnectionState::Closed(CloseReason::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bytes::Bytes;
    use odb_protocol::{CommandKey, ObjectInfo, Request, HASH_OBJECT_WRITE};
    use odb_store::{EncodedObject, InMemoryObjectStore, ObjectStore};
    use odb_types::{HashAlgorithm, ObjectId, ObjectType, Whence};
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::task::JoinHandle;

    use crate::testing::UnimplementedStore;

    fn spawn(store: Arc<dyn ObjectStore>) -> (DuplexStream, JoinHandle<CloseReason>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let conn = Connection::new(1, server, Dispatcher::new(store));
        (client, tokio::spawn(conn.run()))
    }

    fn memory_with(data: &[u8]) -> (Arc<InMemoryObjectStore>, ObjectId) {
        let store = Arc::new(InMemoryObjectStore::default());
        let id = store
            .put(&EncodedObject::from_bytes(HashAlgorithm::Sha1, ObjectType::Blob, data.to_vec()))
            .unwrap();
        (store, id)
    }

    async fn send(client: &mut DuplexStream, request: &Request) {
        OdbCodec::write_request(client, request).await.unwrap();
    }

    async fn read_all(mut client: DuplexStream) -> Vec<u8> {
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn eleven_byte_blob_with_content() {
        let (store, id) = memory_with(b"hello world");
        let (mut client, worker) = spawn(store);

        send(&mut client, &Request::GetObject { id, flags: 0, want_content: 1 }).await;
        client.shutdown().await.unwrap();
        let wire = read_all(client).await;

        // Fixed struct, 11 content bytes, then the flush terminator.
        assert_eq!(wire.len(), 4 + 112 + 11 + 4);
        assert_eq!(&wire[..4], format!("{:04x}", 4 + 112 + 11).as_bytes());
        assert_eq!(&wire[4 + 112..4 + 112 + 11], b"hello world");
        assert_eq!(&wire[wire.len() - 4..], b"0000");

        let (response, _) = OdbCodec::decode_response(&wire).unwrap();
        assert_eq!(
            response,
            Response::ObjectInfo {
                info: ObjectInfo {
                    id,
                    delta_base: ObjectId::null(HashAlgorithm::Sha1),
                    disk_size: 0,
                    size: 11,
                    whence: Whence::Cached,
                    object_type: ObjectType::Blob,
                },
                content: Bytes::from_static(b"hello world"),
            }
        );
        assert_eq!(worker.await.unwrap(), CloseReason::Clean);
    }

    #[tokio::test]
    async fn without_content_sends_struct_only() {
        let (store, id) = memory_with(b"hello world");
        let (mut client, worker) = spawn(store);

        send(&mut client, &Request::GetObject { id, flags: 0, want_content: 0 }).await;
        client.shutdown().await.unwrap();
        let wire = read_all(client).await;
        assert_eq!(wire.len(), 4 + 112 + 4);
        assert_eq!(&wire[..4], b"0074");
        assert_eq!(worker.await.unwrap(), CloseReason::Clean);
    }

    #[tokio::test]
    async fn flush_is_never_answered() {
        let (store, id) = memory_with(b"x");
        let (mut client, worker) = spawn(store);

        send(&mut client, &Request::Flush).await;
        send(&mut client, &Request::Flush).await;
        send(&mut client, &Request::GetObject { id, flags: 0, want_content: 0 }).await;
        client.shutdown().await.unwrap();
        let wire = read_all(client).await;

        let (response, used) = OdbCodec::decode_response(&wire).unwrap();
        assert!(matches!(response, Response::ObjectInfo { .. }));
        assert_eq!(used, wire.len());
        assert_eq!(worker.await.unwrap(), CloseReason::Clean);
    }

    #[tokio::test]
    async fn unknown_key_gets_sentinel_and_close() {
        let (mut client, worker) = spawn(Arc::new(InMemoryObjectStore::default()));

        let mut payload = CommandKey::new("list-objects").as_bytes().to_vec();
        payload.extend_from_slice(&[0u8; 4]);
        let mut frame = format!("{:04x}", payload.len() + 4).into_bytes();
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(b"0000");
        client.write_all(&frame).await.unwrap();

        assert_eq!(read_all(client).await, b"0009error0000");
        assert_eq!(worker.await.unwrap(), CloseReason::Error);
    }

    #[tokio::test]
    async fn malformed_length_gets_sentinel_and_nothing_else() {
        let (mut client, worker) = spawn(Arc::new(InMemoryObjectStore::default()));

        client.write_all(b"00ffoid\0\0\0").await.unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(read_all(client).await, b"0009error0000");
        assert_eq!(worker.await.unwrap(), CloseReason::Error);
    }

    #[tokio::test]
    async fn bad_terminator_answers_while_client_stays_open() {
        let (store, id) = memory_with(b"x");
        let (mut client, worker) = spawn(store);

        let mut wire = OdbCodec::encode_request(&Request::GetObject { id, flags: 0, want_content: 0 })
            .unwrap();
        let terminator = wire.len() - 4;
        wire[terminator..].copy_from_slice(b"0010");
        client.write_all(&wire).await.unwrap();

        let response = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            OdbCodec::read_response(&mut client),
        )
        .await
        .expect("worker stalled on a bad terminator");
        assert_eq!(response.unwrap(), Response::Error);
        assert_eq!(worker.await.unwrap(), CloseReason::Error);
    }

    #[tokio::test]
    async fn missing_object_closes_with_error() {
        let (mut client, worker) = spawn(Arc::new(InMemoryObjectStore::default()));
        let id = odb_crypto::ObjectHasher::SHA1.hash(ObjectType::Blob, b"absent");

        send(&mut client, &Request::GetObject { id, flags: 0, want_content: 1 }).await;
        // The worker closes without waiting for more input.
        assert_eq!(read_all(client).await, b"0009error0000");
        assert_eq!(worker.await.unwrap(), CloseReason::Error);
    }

    #[tokio::test]
    async fn hash_object_scenarios() {
        let store = Arc::new(InMemoryObjectStore::default());
        let (mut client, worker) = spawn(store.clone());
        let expected = odb_crypto::ObjectHasher::SHA1.hash(ObjectType::Blob, b"hello");

        let hash_only = Request::HashObject {
            object_type: ObjectType::Blob.code(),
            flags: 0,
            size: 5,
            content: Bytes::from_static(b"hello"),
        };
        send(&mut client, &hash_only).await;
        assert_eq!(
            OdbCodec::read_response(&mut client).await.unwrap(),
            Response::HashResult { id: expected }
        );
        assert!(!store.has(&expected).unwrap());

        let write = Request::HashObject {
            object_type: ObjectType::Blob.code(),
            flags: HASH_OBJECT_WRITE,
            size: 5,
            content: Bytes::from_static(b"hello"),
        };
        send(&mut client, &write).await;
        assert_eq!(
            OdbCodec::read_response(&mut client).await.unwrap(),
            Response::HashResult { id: expected }
        );
        assert!(store.has(&expected).unwrap());

        send(&mut client, &Request::GetObject { id: expected, flags: 0, want_content: 1 }).await;
        match OdbCodec::read_response(&mut client).await.unwrap() {
            Response::ObjectInfo { info, content } => {
                assert_eq!(info.size, 5);
                assert_eq!(content.as_ref(), b"hello");
            }
            other => panic!("unexpected {other:?}"),
        }

        drop(client);
        assert_eq!(worker.await.unwrap(), CloseReason::Clean);
    }

    #[tokio::test]
    async fn backend_without_support_gets_sentinel() {
        let (mut client, worker) = spawn(Arc::new(UnimplementedStore));
        let id = ObjectId::null(HashAlgorithm::Sha1);
        send(&mut client, &Request::GetObject { id, flags: 0, want_content: 0 }).await;
        assert_eq!(read_all(client).await, b"0009error0000");
        assert_eq!(worker.await.unwrap(), CloseReason::Error);
    }

    #[tokio::test]
    async fn step_tracks_state() {
        let (mut client, server) = tokio::io::duplex(1024);
        let store = Arc::new(InMemoryObjectStore::default());
        let mut conn = Connection::new(7, server, Dispatcher::new(store));
        assert_eq!(conn.state(), ConnectionState::AwaitingRequest);

        send(&mut client, &Request::Flush).await;
        assert_eq!(conn.step().await, ConnectionState::AwaitingRequest);

        client.shutdown().await.unwrap();
        assert_eq!(conn.step().await, ConnectionState::Closed(CloseReason::Clean));
        assert_eq!(conn.step().await, ConnectionState::Closed(CloseReason::Clean));
    }
}
