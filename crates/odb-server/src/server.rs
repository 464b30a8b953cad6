use std::future::Future;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use odb_store::{open_backend, ObjectStore};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::connection::{CloseReason, Connection};
use crate::dispatcher::Dispatcher;
use crate::error::{ServerError, ServerResult};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Object database daemon.
///
/// Owns the listening socket and the shared store. Each accepted connection
/// runs on its own task; at most `max_connections` run at once.
pub struct OdbServer {
    config: DaemonConfig,
    store: Arc<dyn ObjectStore>,
}

impl OdbServer {
    pub fn new(config: DaemonConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    /// Open the backend named in `config` and build a server around it.
    pub fn open(config: DaemonConfig) -> ServerResult<Self> {
        config.validate()?;
        let sqlite_path = config.sqlite_path();
        let store = open_backend(
            config.backend,
            &config.repo_dir,
            Some(&sqlite_path),
            config.hash_algorithm,
        )?;
        Ok(Self::new(config, store))
    }

    pub fn socket_path(&self) -> PathBuf {
        self.config.socket_path()
    }

    /// Bind the socket, clearing out a stale socket file first.
    ///
    /// Fails with [`ServerError::AlreadyRunning`] if something answers on
    /// the existing socket.
    pub async fn bind(&self) -> ServerResult<UnixListener> {
        let path = self.socket_path();
        if tokio::fs::symlink_metadata(&path).await.is_ok() {
            if UnixStream::connect(&path).await.is_ok() {
                return Err(ServerError::AlreadyRunning(path));
            }
            warn!(socket = %path.display(), "removing stale socket");
            tokio::fs::remove_file(&path).await?;
        }
        let listener = UnixListener::bind(&path)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        Ok(listener)
    }

    /// Bind and serve until `shutdown` resolves.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> ServerResult<()> {
        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                if let Err(close_err) = self.store.close() {
                    warn!(error = %close_err, "failed to close store");
                }
                return Err(e);
            }
        };
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves, then
    /// drain connections, close the store and remove the socket file.
    pub async fn serve_on(
        self,
        listener: UnixListener,
        shutdown: impl Future<Output = ()>,
    ) -> ServerResult<()> {
        let socket = self.socket_path();
        let dispatcher = Dispatcher::new(Arc::clone(&self.store));
        let permits = Arc::new(Semaphore::new(self.config.max_connections));
        let mut workers: JoinSet<CloseReason> = JoinSet::new();
        let mut next_id = 0u64;
        tokio::pin!(shutdown);

        info!(
            socket = %socket.display(),
            backend = %self.config.backend,
            algorithm = %self.config.hash_algorithm,
            max_connections = self.config.max_connections,
            "daemon listening"
        );

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let stream = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            next_id += 1;
            debug!(conn = next_id, "connection accepted");
            let conn = Connection::new(next_id, stream, dispatcher.clone());
            workers.spawn(async move {
                let reason = conn.run().await;
                drop(permit);
                reason
            });
            while let Some(done) = workers.try_join_next() {
                Self::reap(done);
            }
        }

        info!(active = workers.len(), "shutting down");
        drop(listener);
        self.drain(&mut workers).await;

        let closed = self.store.close();
        Self::remove_socket(&socket)?;
        closed?;
        info!("daemon stopped");
        Ok(())
    }

    async fn drain(&self, workers: &mut JoinSet<CloseReason>) {
        let grace = self.config.shutdown_grace();
        let finished = tokio::time::timeout(grace, async {
            while let Some(done) = workers.join_next().await {
                Self::reap(done);
            }
        })
        .await;
        if finished.is_err() {
            warn!(remaining = workers.len(), ?grace, "aborting connections after grace period");
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }
    }

    fn reap(done: Result<CloseReason, tokio::task::JoinError>) {
        if let Err(e) = done {
            if e.is_panic() {
                warn!(error = %e, "connection task panicked");
            }
        }
    }

    fn remove_socket(path: &Path) -> ServerResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for OdbServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdbServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use odb_store::{BackendKind, InMemoryObjectStore, SqliteObjectStore, StoreError};
    use odb_types::{HashAlgorithm, ObjectId, ObjectType};
    use tokio::sync::oneshot;

    use crate::client::OdbClient;

    fn config(dir: &Path) -> DaemonConfig {
        DaemonConfig {
            backend: BackendKind::Memory,
            shutdown_grace_ms: 50,
            ..DaemonConfig::for_repo(dir)
        }
    }

    #[tokio::test]
    async fn serves_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let server = OdbServer::open(config(dir.path())).unwrap();
        let socket = server.socket_path();
        let listener = server.bind().await.unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_on(listener, async move {
            let _ = stopped.await;
        }));

        let mut client = OdbClient::connect(&socket).await.unwrap();
        let id = client
            .hash_object(ObjectType::Blob, Bytes::from_static(b"hello"), true)
            .await
            .unwrap();
        assert_eq!(id.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
        let (info, content) = client.get_object(id, true).await.unwrap();
        assert_eq!(info.size, 5);
        assert_eq!(content.as_ref(), b"hello");
        client.close().await.unwrap();

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn concurrent_clients_share_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryObjectStore::new(HashAlgorithm::Sha1));
        let server = OdbServer::new(config(dir.path()), store.clone());
        let socket = server.socket_path();
        let listener = server.bind().await.unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_on(listener, async move {
            let _ = stopped.await;
        }));

        let mut clients = JoinSet::new();
        for i in 0..8u8 {
            let socket = socket.clone();
            clients.spawn(async move {
                let mut client = OdbClient::connect(&socket).await.unwrap();
                let data = Bytes::from(vec![i; 16]);
                let id = client.hash_object(ObjectType::Blob, data.clone(), true).await.unwrap();
                let (_, content) = client.get_object(id, true).await.unwrap();
                assert_eq!(content, data);
            });
        }
        while let Some(done) = clients.join_next().await {
            done.unwrap();
        }
        assert_eq!(store.len(), 8);

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn idle_connections_are_aborted_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let server = OdbServer::open(config(dir.path())).unwrap();
        let socket = server.socket_path();
        let listener = server.bind().await.unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_on(listener, async move {
            let _ = stopped.await;
        }));

        // Held open without sending anything.
        let mut idle = OdbClient::connect(&socket).await.unwrap();
        idle.flush().await.unwrap();

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let server = OdbServer::open(config(dir.path())).unwrap();
        let path = server.socket_path();
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let listener = server.bind().await.unwrap();
        drop(listener);
    }

    #[tokio::test]
    async fn refuses_to_start_over_live_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let first = OdbServer::open(config(dir.path())).unwrap();
        let _listener = first.bind().await.unwrap();

        let second = OdbServer::open(config(dir.path())).unwrap();
        assert!(matches!(
            second.bind().await,
            Err(ServerError::AlreadyRunning(_))
        ));
    }

    #[tokio::test]
    async fn failed_bind_closes_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let first = OdbServer::open(config(dir.path())).unwrap();
        let _listener = first.bind().await.unwrap();

        let store = Arc::new(
            SqliteObjectStore::open(&dir.path().join("odb.sqlite3"), HashAlgorithm::Sha1).unwrap(),
        );
        let second = OdbServer::new(config(dir.path()), store.clone());
        let result = second.serve(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(ServerError::AlreadyRunning(_))));

        let id = ObjectId::null(HashAlgorithm::Sha1);
        assert!(matches!(store.has(&id), Err(StoreError::Closed)));
    }
}
