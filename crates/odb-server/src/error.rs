use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] odb_protocol::ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] odb_store::StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("a daemon is already listening on {}", .0.display())]
    AlreadyRunning(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
