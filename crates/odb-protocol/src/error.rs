use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("framing error: {0}")]
    FramingError(String),

    #[error("unknown command key: {0:?}")]
    UnknownCommand(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("size mismatch: declared {declared} bytes, got {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("remote reported an error")]
    RemoteError,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// `true` for errors in how bytes were framed, as opposed to what a
    /// well-framed payload said.
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::FramingError(_))
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
