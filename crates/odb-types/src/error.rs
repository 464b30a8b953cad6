use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown hash algorithm tag {0}")]
    UnknownAlgorithm(i32),

    #[error("unknown hash algorithm {0:?}")]
    UnknownAlgorithmName(String),

    #[error("unknown object type {0}")]
    UnknownObjectType(String),
}
