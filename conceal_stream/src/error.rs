use std::io::ErrorKind;
use thiserror::Error;

/// Failures reported by a [`CipherEngine`](crate::CipherEngine).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Cipher has already been initialized")]
    AlreadyInitialized,

    #[error("Cipher has not been initialized")]
    NotInitialized,

    #[error("Cipher has not been finalized")]
    NotFinalized,

    #[error("Unsupported key length: {0} bytes")]
    InvalidKeyLength(usize),

    #[error("IV must be {expected} bytes, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },

    #[error("Final block rejected: {0}")]
    BadFinal(&'static str),
}

#[derive(Error, Debug)]
pub enum Error {
    /// The engine couldn't be set up, so no reader was built.
    #[error("Couldn't initialize cipher: {0}")]
    EngineInit(#[source] EngineError),

    /// `update` or `finalize` failed. The reader must be discarded.
    #[error("Cipher failed: {0}")]
    EngineTransform(#[source] EngineError),

    /// Reading the wrapped source failed.
    #[error("IO Error: {0}")]
    IO(#[from] std::io::Error),

    /// Writing to the sink given to
    /// [`drain_and_verify`](crate::CipherReader::drain_and_verify) failed.
    #[error("Couldn't write to sink: {0}")]
    Sink(#[source] std::io::Error),
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::IO(err) | Error::Sink(err) => err,
            err => std::io::Error::new(ErrorKind::InvalidData, err),
        }
    }
}
