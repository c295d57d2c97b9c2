use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BirdsNestError>;

#[derive(Error, Debug)]
pub enum BirdsNestError {
    #[error("Key length is zero")]
    KeyLengthZero,

    #[error("Key is not a timestamp key")]
    NotTimestampKey,

    #[error("Timestamp key carries a negative timestamp")]
    TimestampKeyInvalid,

    #[error("Invalid hex transaction id: {0}")]
    InvalidHex(String),

    #[error("Key must not be empty")]
    EmptyKey,

    #[error("Birds nest length must be greater than 0")]
    ZeroLength,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Key timestamp {nano} out of range [{min}, {max}]")]
    KeyOutOfRange { nano: i64, min: i64, max: i64 },

    #[error("Cannot modify the nest configuration, persisted one is used")]
    CannotModifyConfiguration,

    #[error("Index out of bounds: index {index}, capacity {capacity}")]
    IndexOutOfBounds { index: usize, capacity: usize },

    #[error("Extension type mismatch: expected {expected}, got {actual}")]
    ExtensionMismatch { expected: u64, actual: u64 },

    #[error("Invalid extension: {0}")]
    InvalidExtension(String),

    #[error("Rotation made no progress after {attempts} attempts")]
    RotationStalled { attempts: usize },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Time error: {0}")]
    TimeError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BirdsNestError {
    /// Persisted configuration differs from the one used to reopen the nest.
    /// Construction logs it and carries on with the persisted values.
    pub fn is_config_drift(&self) -> bool {
        matches!(self, BirdsNestError::CannotModifyConfiguration)
    }
}

impl From<String> for BirdsNestError {
    fn from(msg: String) -> Self {
        BirdsNestError::InvalidConfig(msg)
    }
}

impl From<serde_json::Error> for BirdsNestError {
    fn from(err: serde_json::Error) -> Self {
        BirdsNestError::SerializationError(err.to_string())
    }
}

impl From<EncodeError> for BirdsNestError {
    fn from(err: EncodeError) -> Self {
        BirdsNestError::SerializationError(err.to_string())
    }
}

impl From<DecodeError> for BirdsNestError {
    fn from(err: DecodeError) -> Self {
        BirdsNestError::SerializationError(err.to_string())
    }
}

impl From<hex::FromHexError> for BirdsNestError {
    fn from(err: hex::FromHexError) -> Self {
        BirdsNestError::InvalidHex(err.to_string())
    }
}

#[cfg(feature = "redb")]
impl From<redb::Error> for BirdsNestError {
    fn from(err: redb::Error) -> Self {
        BirdsNestError::StorageError(err.to_string())
    }
}
