//! Application error types for backups, storage, and the service layer.
use thiserror::Error;

/// Object-store failures, with "not found" split out so callers can tell it apart.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object store error: {0}")]
    Backend(object_store::Error),
}

impl From<object_store::Error> for StoreError {
    fn from(value: object_store::Error) -> Self {
        match value {
            object_store::Error::NotFound { path, .. } => Self::NotFound(path),
            other => Self::Backend(other),
        }
    }
}

/// Failures raised by the backup naming, retention, and production paths.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid backup filename format: {0}")]
    InvalidKeyFormat(String),

    #[error("Failed to list backups: {0}")]
    StoreList(#[source] StoreError),

    #[error("Failed to delete {key}: {source}")]
    StoreDelete {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to upload {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Backup failed after {attempts} attempts: {last_error}")]
    ProducerFailure { attempts: u32, last_error: String },

    #[error("Dump failed: {0}")]
    Dump(String),

    #[error("Compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Failed to parse DATABASE_URL: {0}")]
    InvalidDatabaseUrl(String),

    #[error("Invalid storage DSN: {0}")]
    InvalidStorageDsn(String),
}

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal,
}
