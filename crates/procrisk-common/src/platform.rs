//! Platform error types shared by process enumeration backends

use thiserror::Error;

/// Errors that can occur while collecting process data from the platform
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Platform not supported: {0}")]
    NotSupported(String),

    #[error("Collection failed: {0}")]
    CollectionFailed(String),

    #[error("Malformed process record: {0}")]
    Malformed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;
