//! Error types for chunkscout.
//!
//! Only the chunk producer and the setup code return errors. Failures inside
//! a worker are logged and dropped by the dispatcher, so they never show up
//! here.
//!
//! ```rust,ignore
//! match search_in_file(path, "keyword", None) {
//!     Ok(()) => {}
//!     Err(SearchError::FileNotFound(path)) => // Handle missing file,
//!     Err(SearchError::EncodingError { offset, .. }) => // Handle bad UTF-8,
//!     Err(e) => // Handle other errors
//! }
//! ```
use std::path::PathBuf;
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Invalid UTF-8 in file {path} at byte {offset}: {source}")]
    EncodingError {
        path: PathBuf,
        offset: u64,
        source: std::str::Utf8Error,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Thread pool error: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SearchError {
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn encoding_error(
        path: impl Into<PathBuf>,
        offset: u64,
        source: std::str::Utf8Error,
    ) -> Self {
        Self::EncodingError {
            path: path.into(),
            offset,
            source,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Maps an error from opening `path` onto the file-access variants
    pub fn from_open(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::file_not_found(path),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }
}
