use thiserror::Error;

use userdir_core::storage::RepositoryError;

/// Errors returned by [`crate::UserDirectory`].
///
/// Callers at the transport boundary should map these to a generic failure
/// without echoing internal detail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("Nickname already taken: {0}")]
    NicknameTaken(String),
}

/// Result type for directory operations.
pub type Result<T> = std::result::Result<T, DirectoryError>;
