use thiserror::Error;

/// Errors that can occur during repository operations.
///
/// Cloneable so a single failed load can be handed to every caller waiting
/// on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("{entity_type} already exists: {id}")]
    AlreadyExists {
        entity_type: &'static str,
        id: String,
    },
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_repository_error_not_found_display() {
        let error = RepositoryError::NotFound {
            entity_type: "User",
            id: "abc-123".to_string(),
        };
        assert_eq!(error.to_string(), "User not found: abc-123");
    }

    #[test]
    fn test_repository_error_already_exists_display() {
        let error = RepositoryError::AlreadyExists {
            entity_type: "User",
            id: "meepo".to_string(),
        };
        assert_eq!(error.to_string(), "User already exists: meepo");
    }

    #[test]
    fn test_repository_error_connection_failed_display() {
        let error = RepositoryError::ConnectionFailed("server selection timeout".to_string());
        assert_eq!(
            error.to_string(),
            "Connection failed: server selection timeout"
        );
    }

    #[test]
    fn test_repository_error_query_failed_display() {
        let error = RepositoryError::QueryFailed("cursor killed".to_string());
        assert_eq!(error.to_string(), "Query failed: cursor killed");
    }

    #[test]
    fn test_repository_error_timeout_display() {
        let error = RepositoryError::Timeout(Duration::from_secs(10));
        assert_eq!(error.to_string(), "Operation timed out after 10s");
    }
}
