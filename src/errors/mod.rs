//! # Error Handling
//!
//! Error types shared by the store clients, the secret managers and the HTTP
//! layer. Connection-test failures are not errors: they are recorded on the
//! lease as [`crate::leases::ConnectionTest::Failed`].

/// Custom result type for broker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the secrets broker
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Bad input shape or identifier, rejected before the store is touched
    #[error("Validation error: {0}")]
    Validation(String),

    /// Static path, key or dynamic role does not exist
    #[error("{0}")]
    NotFound(String),

    /// Create on a static path that already exists
    #[error("{0}")]
    AlreadyExists(String),

    /// The store rejected or failed a lease issuance
    #[error("Failed to issue credentials for role '{role}': {message}")]
    IssueFailed { role: String, message: String },

    /// Network failure or timeout talking to the backing store
    #[error("Secret store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network transport errors (HTTP listener)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a new already-exists error
    pub fn already_exists<S: Into<String>>(message: S) -> Self {
        Self::AlreadyExists(message.into())
    }

    /// Create a new lease issuance error
    pub fn issue_failed(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IssueFailed { role: role.into(), message: message.into() }
    }

    /// Create a new store-unavailable error
    pub fn store_unavailable<S: Into<String>>(message: S) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the error came from the store being unreachable rather than
    /// from the request itself.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Config(errors.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("Invalid roles file: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = Error::not_found("Secret path 'db' not found");
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.to_string(), "Secret path 'db' not found");

        let err = Error::issue_failed("readonly", "permission denied");
        assert!(matches!(err, Error::IssueFailed { .. }));
        assert!(err.to_string().contains("readonly"));
        assert!(err.to_string().contains("permission denied"));

        let err = Error::validation("path cannot be empty");
        assert_eq!(err.to_string(), "Validation error: path cannot be empty");
    }

    #[test]
    fn test_store_unavailable_is_distinct_from_not_found() {
        assert!(Error::store_unavailable("timed out").is_store_unavailable());
        assert!(!Error::not_found("db").is_store_unavailable());
        assert!(!Error::issue_failed("admin", "boom").is_store_unavailable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
