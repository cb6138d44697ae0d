//! Entry store error types
//!
//! Error definitions with transient/permanent classification. The engine never
//! retries on its own; the classification is surfaced for callers and reports.

use thiserror::Error;

/// Error that can occur during entry store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    // Connection errors (usually transient)
    /// Failed to establish connection to the directory.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timeout after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The session handle is unknown or was already released.
    #[error("session {session} is not open")]
    SessionClosed { session: String },

    // Authentication errors (permanent)
    /// Bind was rejected.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Configuration errors (permanent)
    /// Store configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // Naming errors (permanent)
    /// A name is not a well-formed distinguished name.
    #[error("invalid name '{value}': {message}")]
    InvalidName { value: String, message: String },

    // Operation errors
    /// Operation failed.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Entry already exists (create conflict).
    #[error("entry already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// Entry not found (modify/delete target or missing parent).
    #[error("entry not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// A non-leaf entry was deleted without requesting subtree removal.
    #[error("operation not allowed on non-leaf entry: {identifier}")]
    NotAllowedOnNonLeaf { identifier: String },
}

impl StoreError {
    /// Check if this error is transient.
    ///
    /// Transient errors are caused by temporary conditions such as network
    /// issues. The engine surfaces them once; retrying belongs to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionFailed { .. } | StoreError::Timeout { .. }
        )
    }

    /// Check if this error is a naming syntax failure.
    pub fn is_invalid_name(&self) -> bool {
        matches!(self, StoreError::InvalidName { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            StoreError::Timeout { .. } => "TIMEOUT",
            StoreError::SessionClosed { .. } => "SESSION_CLOSED",
            StoreError::AuthenticationFailed => "AUTH_FAILED",
            StoreError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            StoreError::InvalidName { .. } => "INVALID_NAME",
            StoreError::OperationFailed { .. } => "OPERATION_FAILED",
            StoreError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            StoreError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            StoreError::NotAllowedOnNonLeaf { .. } => "NOT_ALLOWED_ON_NON_LEAF",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        StoreError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        StoreError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid name error.
    pub fn invalid_name(value: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::InvalidName {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        StoreError::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type for entry store operations.
pub type StoreResult<T> = Result<T, StoreError>;
