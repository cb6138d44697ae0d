//! Sync error types.

use thiserror::Error;

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::error::StoreError;

/// Errors that can occur during reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A single create/modify/delete call failed while applying changes.
    #[error("Directory {operation} failed for '{rdn}': {source}")]
    DirectoryOperation {
        operation: String,
        rdn: DistinguishedName,
        #[source]
        source: StoreError,
    },

    /// Malformed hierarchical name.
    #[error("Naming syntax error in '{value}': {message}")]
    NamingSyntax { value: String, message: String },

    /// Store error outside the apply phase (connect, search).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A hook rejected its input.
    #[error("Hook error in {stage}: {message}")]
    Hook { stage: String, message: String },

    /// Descriptor could not be loaded.
    #[error("Descriptor error in '{path}': {message}")]
    Descriptor { path: String, message: String },
}

impl SyncError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a directory operation error.
    pub fn directory_operation(
        operation: impl Into<String>,
        rdn: DistinguishedName,
        source: StoreError,
    ) -> Self {
        Self::DirectoryOperation {
            operation: operation.into(),
            rdn,
            source,
        }
    }

    /// Create a naming syntax error.
    pub fn naming_syntax(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NamingSyntax {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create a hook error.
    pub fn hook(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a descriptor error.
    pub fn descriptor(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Descriptor {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Check if this is a failed directory operation during apply.
    #[must_use]
    pub fn is_directory_operation(&self) -> bool {
        matches!(self, Self::DirectoryOperation { .. })
    }

    /// Check if this is a malformed name.
    #[must_use]
    pub fn is_naming_syntax(&self) -> bool {
        matches!(self, Self::NamingSyntax { .. })
    }

    /// Check if the error came from connecting to a store.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::ConnectionFailed { .. })
                | Self::Store(StoreError::AuthenticationFailed)
                | Self::Store(StoreError::Timeout { .. })
        )
    }
}

impl From<SyncError> for String {
    fn from(err: SyncError) -> Self {
        err.to_string()
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::configuration("missing search base");
        assert_eq!(err.to_string(), "Configuration error: missing search base");
        assert!(err.is_configuration());

        let err = SyncError::directory_operation(
            "create",
            DistinguishedName::parse("ou=DS1").unwrap(),
            StoreError::ObjectAlreadyExists {
                identifier: "ou=DS1".to_string(),
            },
        );
        assert!(err.to_string().starts_with("Directory create failed for 'ou=DS1'"));
        assert!(err.is_directory_operation());
    }

    #[test]
    fn test_store_error_conversion() {
        let err: SyncError = StoreError::connection_failed("refused").into();
        assert!(err.is_connection());
        assert!(!err.is_configuration());

        let err: SyncError = StoreError::operation_failed("boom").into();
        assert!(!err.is_connection());
    }

    #[test]
    fn test_naming_syntax_display() {
        let err = SyncError::naming_syntax("cn=a,,ou=b", "empty component");
        assert_eq!(
            err.to_string(),
            "Naming syntax error in 'cn=a,,ou=b': empty component"
        );
        assert!(err.is_naming_syntax());
        assert!(!err.is_configuration());
    }
}
