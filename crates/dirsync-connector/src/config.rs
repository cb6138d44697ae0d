//! Entry store configuration types
//!
//! Base trait and configuration structures shared by store backends.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::StoreResult;

/// Trait for backend-specific store configuration.
pub trait StoreConfig: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Validate the configuration.
    fn validate(&self) -> StoreResult<()>;
}

/// Connection settings shared across store backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Per-operation timeout in seconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_operation_timeout() -> u64 {
    120
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_connection_timeout(),
            operation_timeout_secs: default_operation_timeout(),
        }
    }
}

impl ConnectionSettings {
    /// Create new connection settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    pub fn with_connection_timeout(mut self, secs: u64) -> Self {
        self.connection_timeout_secs = secs;
        self
    }

    /// Set the operation timeout.
    pub fn with_operation_timeout(mut self, secs: u64) -> Self {
        self.operation_timeout_secs = secs;
        self
    }

    /// Get connection timeout as Duration.
    pub fn connection_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connection_timeout_secs)
    }

    /// Get operation timeout as Duration.
    pub fn operation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Naming and schema conventions of one directory.
///
/// Directories disagree on how groups and organizational units are named
/// (`cn=` vs `CN=`, `groupOfNames` vs `group`). Reconciliation translates
/// between the source's and the target's conventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryFeatures {
    /// Object class of group entries.
    #[serde(default = "default_group_object_class")]
    pub group_object_class: String,

    /// Naming attribute type of group entries.
    #[serde(default = "default_group_object_prefix")]
    pub group_object_prefix: String,

    /// Object class of organizational unit entries.
    #[serde(default = "default_organizational_unit_object_class")]
    pub organizational_unit_object_class: String,

    /// Naming attribute type of organizational unit entries.
    #[serde(default = "default_organizational_unit_object_prefix")]
    pub organizational_unit_object_prefix: String,
}

fn default_group_object_class() -> String {
    "groupOfNames".to_string()
}

fn default_group_object_prefix() -> String {
    "cn".to_string()
}

fn default_organizational_unit_object_class() -> String {
    "organizationalUnit".to_string()
}

fn default_organizational_unit_object_prefix() -> String {
    "ou".to_string()
}

impl Default for DirectoryFeatures {
    fn default() -> Self {
        Self {
            group_object_class: default_group_object_class(),
            group_object_prefix: default_group_object_prefix(),
            organizational_unit_object_class: default_organizational_unit_object_class(),
            organizational_unit_object_prefix: default_organizational_unit_object_prefix(),
        }
    }
}

impl DirectoryFeatures {
    /// Conventions of an Active Directory domain.
    pub fn active_directory() -> Self {
        Self {
            group_object_class: "group".to_string(),
            group_object_prefix: "CN".to_string(),
            organizational_unit_object_class: "organizationalUnit".to_string(),
            organizational_unit_object_prefix: "OU".to_string(),
        }
    }

    /// Set the group object class and naming prefix.
    pub fn with_group(mut self, object_class: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.group_object_class = object_class.into();
        self.group_object_prefix = prefix.into();
        self
    }

    /// Set the organizational unit object class and naming prefix.
    pub fn with_organizational_unit(
        mut self,
        object_class: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        self.organizational_unit_object_class = object_class.into();
        self.organizational_unit_object_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_settings_defaults() {
        let settings = ConnectionSettings::new();
        assert_eq!(settings.connection_timeout_secs, 30);
        assert_eq!(settings.operation_timeout_secs, 120);
        assert_eq!(
            settings.with_connection_timeout(5).connection_timeout(),
            std::time::Duration::from_secs(5)
        );
    }

    #[test]
    fn test_features_defaults_from_empty_json() {
        let features: DirectoryFeatures = serde_json::from_str("{}").unwrap();
        assert_eq!(features, DirectoryFeatures::default());
        assert_eq!(features.group_object_prefix, "cn");
        assert_eq!(features.organizational_unit_object_prefix, "ou");
    }

    #[test]
    fn test_features_builders() {
        let features = DirectoryFeatures::default()
            .with_group("groupOfUniqueNames", "cn")
            .with_organizational_unit("organizationalUnit", "OU");
        assert_eq!(features.group_object_class, "groupOfUniqueNames");
        assert_eq!(features.organizational_unit_object_prefix, "OU");
        assert_eq!(DirectoryFeatures::active_directory().group_object_class, "group");
    }
}
