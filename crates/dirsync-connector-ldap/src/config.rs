//! LDAP store configuration
//!
//! Connection and naming settings for one LDAP/Active Directory server.

use serde::{Deserialize, Serialize};

use dirsync_connector::config::{ConnectionSettings, DirectoryFeatures, StoreConfig};
use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::error::{StoreError, StoreResult};

/// Configuration for an LDAP entry store.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Verify the server certificate on TLS connections.
    #[serde(default = "default_true")]
    pub verify_certificate: bool,

    /// Root context of the directory (e.g., "dc=example,dc=com").
    pub base_dn: String,

    /// Bind DN for authentication (e.g., "cn=admin,dc=example,dc=com").
    pub bind_dn: String,

    /// Bind password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Connection settings (timeouts).
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Naming and schema conventions of the server.
    #[serde(default)]
    pub features: DirectoryFeatures,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("verify_certificate", &self.verify_certificate)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("connection", &self.connection)
            .field("features", &self.features)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_true() -> bool {
    true
}

impl LdapConfig {
    /// Create a new LDAP config with required fields.
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            verify_certificate: true,
            base_dn: base_dn.into(),
            bind_dn: bind_dn.into(),
            bind_password: None,
            connection: ConnectionSettings::default(),
            features: DirectoryFeatures::default(),
        }
    }

    /// Set bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Enable SSL (LDAPS).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self
    }

    /// Set the directory conventions.
    #[must_use]
    pub fn with_features(mut self, features: DirectoryFeatures) -> Self {
        self.features = features;
        self
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Parsed root context.
    pub fn root_context(&self) -> StoreResult<DistinguishedName> {
        DistinguishedName::parse(&self.base_dn)
    }

    /// Log a warning when certificate verification is switched off.
    pub fn validate_security(&self) {
        if (self.use_ssl || self.use_starttls) && !self.verify_certificate {
            tracing::warn!(
                target: "security",
                host = %self.host,
                "TLS certificate verification is disabled for this directory"
            );
        }
    }
}

impl StoreConfig for LdapConfig {
    fn validate(&self) -> StoreResult<()> {
        if self.host.is_empty() {
            return Err(StoreError::invalid_configuration("host is required"));
        }

        if self.base_dn.trim().is_empty() {
            return Err(StoreError::invalid_configuration("base_dn is required"));
        }
        self.root_context().map_err(|e| {
            StoreError::invalid_configuration(format!("base_dn is not a valid name: {e}"))
        })?;

        if self.bind_dn.is_empty() {
            return Err(StoreError::invalid_configuration("bind_dn is required"));
        }

        if self.use_ssl && self.use_starttls {
            return Err(StoreError::invalid_configuration(
                "cannot use both SSL and STARTTLS",
            ));
        }

        if self.features.group_object_prefix.is_empty()
            || self.features.organizational_unit_object_prefix.is_empty()
        {
            return Err(StoreError::invalid_configuration(
                "naming prefixes must not be empty",
            ));
        }

        Ok(())
    }
}
