//! Reconciliation configuration.
//!
//! [`JobParameters`] is the serialized form supplied by the job host;
//! [`SyncConfiguration`] is the validated, immutable value shared by every
//! specialization of one run.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::traits::EntryStore;

use crate::error::{SyncError, SyncResult};
use crate::mapping::AttributeMapping;

/// Typed job parameters, as read from the job file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    /// Resource name of the source directory.
    pub source_resource: String,
    /// Resource name of the target directory.
    pub target_resource: String,

    /// Organization subtree in the source directory.
    pub organization_source_base: String,
    /// Organization subtree in the target directory.
    pub organization_target_base: String,
    /// Intermediate container subtree in the source directory. Empty when
    /// the source has no intermediate containers.
    #[serde(default)]
    pub intermediate_source_base: String,

    /// Role subtree in the source directory.
    pub role_source_base: String,
    /// Role subtree in the target directory.
    pub role_target_base: String,
    /// Special role subtree in the source directory.
    pub special_role_source_base: String,
    /// Special role subtree in the target directory.
    pub special_role_target_base: String,
    /// Entitlement subtree in the source directory.
    pub entitlement_source_base: String,
    /// Entitlement subtree in the target directory.
    pub entitlement_target_base: String,

    /// Attribute mapping for group entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_descriptor: Option<PathBuf>,
    /// Attribute mapping for organizational unit entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizational_unit_descriptor: Option<PathBuf>,

    /// Entries fetched per search page.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Attribute holding group membership.
    #[serde(default = "default_membership_attribute")]
    pub membership_attribute: String,
}

pub(crate) fn default_batch_size() -> u32 {
    1000
}

pub(crate) fn default_membership_attribute() -> String {
    "member".to_string()
}

/// A pair of search roots, one per directory. Both are full names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchBases {
    pub source: DistinguishedName,
    pub target: DistinguishedName,
}

/// Immutable configuration of one reconciliation run.
#[derive(Clone)]
pub struct SyncConfiguration {
    source: Arc<dyn EntryStore>,
    target: Arc<dyn EntryStore>,
    organizations: SearchBases,
    roles: SearchBases,
    special_roles: SearchBases,
    entitlements: SearchBases,
    intermediate_source: Option<DistinguishedName>,
    batch_size: u32,
    membership_attribute: String,
}

impl fmt::Debug for SyncConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfiguration")
            .field("source", &self.source.display_name())
            .field("target", &self.target.display_name())
            .field("organizations", &self.organizations)
            .field("roles", &self.roles)
            .field("special_roles", &self.special_roles)
            .field("entitlements", &self.entitlements)
            .field("intermediate_source", &self.intermediate_source)
            .field("batch_size", &self.batch_size)
            .field("membership_attribute", &self.membership_attribute)
            .finish()
    }
}

impl SyncConfiguration {
    /// Start building a configuration.
    pub fn builder(
        source: Arc<dyn EntryStore>,
        target: Arc<dyn EntryStore>,
    ) -> SyncConfigurationBuilder {
        SyncConfigurationBuilder::new(source, target)
    }

    /// Build a configuration from job parameters.
    pub fn from_parameters(
        params: &JobParameters,
        source: Arc<dyn EntryStore>,
        target: Arc<dyn EntryStore>,
    ) -> SyncResult<Self> {
        Self::builder(source, target)
            .organizations(&params.organization_source_base, &params.organization_target_base)
            .intermediate_source(&params.intermediate_source_base)
            .roles(&params.role_source_base, &params.role_target_base)
            .special_roles(
                &params.special_role_source_base,
                &params.special_role_target_base,
            )
            .entitlements(
                &params.entitlement_source_base,
                &params.entitlement_target_base,
            )
            .batch_size(params.batch_size)
            .membership_attribute(&params.membership_attribute)
            .build()
    }

    pub fn source(&self) -> &Arc<dyn EntryStore> {
        &self.source
    }

    pub fn target(&self) -> &Arc<dyn EntryStore> {
        &self.target
    }

    pub fn organizations(&self) -> &SearchBases {
        &self.organizations
    }

    pub fn roles(&self) -> &SearchBases {
        &self.roles
    }

    pub fn special_roles(&self) -> &SearchBases {
        &self.special_roles
    }

    pub fn entitlements(&self) -> &SearchBases {
        &self.entitlements
    }

    /// Intermediate container subtree, if the source has one.
    pub fn intermediate_source(&self) -> Option<&DistinguishedName> {
        self.intermediate_source.as_ref()
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn membership_attribute(&self) -> &str {
        &self.membership_attribute
    }

    /// Prefix translation between the source and target conventions.
    pub fn naming(&self) -> NamingTranslation {
        let source = self.source.features();
        let target = self.target.features();
        NamingTranslation {
            group: (
                source.group_object_prefix.clone(),
                target.group_object_prefix.clone(),
            ),
            unit: (
                source.organizational_unit_object_prefix.clone(),
                target.organizational_unit_object_prefix.clone(),
            ),
        }
    }
}

/// Builder for [`SyncConfiguration`].
///
/// Search bases are collected as strings and parsed in [`build`](Self::build)
/// so every problem surfaces as one [`SyncError::Configuration`].
pub struct SyncConfigurationBuilder {
    source: Arc<dyn EntryStore>,
    target: Arc<dyn EntryStore>,
    organizations: Option<(String, String)>,
    roles: Option<(String, String)>,
    special_roles: Option<(String, String)>,
    entitlements: Option<(String, String)>,
    intermediate_source: Option<String>,
    batch_size: u32,
    membership_attribute: String,
}

impl SyncConfigurationBuilder {
    fn new(source: Arc<dyn EntryStore>, target: Arc<dyn EntryStore>) -> Self {
        Self {
            source,
            target,
            organizations: None,
            roles: None,
            special_roles: None,
            entitlements: None,
            intermediate_source: None,
            batch_size: default_batch_size(),
            membership_attribute: default_membership_attribute(),
        }
    }

    #[must_use]
    pub fn organizations(mut self, source: &str, target: &str) -> Self {
        self.organizations = Some((source.to_string(), target.to_string()));
        self
    }

    #[must_use]
    pub fn roles(mut self, source: &str, target: &str) -> Self {
        self.roles = Some((source.to_string(), target.to_string()));
        self
    }

    #[must_use]
    pub fn special_roles(mut self, source: &str, target: &str) -> Self {
        self.special_roles = Some((source.to_string(), target.to_string()));
        self
    }

    #[must_use]
    pub fn entitlements(mut self, source: &str, target: &str) -> Self {
        self.entitlements = Some((source.to_string(), target.to_string()));
        self
    }

    #[must_use]
    pub fn intermediate_source(mut self, base: &str) -> Self {
        self.intermediate_source = Some(base.to_string());
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn membership_attribute(mut self, attribute: &str) -> Self {
        self.membership_attribute = attribute.to_string();
        self
    }

    /// Validate and build.
    pub fn build(self) -> SyncResult<SyncConfiguration> {
        if self.batch_size == 0 {
            return Err(SyncError::configuration("batch size must be positive"));
        }
        if self.membership_attribute.trim().is_empty() {
            return Err(SyncError::configuration(
                "membership attribute must not be empty",
            ));
        }

        let source_root = self.source.root_context().clone();
        let target_root = self.target.root_context().clone();

        let pair = |label: &str, bases: Option<(String, String)>| -> SyncResult<SearchBases> {
            let (source, target) = bases.ok_or_else(|| {
                SyncError::configuration(format!("missing {label} search base"))
            })?;
            Ok(SearchBases {
                source: search_base(&format!("{label} source"), &source, &source_root)?,
                target: search_base(&format!("{label} target"), &target, &target_root)?,
            })
        };

        let organizations = pair("organization", self.organizations)?;
        let roles = pair("role", self.roles)?;
        let special_roles = pair("special role", self.special_roles)?;
        let entitlements = pair("entitlement", self.entitlements)?;
        let intermediate_source = match self.intermediate_source {
            Some(base) if !base.trim().is_empty() => {
                Some(search_base("intermediate source", &base, &source_root)?)
            }
            _ => None,
        };

        Ok(SyncConfiguration {
            source: self.source,
            target: self.target,
            organizations,
            roles,
            special_roles,
            entitlements,
            intermediate_source,
            batch_size: self.batch_size,
            membership_attribute: self.membership_attribute,
        })
    }
}

/// Parse a search base and check it lies under the store's root.
fn search_base(
    label: &str,
    value: &str,
    root: &DistinguishedName,
) -> SyncResult<DistinguishedName> {
    if value.trim().is_empty() {
        return Err(SyncError::configuration(format!(
            "missing {label} search base"
        )));
    }
    let base = DistinguishedName::parse(value).map_err(|e| {
        SyncError::configuration(format!("{label} search base is not a valid name: {e}"))
    })?;
    if !base.ends_with(root) {
        return Err(SyncError::configuration(format!(
            "{label} search base '{base}' is not under root context '{root}'"
        )));
    }
    Ok(base)
}

/// Rewrites naming attribute types from source to target conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingTranslation {
    /// Group prefix, source then target.
    pub group: (String, String),
    /// Organizational unit prefix, source then target.
    pub unit: (String, String),
}

impl NamingTranslation {
    /// Rewrite every group and unit component of `name`.
    pub fn apply(&self, name: &DistinguishedName) -> DistinguishedName {
        name.rename_types(&self.group.0, &self.group.1)
            .rename_types(&self.unit.0, &self.unit.1)
    }

    pub fn source_group_prefix(&self) -> &str {
        &self.group.0
    }

    pub fn target_group_prefix(&self) -> &str {
        &self.group.1
    }

    pub fn source_unit_prefix(&self) -> &str {
        &self.unit.0
    }

    pub fn target_unit_prefix(&self) -> &str {
        &self.unit.1
    }
}

/// Search scope and mapping for one specialization.
#[derive(Debug, Clone)]
pub struct SyncScope {
    /// Specialization name, used in logs and reports.
    pub name: String,
    /// Full name of the source search root.
    pub source_base: DistinguishedName,
    /// Full name of the target search root.
    pub target_base: DistinguishedName,
    /// Object classes retrieved from the source.
    pub source_object_classes: Vec<String>,
    /// Object classes retrieved from, and stamped onto, the target.
    pub target_object_classes: Vec<String>,
    /// Attribute mapping applied to source entries.
    pub mapping: AttributeMapping,
}

impl SyncScope {
    pub fn new(name: impl Into<String>, bases: &SearchBases) -> Self {
        Self {
            name: name.into(),
            source_base: bases.source.clone(),
            target_base: bases.target.clone(),
            source_object_classes: Vec::new(),
            target_object_classes: Vec::new(),
            mapping: AttributeMapping::default(),
        }
    }

    #[must_use]
    pub fn with_object_classes(mut self, source: Vec<String>, target: Vec<String>) -> Self {
        self.source_object_classes = source;
        self.target_object_classes = target;
        self
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: AttributeMapping) -> Self {
        self.mapping = mapping;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsync_connector::config::DirectoryFeatures;
    use dirsync_connector::memory::InMemoryStore;

    fn dn(value: &str) -> DistinguishedName {
        DistinguishedName::parse(value).unwrap()
    }

    fn stores() -> (Arc<dyn EntryStore>, Arc<dyn EntryStore>) {
        let source = InMemoryStore::new("source", dn("dc=source"));
        let target = InMemoryStore::new("target", dn("DC=target"))
            .with_features(DirectoryFeatures::active_directory());
        (Arc::new(source), Arc::new(target))
    }

    fn builder() -> SyncConfigurationBuilder {
        let (source, target) = stores();
        SyncConfiguration::builder(source, target)
            .organizations("ou=Orgs,dc=source", "OU=Orgs,DC=target")
            .intermediate_source("ou=Intermediate,ou=Orgs,dc=source")
            .roles("ou=Roles,dc=source", "OU=Roles,DC=target")
            .special_roles("ou=Special,ou=Roles,dc=source", "OU=Special,OU=Roles,DC=target")
            .entitlements("ou=Ent,ou=Roles,dc=source", "OU=Ent,OU=Roles,DC=target")
    }

    #[test]
    fn test_build_with_defaults() {
        let config = builder().build().unwrap();
        assert_eq!(config.batch_size(), 1000);
        assert_eq!(config.membership_attribute(), "member");
        assert_eq!(config.organizations().target, dn("OU=Orgs,DC=target"));
        assert_eq!(config.intermediate_source().unwrap().depth(), 3);
    }

    #[test]
    fn test_intermediate_source_is_optional() {
        let (source, target) = stores();
        let config = SyncConfiguration::builder(source, target)
            .organizations("ou=Orgs,dc=source", "OU=Orgs,DC=target")
            .roles("ou=Roles,dc=source", "OU=Roles,DC=target")
            .special_roles("ou=Special,ou=Roles,dc=source", "OU=Special,OU=Roles,DC=target")
            .entitlements("ou=Ent,ou=Roles,dc=source", "OU=Ent,OU=Roles,DC=target")
            .build()
            .unwrap();
        assert!(config.intermediate_source().is_none());

        let config = builder().intermediate_source("  ").build().unwrap();
        assert!(config.intermediate_source().is_none());

        assert!(builder()
            .intermediate_source("ou=Intermediate,dc=elsewhere")
            .build()
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_missing_base_is_configuration_error() {
        let (source, target) = stores();
        let err = SyncConfiguration::builder(source, target)
            .organizations("ou=Orgs,dc=source", "OU=Orgs,DC=target")
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("role"));
    }

    #[test]
    fn test_base_outside_root_is_rejected() {
        let err = builder()
            .organizations("ou=Orgs,dc=elsewhere", "OU=Orgs,DC=target")
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("not under root context"));
    }

    #[test]
    fn test_malformed_base_and_zero_batch() {
        assert!(builder()
            .roles("Roles,dc=source", "OU=Roles,DC=target")
            .build()
            .unwrap_err()
            .is_configuration());
        assert!(builder().batch_size(0).build().unwrap_err().is_configuration());
    }

    #[test]
    fn test_naming_translation() {
        let config = builder().build().unwrap();
        let naming = config.naming();
        assert_eq!(naming.target_group_prefix(), "CN");
        assert_eq!(
            naming.apply(&dn("cn=DS1_Lead,ou=DS1")).to_string(),
            "CN=DS1_Lead,OU=DS1"
        );
    }

    #[test]
    fn test_job_parameters_defaults() {
        let yaml = r#"
source_resource: source
target_resource: target
organization_source_base: ou=Orgs,dc=source
organization_target_base: OU=Orgs,DC=target
intermediate_source_base: ou=Intermediate,ou=Orgs,dc=source
role_source_base: ou=Roles,dc=source
role_target_base: OU=Roles,DC=target
special_role_source_base: ou=Special,ou=Roles,dc=source
special_role_target_base: OU=Special,OU=Roles,DC=target
entitlement_source_base: ou=Ent,ou=Roles,dc=source
entitlement_target_base: OU=Ent,OU=Roles,DC=target
"#;
        let params: JobParameters = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(params.batch_size, 1000);
        assert_eq!(params.membership_attribute, "member");
        assert!(params.group_descriptor.is_none());

        let (source, target) = stores();
        let config = SyncConfiguration::from_parameters(&params, source, target).unwrap();
        assert_eq!(config.special_roles().source, dn("ou=Special,ou=Roles,dc=source"));

        let without: JobParameters = serde_yaml::from_str(
            &yaml.replace("intermediate_source_base: ou=Intermediate,ou=Orgs,dc=source\n", ""),
        )
        .unwrap();
        assert!(without.intermediate_source_base.is_empty());
        let (source, target) = stores();
        let config = SyncConfiguration::from_parameters(&without, source, target).unwrap();
        assert!(config.intermediate_source().is_none());
    }
}
