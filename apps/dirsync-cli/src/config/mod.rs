//! Job file loading for the dirsync CLI
//!
//! ```yaml
//! resources:
//!   source:
//!     host: ldap.source.example
//!     base_dn: dc=source,dc=example
//!     bind_dn: cn=sync,dc=source,dc=example
//!   target:
//!     host: ldap.target.example
//!     base_dn: dc=target,dc=example
//!     bind_dn: cn=sync,dc=target,dc=example
//! job:
//!   source_resource: source
//!   target_resource: target
//!   organization_source_base: ou=Orgs,dc=source,dc=example
//!   # ...
//! ```

mod paths;

pub use paths::{resolve_config_path, CONFIG_ENV, DEFAULT_CONFIG_PATH};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use dirsync_connector::traits::EntryStore;
use dirsync_connector_ldap::{LdapConfig, LdapStore};
use dirsync_engine::{JobParameters, SyncConfiguration};

use crate::error::{CliError, CliResult};

/// Overrides `job.batch_size`.
pub const BATCH_SIZE_ENV: &str = "DIRSYNC_BATCH_SIZE";

/// Parsed job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFile {
    /// LDAP resources by name.
    pub resources: BTreeMap<String, LdapConfig>,
    /// Job parameters.
    pub job: JobParameters,
    /// Where the file was read from; descriptor paths resolve against it.
    #[serde(skip)]
    pub origin: Option<PathBuf>,
}

impl JobFile {
    /// Read and parse a job file, then apply environment overrides.
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read job file {}: {}", path.display(), e))
        })?;
        let mut file = Self::parse(&content)?;
        file.origin = Some(path.to_path_buf());
        file.apply_env_overrides(|key| std::env::var(key).ok())?;
        file.resolve_descriptor_paths();
        debug!(path = %path.display(), resources = file.resources.len(), "Loaded job file");
        Ok(file)
    }

    /// Parse job file text.
    pub fn parse(content: &str) -> CliResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `DIRSYNC_BATCH_SIZE` and `DIRSYNC_<RESOURCE>_BIND_PASSWORD`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> CliResult<()> {
        if let Some(raw) = lookup(BATCH_SIZE_ENV) {
            self.job.batch_size = raw.trim().parse().map_err(|_| {
                CliError::Config(format!("{BATCH_SIZE_ENV} must be a positive integer, got '{raw}'"))
            })?;
        }
        for (name, resource) in &mut self.resources {
            if let Some(password) = lookup(&password_env(name)) {
                resource.bind_password = Some(password);
            }
        }
        Ok(())
    }

    /// Make relative descriptor paths relative to the job file's directory.
    fn resolve_descriptor_paths(&mut self) {
        let Some(dir) = self.origin.as_deref().and_then(Path::parent) else {
            return;
        };
        for path in [
            &mut self.job.group_descriptor,
            &mut self.job.organizational_unit_descriptor,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        }
    }

    /// Configuration of a named resource.
    pub fn resource(&self, name: &str) -> CliResult<&LdapConfig> {
        self.resources.get(name).ok_or_else(|| {
            CliError::Config(format!(
                "resource '{}' is not defined; known resources: {}",
                name,
                self.resources.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Build the source and target stores. Nothing connects yet.
    pub fn stores(&self) -> CliResult<(Arc<dyn EntryStore>, Arc<dyn EntryStore>)> {
        let source = self.store(&self.job.source_resource)?;
        let target = self.store(&self.job.target_resource)?;
        Ok((source, target))
    }

    fn store(&self, name: &str) -> CliResult<Arc<dyn EntryStore>> {
        let config = self.resource(name)?.clone();
        Ok(Arc::new(LdapStore::new(name, config)?))
    }

    /// Validated engine configuration over freshly built stores.
    pub fn sync_configuration(&self) -> CliResult<SyncConfiguration> {
        let (source, target) = self.stores()?;
        Ok(SyncConfiguration::from_parameters(&self.job, source, target)?)
    }
}

/// Password variable of a resource: `DIRSYNC_<NAME>_BIND_PASSWORD`, with the
/// name upper-cased and other characters than letters and digits as `_`.
pub fn password_env(resource: &str) -> String {
    let name: String = resource
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("DIRSYNC_{name}_BIND_PASSWORD")
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"
resources:
  corp-source:
    host: ldap.source.example
    base_dn: dc=source
    bind_dn: cn=sync,dc=source
  target:
    host: ldap.target.example
    port: 636
    use_ssl: true
    base_dn: dc=target
    bind_dn: cn=sync,dc=target
    bind_password: from-file
job:
  source_resource: corp-source
  target_resource: target
  organization_source_base: ou=Orgs,dc=source
  organization_target_base: ou=Orgs,dc=target
  intermediate_source_base: ou=Intermediate,ou=Orgs,dc=source
  role_source_base: ou=Roles,dc=source
  role_target_base: ou=Roles,dc=target
  special_role_source_base: ou=Special,ou=Roles,dc=source
  special_role_target_base: ou=Special,ou=Roles,dc=target
  entitlement_source_base: ou=Ent,ou=Roles,dc=source
  entitlement_target_base: ou=Ent,ou=Roles,dc=target
  group_descriptor: descriptors/group.yaml
"#;

    #[test]
    fn test_parse_job_file() {
        let file = JobFile::parse(JOB).unwrap();
        assert_eq!(file.resources.len(), 2);
        assert_eq!(file.resources["corp-source"].port, 389);
        assert_eq!(file.job.batch_size, 1000);
        assert_eq!(file.job.membership_attribute, "member");
        assert!(file.job.organizational_unit_descriptor.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut file = JobFile::parse(JOB).unwrap();
        file.apply_env_overrides(|key| match key {
            "DIRSYNC_BATCH_SIZE" => Some("250".to_string()),
            "DIRSYNC_CORP_SOURCE_BIND_PASSWORD" => Some("secret".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(file.job.batch_size, 250);
        assert_eq!(
            file.resources["corp-source"].bind_password.as_deref(),
            Some("secret")
        );
        assert_eq!(
            file.resources["target"].bind_password.as_deref(),
            Some("from-file")
        );
    }

    #[test]
    fn test_invalid_batch_size_override() {
        let mut file = JobFile::parse(JOB).unwrap();
        let err = file
            .apply_env_overrides(|key| (key == BATCH_SIZE_ENV).then(|| "many".to_string()))
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_password_env_name() {
        assert_eq!(password_env("corp-source"), "DIRSYNC_CORP_SOURCE_BIND_PASSWORD");
        assert_eq!(password_env("target"), "DIRSYNC_TARGET_BIND_PASSWORD");
    }

    #[test]
    fn test_unknown_resource() {
        let mut file = JobFile::parse(JOB).unwrap();
        file.job.target_resource = "missing".to_string();
        let err = file.stores().err().unwrap();
        assert!(err.to_string().contains("resource 'missing' is not defined"));
    }

    #[test]
    fn test_descriptor_paths_follow_job_file() {
        let mut file = JobFile::parse(JOB).unwrap();
        file.origin = Some(PathBuf::from("/etc/dirsync/job.yaml"));
        file.resolve_descriptor_paths();
        assert_eq!(
            file.job.group_descriptor,
            Some(PathBuf::from("/etc/dirsync/descriptors/group.yaml"))
        );
    }

    #[test]
    fn test_sync_configuration_builds_without_connecting() {
        let file = JobFile::parse(JOB).unwrap();
        let config = file.sync_configuration().unwrap();
        assert_eq!(config.batch_size(), 1000);
        assert_eq!(config.source().display_name(), "corp-source");
    }
}
