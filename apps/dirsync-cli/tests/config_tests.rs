//! Integration tests for job file loading and the validate command
//!
//! Tests cover:
//! - Loading a job file with relative descriptor paths
//! - Missing and malformed job files
//! - Invalid descriptors
//! - The validate command end to end, without a directory server

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use dirsync_cli::commands::validate::{self, ValidateArgs};
use dirsync_cli::commands::ConfigArgs;
use dirsync_cli::config::JobFile;
use dirsync_engine::{FileDescriptorLoader, HousekeepingJob};

const JOB: &str = r#"
resources:
  source:
    host: ldap.source.example
    base_dn: dc=source,dc=example
    bind_dn: cn=sync,dc=source,dc=example
  target:
    host: ldap.target.example
    base_dn: dc=target,dc=example
    bind_dn: cn=sync,dc=target,dc=example
job:
  source_resource: source
  target_resource: target
  organization_source_base: ou=Orgs,dc=source,dc=example
  organization_target_base: ou=Orgs,dc=target,dc=example
  intermediate_source_base: ou=Intermediate,ou=Orgs,dc=source,dc=example
  role_source_base: ou=Roles,dc=source,dc=example
  role_target_base: ou=Roles,dc=target,dc=example
  special_role_source_base: ou=Special,ou=Roles,dc=source,dc=example
  special_role_target_base: ou=Special,ou=Roles,dc=target,dc=example
  entitlement_source_base: ou=Ent,ou=Roles,dc=source,dc=example
  entitlement_target_base: ou=Ent,ou=Roles,dc=target,dc=example
  group_descriptor: descriptors/group.yaml
  organizational_unit_descriptor: descriptors/unit.yaml
  batch_size: 200
"#;

const GROUP_DESCRIPTOR: &str = r#"
attributes:
  cn: cn
  description: description
  member: member
"#;

const UNIT_DESCRIPTOR: &str = r#"
attributes:
  cn: ou
  description: description
"#;

fn write_job(dir: &Path, job: &str, unit: &str) -> std::path::PathBuf {
    fs::create_dir_all(dir.join("descriptors")).unwrap();
    fs::write(dir.join("descriptors/group.yaml"), GROUP_DESCRIPTOR).unwrap();
    fs::write(dir.join("descriptors/unit.yaml"), unit).unwrap();
    let path = dir.join("dirsync.yaml");
    fs::write(&path, job).unwrap();
    path
}

#[tokio::test]
async fn test_load_job_with_relative_descriptors() {
    let dir = TempDir::new().unwrap();
    let path = write_job(dir.path(), JOB, UNIT_DESCRIPTOR);

    let file = JobFile::load(&path).unwrap();
    assert_eq!(
        file.job.group_descriptor.as_deref(),
        Some(dir.path().join("descriptors/group.yaml").as_path())
    );

    let config = file.sync_configuration().unwrap();
    let job = HousekeepingJob::load(config, &file.job, &FileDescriptorLoader)
        .await
        .unwrap();
    assert_eq!(job.config().batch_size(), 200);
    assert_eq!(job.config().target().display_name(), "target");
}

#[test]
fn test_missing_job_file_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let err = JobFile::load(&dir.path().join("absent.yaml")).unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("cannot read job file"));
}

#[test]
fn test_malformed_job_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dirsync.yaml");
    fs::write(&path, "resources: [not, a, map]\njob: {}\n").unwrap();
    let err = JobFile::load(&path).unwrap_err();
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_invalid_base_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let job = JOB.replace(
        "role_target_base: ou=Roles,dc=target,dc=example",
        "role_target_base: Roles",
    );
    let path = write_job(dir.path(), &job, UNIT_DESCRIPTOR);
    let file = JobFile::load(&path).unwrap();
    let err = file.sync_configuration().unwrap_err();
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn test_validate_accepts_good_job() {
    let dir = TempDir::new().unwrap();
    let path = write_job(dir.path(), JOB, UNIT_DESCRIPTOR);
    let args = ValidateArgs {
        config: ConfigArgs { config: Some(path) },
    };
    validate::execute(args).await.unwrap();
}

#[tokio::test]
async fn test_validate_rejects_bad_descriptor() {
    let dir = TempDir::new().unwrap();
    let path = write_job(dir.path(), JOB, "attributes:\n  cn: \" | \"\n");
    let args = ValidateArgs {
        config: ConfigArgs { config: Some(path) },
    };
    let err = validate::execute(args).await.unwrap_err();
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn test_validate_rejects_missing_descriptor() {
    let dir = TempDir::new().unwrap();
    let path = write_job(dir.path(), JOB, UNIT_DESCRIPTOR);
    fs::remove_file(dir.path().join("descriptors/group.yaml")).unwrap();
    let args = ValidateArgs {
        config: ConfigArgs { config: Some(path) },
    };
    let err = validate::execute(args).await.unwrap_err();
    assert_eq!(err.exit_code(), 4);
}
