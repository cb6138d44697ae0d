//! # Directory Synchronization Engine
//!
//! One-way reconciliation of an organization and role hierarchy from a
//! source directory into a target directory.
//!
//! This crate provides:
//! - Attribute mapping driven by YAML descriptors
//! - Tree comparison into ADD, MODIFY and DELETE groups
//! - Hierarchy-aware application (parents before children on create,
//!   children before parents on delete)
//! - A hook trait for specializing each stage of the pipeline
//! - Six specializations and the housekeeping job running them in order
//! - A textual and JSON run report
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_engine::{FileDescriptorLoader, HousekeepingJob, JobOptions, SyncConfiguration};
//!
//! let config = SyncConfiguration::from_parameters(&params, source, target)?;
//! let job = HousekeepingJob::load(config, &params, &FileDescriptorLoader).await?;
//! let report = job.run(&JobOptions::default()).await?;
//! println!("{report}");
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod job;
pub mod mapping;
pub mod reconciliation;
pub mod report;
pub mod specializations;

pub use config::{JobParameters, NamingTranslation, SearchBases, SyncConfiguration, SyncScope};
pub use engine::{ReconciliationEngine, Side, SyncContext, SyncOutcome};
pub use error::{SyncError, SyncResult};
pub use hooks::SyncHooks;
pub use job::{HousekeepingJob, JobOptions, JobReport, SpecializationReport};
pub use mapping::{AttributeMapper, AttributeMapping, DescriptorLoader, FileDescriptorLoader};
pub use reconciliation::{
    ApplyFailure, ApplyOptions, ApplyReport, ComparisonResult, DroppedEntry, EntryTag,
    HierarchyApplier, RunStatistics, TreeDiffer,
};
