//! Housekeeping job.
//!
//! Runs every specialization in [`ORDER`] against one configuration. A
//! failing specialization is recorded and the job moves on to the next one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::{JobParameters, SyncConfiguration};
use crate::engine::{ReconciliationEngine, SyncOutcome};
use crate::error::{SyncError, SyncResult};
use crate::hooks::SyncHooks;
use crate::mapping::{AttributeMapping, DescriptorLoader};
use crate::reconciliation::statistics::RunStatistics;
use crate::specializations::{
    EntitlementSync, GroupUnderStructureSync, RoleGroupSync, RoleStructureSync, SpecialRoleSync,
    StructuralUnitSync, ENTITLEMENT, GROUP, ORDER, ROLE_GROUP, ROLE_STRUCTURE, SPECIAL_ROLE,
    STRUCTURE,
};

/// Options of a single job run.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Compare only; the target is left untouched.
    pub dry_run: bool,
    /// Restrict the run to these specializations. Empty runs all of them.
    pub only: Vec<String>,
}

impl JobOptions {
    fn selects(&self, name: &str) -> bool {
        self.only.is_empty() || self.only.iter().any(|n| n == name)
    }

    fn validate(&self) -> SyncResult<()> {
        for name in &self.only {
            if !ORDER.contains(&name.as_str()) {
                return Err(SyncError::configuration(format!(
                    "unknown specialization '{}', expected one of: {}",
                    name,
                    ORDER.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Result of one specialization within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecializationReport {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SyncOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpecializationReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.outcome.as_ref().map_or(true, SyncOutcome::is_success)
    }
}

/// Everything a job run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub specializations: Vec<SpecializationReport>,
    pub totals: RunStatistics,
}

impl JobReport {
    /// Whether any specialization errored or had a failed apply group.
    pub fn has_failures(&self) -> bool {
        self.specializations.iter().any(|s| !s.is_success())
    }
}

/// Drives the six specializations in order.
pub struct HousekeepingJob {
    config: SyncConfiguration,
    group_mapping: AttributeMapping,
    unit_mapping: AttributeMapping,
}

impl HousekeepingJob {
    /// `group_mapping` applies to group specializations, `unit_mapping` to
    /// the structural ones.
    pub fn new(
        config: SyncConfiguration,
        group_mapping: AttributeMapping,
        unit_mapping: AttributeMapping,
    ) -> Self {
        Self {
            config,
            group_mapping,
            unit_mapping,
        }
    }

    /// Build a job, loading the descriptors named by `params`. A missing
    /// descriptor path means an empty mapping.
    pub async fn load(
        config: SyncConfiguration,
        params: &JobParameters,
        loader: &dyn DescriptorLoader,
    ) -> SyncResult<Self> {
        let group_mapping = match &params.group_descriptor {
            Some(path) => loader.load_attribute_mapping(path).await?,
            None => AttributeMapping::new(),
        };
        let unit_mapping = match &params.organizational_unit_descriptor {
            Some(path) => loader.load_attribute_mapping(path).await?,
            None => AttributeMapping::new(),
        };
        group_mapping.validate()?;
        unit_mapping.validate()?;
        Ok(Self::new(config, group_mapping, unit_mapping))
    }

    pub fn config(&self) -> &SyncConfiguration {
        &self.config
    }

    fn specialization(&self, name: &str) -> Option<Box<dyn SyncHooks>> {
        let config = &self.config;
        let hooks: Box<dyn SyncHooks> = match name {
            STRUCTURE => Box::new(StructuralUnitSync::new(config, self.unit_mapping.clone())),
            GROUP => Box::new(GroupUnderStructureSync::new(config, self.group_mapping.clone())),
            ROLE_STRUCTURE => Box::new(RoleStructureSync::new(config, self.unit_mapping.clone())),
            ROLE_GROUP => Box::new(RoleGroupSync::new(config, self.group_mapping.clone())),
            SPECIAL_ROLE => Box::new(SpecialRoleSync::new(config, self.group_mapping.clone())),
            ENTITLEMENT => Box::new(EntitlementSync::new(config, self.group_mapping.clone())),
            _ => return None,
        };
        Some(hooks)
    }

    /// Run the selected specializations in order.
    #[instrument(skip(self), fields(dry_run = options.dry_run))]
    pub async fn run(&self, options: &JobOptions) -> SyncResult<JobReport> {
        options.validate()?;
        let started_at = Utc::now();
        let engine = ReconciliationEngine::new(&self.config).dry_run(options.dry_run);

        let mut specializations = Vec::new();
        let mut totals = RunStatistics::new();
        for name in ORDER.iter().copied().filter(|n| options.selects(n)) {
            let Some(mut hooks) = self.specialization(name) else {
                continue;
            };
            info!(specialization = name, "Starting specialization");
            let report = match engine.run(hooks.as_mut()).await {
                Ok(outcome) => {
                    totals.merge(&outcome.statistics);
                    SpecializationReport {
                        name: name.to_string(),
                        outcome: Some(outcome),
                        error: None,
                    }
                }
                Err(e) => {
                    error!(specialization = name, error = %e, "Specialization failed");
                    SpecializationReport {
                        name: name.to_string(),
                        outcome: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            specializations.push(report);
        }

        let report = JobReport {
            started_at,
            finished_at: Utc::now(),
            specializations,
            totals,
        };
        info!(
            specializations = report.specializations.len(),
            failed = report.has_failures(),
            "Housekeeping job finished"
        );
        Ok(report)
    }
}
