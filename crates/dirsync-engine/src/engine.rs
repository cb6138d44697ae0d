//! Reconciliation engine orchestrator.
//!
//! Runs one specialization through the fixed stage sequence:
//!
//! ```text
//! BeforeSync → SearchSource → SourcePostProcess → ApplyMapping
//!   → SearchTarget → TargetPostProcess → Compare → ComparePostProcess
//!   → Apply → AfterSync
//! ```

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::operation::EntryMap;

use crate::config::{SyncConfiguration, SyncScope};
use crate::error::SyncResult;
use crate::hooks::SyncHooks;
use crate::mapping::AttributeMapper;
use crate::reconciliation::applier::{ApplyOptions, ApplyReport, HierarchyApplier};
use crate::reconciliation::differ::{ComparisonResult, DroppedEntry, TreeDiffer};
use crate::reconciliation::retrieval::{EntryRetriever, RetrievalQuery};
use crate::reconciliation::statistics::RunStatistics;

/// Which directory to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

/// What hooks can see and do during a run.
pub struct SyncContext<'a> {
    config: &'a SyncConfiguration,
    scope: &'a SyncScope,
}

impl<'a> SyncContext<'a> {
    pub fn new(config: &'a SyncConfiguration, scope: &'a SyncScope) -> Self {
        Self { config, scope }
    }

    pub fn config(&self) -> &SyncConfiguration {
        self.config
    }

    pub fn scope(&self) -> &SyncScope {
        self.scope
    }

    /// Read a subtree from one side, on a session of its own.
    pub async fn retrieve(
        &self,
        side: Side,
        base: &DistinguishedName,
        query: &RetrievalQuery,
    ) -> SyncResult<EntryMap> {
        let store = match side {
            Side::Source => self.config.source(),
            Side::Target => self.config.target(),
        };
        EntryRetriever::new(store.as_ref(), self.config.batch_size())
            .retrieve(base, query)
            .await
    }
}

/// Result of one specialization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub name: String,
    /// Comparison after the post-filter.
    pub comparison: ComparisonResult,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DroppedEntry>,
    /// `None` on dry runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply: Option<ApplyReport>,
    pub statistics: RunStatistics,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncOutcome {
    /// Whether every apply group went through.
    pub fn is_success(&self) -> bool {
        self.apply.as_ref().map_or(true, ApplyReport::is_success)
    }
}

/// Drives one specialization through the pipeline.
pub struct ReconciliationEngine<'a> {
    config: &'a SyncConfiguration,
    dry_run: bool,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(config: &'a SyncConfiguration) -> Self {
        Self {
            config,
            dry_run: false,
        }
    }

    /// Compute comparisons without writing to the target.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run the pipeline for `hooks`.
    #[instrument(skip(self, hooks), fields(specialization = %hooks.name()))]
    pub async fn run(&self, hooks: &mut dyn SyncHooks) -> SyncResult<SyncOutcome> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let scope = hooks.scope().clone();
        scope.mapping.validate()?;

        let ctx = SyncContext::new(self.config, &scope);
        hooks.before_sync(&ctx).await?;
        let result = self.stages(&ctx, &*hooks).await;
        let released = hooks.after_sync(&ctx).await;

        let (comparison, dropped, apply, mut statistics) = match (result, released) {
            (Ok(parts), Ok(())) => parts,
            (Err(e), released) => {
                if let Err(after) = released {
                    warn!(error = %after, "after_sync failed after an earlier error");
                }
                return Err(e);
            }
            (Ok(_), Err(e)) => return Err(e),
        };

        statistics.duration_ms = u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            added = statistics.tagged_add,
            modified = statistics.tagged_modify,
            deleted = statistics.tagged_delete,
            dropped = statistics.dropped,
            duration_ms = statistics.duration_ms,
            "Specialization finished"
        );

        Ok(SyncOutcome {
            name: scope.name.clone(),
            comparison,
            dropped,
            apply,
            statistics,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn stages(
        &self,
        ctx: &SyncContext<'_>,
        hooks: &dyn SyncHooks,
    ) -> SyncResult<(ComparisonResult, Vec<DroppedEntry>, Option<ApplyReport>, RunStatistics)> {
        let scope = ctx.scope();
        let mut statistics = RunStatistics::new();

        // Source side
        let mut source_attributes = Vec::new();
        if !scope.mapping.is_empty() {
            source_attributes = scope.mapping.source_attributes();
            for name in hooks.required_source_attributes() {
                if !source_attributes.contains(&name) {
                    source_attributes.push(name);
                }
            }
        }
        let source_query = RetrievalQuery {
            object_classes: scope.source_object_classes.clone(),
            attributes: source_attributes,
            exclusions: hooks.exclude_source(),
        };
        let source = ctx
            .retrieve(Side::Source, &scope.source_base, &source_query)
            .await?;
        let source = hooks.source_post_process(source)?;
        let source = AttributeMapper::apply(source, &scope.mapping)?;
        let source = self.translate_names(source);
        statistics.source_entries = source.len();
        debug!(entries = source.len(), "Source entries prepared");

        // Target side
        let target_query = RetrievalQuery {
            object_classes: scope.target_object_classes.clone(),
            attributes: scope.mapping.target_attributes()?,
            exclusions: hooks.exclude_target(),
        };
        let target = ctx
            .retrieve(Side::Target, &scope.target_base, &target_query)
            .await?;
        let target = hooks.target_post_process(target)?;
        statistics.target_entries = target.len();
        debug!(entries = target.len(), "Target entries prepared");

        // Compare
        let compared = TreeDiffer::compare(
            &source,
            &target,
            |rdn, source, target| hooks.transform(rdn, source, target),
            |desired, target| hooks.is_modified(desired, target),
        )?;
        let (comparison, dropped) = hooks.compare_post_process(compared);
        if !dropped.is_empty() {
            let names: Vec<String> = dropped
                .iter()
                .map(|d| format!("{} {}", d.tag, d.rdn))
                .collect();
            warn!(
                count = dropped.len(),
                entries = ?names,
                "Entries outside this specialization's lifecycle were dropped; reconcile them manually"
            );
        }
        statistics.record_comparison(&comparison, dropped.len());

        // Apply
        let apply = if self.dry_run {
            info!(tagged = comparison.len(), "Dry run, target left unchanged");
            None
        } else if comparison.is_empty() {
            Some(ApplyReport::default())
        } else {
            let mut options = ApplyOptions::new(scope.target_object_classes.clone());
            if hooks.retract_membership_on_delete() {
                options = options.with_membership_retraction(self.config.membership_attribute());
            }
            let report = HierarchyApplier::new(
                self.config.target().as_ref(),
                &scope.target_base,
                options,
            )?
            .apply(&comparison)
            .await?;
            statistics.record_apply(&report);
            Some(report)
        };

        Ok((comparison, dropped, apply, statistics))
    }

    /// Rewrite source naming prefixes to the target's conventions.
    fn translate_names(&self, entries: EntryMap) -> EntryMap {
        let naming = self.config.naming();
        let mut translated = EntryMap::new();
        for (rdn, attributes) in entries {
            let renamed = naming.apply(&rdn);
            if translated.contains_key(&renamed) {
                warn!(rdn = %renamed, "Duplicate entry name after prefix translation, keeping first");
                continue;
            }
            translated.insert(renamed, attributes);
        }
        translated
    }
}
