//! Run statistics tracking for reconciliation.

use serde::{Deserialize, Serialize};

use super::applier::ApplyReport;
use super::differ::{ComparisonResult, EntryTag};

/// Statistics for a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Entries read from the source, after post-processing.
    #[serde(default)]
    pub source_entries: usize,
    /// Entries read from the target, after post-processing.
    #[serde(default)]
    pub target_entries: usize,
    /// Entries tagged ADD.
    #[serde(default)]
    pub tagged_add: usize,
    /// Entries tagged MODIFY.
    #[serde(default)]
    pub tagged_modify: usize,
    /// Entries tagged DELETE.
    #[serde(default)]
    pub tagged_delete: usize,
    /// Entries removed by the comparison post-filter.
    #[serde(default)]
    pub dropped: usize,
    /// Entries applied successfully.
    #[serde(default)]
    pub applied: usize,
    /// Failed apply groups.
    #[serde(default)]
    pub failed_groups: usize,
    /// Total duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

impl RunStatistics {
    /// Create new empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record tag counts of a (filtered) comparison result.
    pub fn record_comparison(&mut self, result: &ComparisonResult, dropped: usize) {
        self.tagged_add = result.group(EntryTag::Add).len();
        self.tagged_modify = result.group(EntryTag::Modify).len();
        self.tagged_delete = result.group(EntryTag::Delete).len();
        self.dropped = dropped;
    }

    /// Record the outcome of applying.
    pub fn record_apply(&mut self, report: &ApplyReport) {
        self.applied = report.created + report.modified + report.deleted;
        self.failed_groups = report.failures.len();
    }

    /// Total tagged entries.
    #[must_use]
    pub fn tagged(&self) -> usize {
        self.tagged_add + self.tagged_modify + self.tagged_delete
    }

    /// Merge with another statistics instance.
    pub fn merge(&mut self, other: &RunStatistics) {
        self.source_entries += other.source_entries;
        self.target_entries += other.target_entries;
        self.tagged_add += other.tagged_add;
        self.tagged_modify += other.tagged_modify;
        self.tagged_delete += other.tagged_delete;
        self.dropped += other.dropped;
        self.applied += other.applied;
        self.failed_groups += other.failed_groups;
        self.duration_ms += other.duration_ms;
    }
}
