//! Reconciliation hooks.
//!
//! A specialization customizes the pipeline by implementing [`SyncHooks`].
//! Every hook has a default, so the empty implementation is a plain
//! one-to-one copy of the source subtree onto the target subtree.

use async_trait::async_trait;

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::operation::{AttributeSet, EntryMap};

use crate::config::SyncScope;
use crate::engine::SyncContext;
use crate::error::SyncResult;
use crate::reconciliation::differ::{default_is_modified, ComparisonResult, DroppedEntry};

/// Extension points of the reconciliation pipeline, in call order.
#[async_trait]
pub trait SyncHooks: Send + Sync {
    /// Search scope, object classes and mapping of this specialization.
    fn scope(&self) -> &SyncScope;

    /// Name used in logs and reports.
    fn name(&self) -> &str {
        &self.scope().name
    }

    /// Load auxiliary state before any entry is read.
    async fn before_sync(&mut self, _ctx: &SyncContext<'_>) -> SyncResult<()> {
        Ok(())
    }

    /// Subtrees, relative to the source search base, to leave out.
    fn exclude_source(&self) -> Vec<DistinguishedName> {
        Vec::new()
    }

    /// Subtrees, relative to the target search base, to leave out.
    fn exclude_target(&self) -> Vec<DistinguishedName> {
        Vec::new()
    }

    /// Source attributes needed by the hooks beyond the mapped ones.
    fn required_source_attributes(&self) -> Vec<String> {
        Vec::new()
    }

    /// Rewrite retrieved source entries before mapping.
    fn source_post_process(&self, entries: EntryMap) -> SyncResult<EntryMap> {
        Ok(entries)
    }

    /// Rewrite retrieved target entries.
    fn target_post_process(&self, entries: EntryMap) -> SyncResult<EntryMap> {
        Ok(entries)
    }

    /// Desired target attributes of one entry.
    fn transform(
        &self,
        _rdn: &DistinguishedName,
        source: &AttributeSet,
        _target: Option<&AttributeSet>,
    ) -> SyncResult<AttributeSet> {
        Ok(source.clone())
    }

    /// Whether an existing target entry needs updating.
    fn is_modified(&self, desired: &AttributeSet, target: &AttributeSet) -> bool {
        default_is_modified(desired, target)
    }

    /// Filter the comparison, returning the kept result and dropped entries.
    fn compare_post_process(&self, result: ComparisonResult) -> (ComparisonResult, Vec<DroppedEntry>) {
        (result, Vec::new())
    }

    /// Strip membership from entries before deleting them.
    fn retract_membership_on_delete(&self) -> bool {
        false
    }

    /// Release auxiliary state. Runs whenever `before_sync` succeeded.
    async fn after_sync(&mut self, _ctx: &SyncContext<'_>) -> SyncResult<()> {
        Ok(())
    }
}
