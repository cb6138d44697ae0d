//! Special role synchronization.
//!
//! Special roles are provisioned by hand on the target; only their
//! membership is kept current, with the role group rules.

use async_trait::async_trait;

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::operation::AttributeSet;

use crate::config::{SyncConfiguration, SyncScope};
use crate::engine::SyncContext;
use crate::error::SyncResult;
use crate::hooks::SyncHooks;
use crate::mapping::AttributeMapping;
use crate::reconciliation::differ::{ComparisonResult, DroppedEntry, EntryTag};

use super::{RoleGroupSync, SPECIAL_ROLE};

pub struct SpecialRoleSync {
    inner: RoleGroupSync,
}

impl SpecialRoleSync {
    pub fn new(config: &SyncConfiguration, mapping: AttributeMapping) -> Self {
        Self {
            inner: RoleGroupSync::with_bases(SPECIAL_ROLE, config, config.special_roles(), mapping),
        }
    }
}

#[async_trait]
impl SyncHooks for SpecialRoleSync {
    fn scope(&self) -> &SyncScope {
        self.inner.scope()
    }

    async fn before_sync(&mut self, ctx: &SyncContext<'_>) -> SyncResult<()> {
        self.inner.before_sync(ctx).await
    }

    fn transform(
        &self,
        rdn: &DistinguishedName,
        source: &AttributeSet,
        target: Option<&AttributeSet>,
    ) -> SyncResult<AttributeSet> {
        self.inner.transform(rdn, source, target)
    }

    /// Special roles are never created or removed here.
    fn compare_post_process(&self, result: ComparisonResult) -> (ComparisonResult, Vec<DroppedEntry>) {
        result.retain_tags(&[EntryTag::Modify])
    }

    async fn after_sync(&mut self, ctx: &SyncContext<'_>) -> SyncResult<()> {
        self.inner.after_sync(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{config, dn};
    use super::*;

    #[test]
    fn test_only_modify_survives() {
        let sync = SpecialRoleSync::new(&config(), AttributeMapping::new());
        assert_eq!(sync.name(), "special-role");
        assert_eq!(sync.scope().source_base, dn("ou=Special,ou=Roles,dc=source"));
        assert!(sync.exclude_source().is_empty());

        let mut result = ComparisonResult::new();
        result.insert(EntryTag::Add, dn("CN=New"), AttributeSet::new());
        result.insert(EntryTag::Modify, dn("CN=Kept"), AttributeSet::new());
        result.insert(EntryTag::Delete, dn("CN=Gone"), AttributeSet::new());

        let (kept, dropped) = sync.compare_post_process(result);
        assert_eq!(kept.tag_of(&dn("CN=Kept")), Some(EntryTag::Modify));
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped.len(), 2);
    }
}
