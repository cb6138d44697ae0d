//! Entitlement synchronization.
//!
//! Entitlement groups are provisioned out-of-band. Only their role
//! membership is reconciled; every other attribute stays as the target has
//! it, and members outside the role subtree are preserved.

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::operation::AttributeSet;

use crate::config::{SyncConfiguration, SyncScope};
use crate::error::SyncResult;
use crate::hooks::SyncHooks;
use crate::mapping::AttributeMapping;
use crate::reconciliation::differ::{same_values, ComparisonResult, DroppedEntry, EntryTag};

use super::role_group::{non_role_members, role_members};
use super::{group_classes, merge_members, with_membership, RoleNamespace, ENTITLEMENT};

pub struct EntitlementSync {
    scope: SyncScope,
    roles: RoleNamespace,
    membership: String,
}

impl EntitlementSync {
    pub fn new(config: &SyncConfiguration, mapping: AttributeMapping) -> Self {
        let (source_classes, target_classes) = group_classes(config);
        let mapping = with_membership(mapping, config.membership_attribute());
        Self {
            scope: SyncScope::new(ENTITLEMENT, config.entitlements())
                .with_object_classes(source_classes, target_classes)
                .with_mapping(mapping),
            roles: RoleNamespace::new(config),
            membership: config.membership_attribute().to_string(),
        }
    }
}

impl SyncHooks for EntitlementSync {
    fn scope(&self) -> &SyncScope {
        &self.scope
    }

    fn transform(
        &self,
        _rdn: &DistinguishedName,
        source: &AttributeSet,
        target: Option<&AttributeSet>,
    ) -> SyncResult<AttributeSet> {
        let mut members = role_members(&self.roles, source.values(&self.membership));
        let base = match target {
            Some(existing) => {
                merge_members(
                    &mut members,
                    non_role_members(&self.roles, existing.values(&self.membership)),
                );
                existing
            }
            None => source,
        };

        let mut desired: AttributeSet = base
            .iter()
            .filter(|(name, _)| *name != &self.membership)
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect();
        desired.set(self.membership.clone(), members);
        Ok(desired)
    }

    /// Only membership counts.
    fn is_modified(&self, desired: &AttributeSet, target: &AttributeSet) -> bool {
        !same_values(desired.values(&self.membership), target.values(&self.membership))
    }

    fn compare_post_process(&self, result: ComparisonResult) -> (ComparisonResult, Vec<DroppedEntry>) {
        result.retain_tags(&[EntryTag::Modify])
    }
}
