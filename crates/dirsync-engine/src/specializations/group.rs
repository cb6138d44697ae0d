//! Groups below the organization structure.
//!
//! In the source, an organization group lists intermediate entries as
//! members (`cn=DS1` has `member: cn=DS1_Lead,ou=Intermediate,...`). Each
//! such member becomes a group inside the organization's unit on the target
//! (`cn=DS1_Lead,ou=DS1`). Only structure is synchronized, never membership.

use dirsync_connector::dn::DistinguishedName;
use dirsync_connector::operation::{AttributeSet, EntryMap};
use tracing::{debug, warn};

use crate::config::{NamingTranslation, SyncConfiguration, SyncScope};
use crate::error::SyncResult;
use crate::hooks::SyncHooks;
use crate::mapping::AttributeMapping;
use crate::reconciliation::retrieval::relative_to;

use super::{
    ensure_naming_attribute, group_classes, parse_member, same_name, with_naming_attribute, GROUP,
};

pub struct GroupUnderStructureSync {
    scope: SyncScope,
    naming: NamingTranslation,
    /// `None` when the source has no intermediates; the sync then does nothing.
    intermediate: Option<DistinguishedName>,
    membership: String,
}

impl GroupUnderStructureSync {
    pub fn new(config: &SyncConfiguration, mapping: AttributeMapping) -> Self {
        let (source_classes, target_classes) = group_classes(config);
        Self {
            scope: SyncScope::new(GROUP, config.organizations())
                .with_object_classes(source_classes, target_classes)
                .with_mapping(mapping),
            naming: config.naming(),
            intermediate: config.intermediate_source().cloned(),
            membership: config.membership_attribute().to_string(),
        }
    }

    /// Unit name of an organization group, as the structure sync names it.
    fn unit_of(&self, group: &DistinguishedName) -> DistinguishedName {
        match group.leaf() {
            Some(leaf) if leaf.attribute().eq_ignore_ascii_case(self.naming.source_group_prefix()) => {
                group.with_leaf_type(self.naming.source_unit_prefix())
            }
            _ => group.clone(),
        }
    }
}

impl SyncHooks for GroupUnderStructureSync {
    fn scope(&self) -> &SyncScope {
        &self.scope
    }

    fn required_source_attributes(&self) -> Vec<String> {
        vec![self.membership.clone()]
    }

    /// Replace the retrieved groups with one synthesized group per
    /// intermediate member.
    fn source_post_process(&self, entries: EntryMap) -> SyncResult<EntryMap> {
        let Some(intermediate) = &self.intermediate else {
            debug!("No intermediate search base, nothing to expand");
            return Ok(EntryMap::new());
        };
        let intermediate_rdn = relative_to(intermediate, &self.scope.source_base);

        let (intermediates, groups): (Vec<_>, Vec<_>) = entries.into_iter().partition(|(rdn, _)| {
            intermediate_rdn
                .as_ref()
                .map_or(false, |suffix| rdn.ends_with(suffix))
        });
        let intermediates: Vec<(DistinguishedName, AttributeSet)> = intermediates
            .into_iter()
            .map(|(rdn, attrs)| (rdn.join(&self.scope.source_base), attrs))
            .collect();

        let mut synthesized = EntryMap::new();
        for (rdn, attributes) in &groups {
            let unit = self.unit_of(rdn);
            for value in attributes.values(&self.membership) {
                let Some(member) = parse_member(value) else {
                    continue;
                };
                if !member.ends_with(intermediate) || same_name(&member, intermediate) {
                    continue;
                }
                let Some(leaf) = member.leaf() else {
                    continue;
                };
                let name = unit.child(leaf.clone());
                if synthesized.contains_key(&name) {
                    warn!(rdn = %name, "Intermediate listed twice, keeping first");
                    continue;
                }

                let mut derived = intermediates
                    .iter()
                    .find(|(full, _)| same_name(full, &member))
                    .map(|(_, attrs)| attrs.clone())
                    .unwrap_or_default();
                derived.retain(|attr, _| !attr.eq_ignore_ascii_case(&self.membership));
                ensure_naming_attribute(&name, &mut derived);
                synthesized.insert(name, derived);
            }
        }

        debug!(
            groups = groups.len(),
            synthesized = synthesized.len(),
            "Expanded intermediate members"
        );
        Ok(synthesized)
    }

    /// Without intermediates no group is derived, so existing target groups
    /// are left alone as well.
    fn target_post_process(&self, entries: EntryMap) -> SyncResult<EntryMap> {
        if self.intermediate.is_none() {
            return Ok(EntryMap::new());
        }
        Ok(entries)
    }

    fn transform(
        &self,
        rdn: &DistinguishedName,
        source: &AttributeSet,
        target: Option<&AttributeSet>,
    ) -> SyncResult<AttributeSet> {
        Ok(with_naming_attribute(rdn, source, target))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{config, config_with_intermediate, dn};
    use super::*;

    fn sync() -> GroupUnderStructureSync {
        GroupUnderStructureSync::new(&config(), AttributeMapping::new())
    }

    #[test]
    fn test_intermediate_members_become_groups() {
        let mut entries = EntryMap::new();
        entries.insert(
            dn("cn=DS1"),
            AttributeSet::new().with("cn", ["DS1"]).with(
                "member",
                [
                    "cn=DS1_Lead,ou=Intermediate,ou=Orgs,dc=source",
                    "uid=alice,ou=Users,dc=source",
                ],
            ),
        );
        entries.insert(
            dn("cn=DS1_Lead,ou=Intermediate"),
            AttributeSet::new()
                .with("cn", ["DS1_Lead"])
                .with("description", ["Lead of DS1"])
                .with("member", ["uid=bob,ou=Users,dc=source"]),
        );

        let result = sync().source_post_process(entries).unwrap();

        assert_eq!(result.len(), 1);
        let lead = &result[&dn("cn=DS1_Lead,ou=DS1")];
        assert_eq!(lead.values("description"), ["Lead of DS1"]);
        assert!(!lead.has("member"));
    }

    #[test]
    fn test_unretrieved_intermediate_gets_naming_attribute() {
        let mut entries = EntryMap::new();
        entries.insert(
            dn("cn=DS2"),
            AttributeSet::new().with("member", ["cn=DS2_Ops,ou=Intermediate,ou=Orgs,dc=source"]),
        );
        let result = sync().source_post_process(entries).unwrap();
        assert_eq!(result[&dn("cn=DS2_Ops,ou=DS2")].values("cn"), ["DS2_Ops"]);
    }

    #[test]
    fn test_groups_without_intermediates_yield_nothing() {
        let mut entries = EntryMap::new();
        entries.insert(
            dn("cn=DS3"),
            AttributeSet::new().with("member", ["not a name", "uid=carol,ou=Users,dc=source"]),
        );
        assert!(sync().source_post_process(entries).unwrap().is_empty());
        assert_eq!(sync().required_source_attributes(), vec!["member"]);
    }

    #[test]
    fn test_without_intermediate_base_nothing_changes() {
        let sync = GroupUnderStructureSync::new(&config_with_intermediate(""), AttributeMapping::new());
        let mut entries = EntryMap::new();
        entries.insert(
            dn("cn=DS1"),
            AttributeSet::new().with("member", ["cn=DS1_Lead,ou=Intermediate,ou=Orgs,dc=source"]),
        );
        assert!(sync.source_post_process(entries).unwrap().is_empty());

        let mut existing = EntryMap::new();
        existing.insert(dn("CN=DS1_Lead,OU=DS1"), AttributeSet::new().with("cn", ["DS1_Lead"]));
        assert!(sync.target_post_process(existing).unwrap().is_empty());
    }
}
